//! Aggregate statistics of a dataset and their text rendering.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::time::Duration;

use bucketload_types::TelemetryRecord;
use bytesize::ByteSize;
use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::dataset::Dataset;

/// Width of the windows for rates and throughput, in seconds.
pub const RATE_WINDOW: u64 = 10;

/// Width of the windows for duration distributions over time, in seconds.
pub const PHASE_WINDOW: u64 = 90;

/// Label of successful requests in [`Summary::outcomes_per_second`].
pub const SUCCESS: &str = "Success";

/// Average and percentiles of a sketch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Percentiles {
    pub avg: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
}

impl Percentiles {
    /// Returns `None` for an empty sketch.
    pub fn of(sketch: &DDSketch) -> Option<Self> {
        let count = sketch.count();
        if count == 0 {
            return None;
        }

        let quantile = |q| sketch.quantile(q).ok().flatten();
        Some(Self {
            avg: sketch.sum()? / count as f64,
            p50: quantile(0.5)?,
            p90: quantile(0.9)?,
            p99: quantile(0.99)?,
        })
    }
}

/// Rates within one [`RATE_WINDOW`].
#[derive(Clone, Debug, PartialEq)]
pub struct RateWindow {
    /// Seconds since the start of the run.
    pub offset: u64,
    /// All requests, successful or not.
    pub requests_per_second: f64,
    /// Bytes of successful uploads.
    pub bytes_per_second: f64,
    /// `bytes_per_second` divided by the number of pods active in the window.
    pub bytes_per_second_per_pod: f64,
}

/// Success durations within one [`PHASE_WINDOW`].
pub struct Phase {
    /// Seconds since the start of the run.
    pub offset: u64,
    pub durations: DDSketch,
}

/// Aggregated statistics of one dataset.
pub struct Summary {
    pub requests: usize,
    pub errors: usize,
    /// Timestamp of the first request, in whole seconds.
    pub start: u64,
    /// Timestamp of the last request.
    pub end: f64,
    pub success_durations: DDSketch,
    pub error_durations: DDSketch,
    /// One entry per [`RATE_WINDOW`] that saw at least one request.
    pub rates: Vec<RateWindow>,
    /// Requests per second by error text, or [`SUCCESS`], aligned with `rates`.
    pub outcomes_per_second: BTreeMap<String, Vec<f64>>,
    pub phases: Vec<Phase>,
}

#[derive(Default)]
struct WindowAccumulator {
    requests: usize,
    bytes: u64,
    nodes: BTreeSet<String>,
}

impl Summary {
    /// Aggregates the given records.
    pub fn from_records(records: &[TelemetryRecord]) -> Self {
        let start = records
            .iter()
            .map(|r| r.start_timestamp)
            .reduce(f64::min)
            .map_or(0, |start| start.max(0.0) as u64);
        let end = records
            .iter()
            .map(|r| r.start_timestamp)
            .reduce(f64::max)
            .unwrap_or(0.0);

        let window_of = |record: &TelemetryRecord, width: u64| {
            ((record.start_timestamp - start as f64).max(0.0) as u64 / width) as usize
        };

        let mut summary = Self {
            requests: records.len(),
            errors: 0,
            start,
            end,
            success_durations: DDSketch::default(),
            error_durations: DDSketch::default(),
            rates: Vec::new(),
            outcomes_per_second: BTreeMap::new(),
            phases: Vec::new(),
        };

        // Sparse, so that a single stray timestamp does not blow up the window count.
        let mut windows: BTreeMap<usize, WindowAccumulator> = BTreeMap::new();
        let mut outcomes: BTreeMap<String, BTreeMap<usize, usize>> = BTreeMap::new();
        let mut phases: BTreeMap<usize, DDSketch> = BTreeMap::new();

        for record in records {
            let index = window_of(record, RATE_WINDOW);
            let window = windows.entry(index).or_default();
            window.requests += 1;
            window.nodes.insert(record.worker_node.clone());

            let outcome = if record.is_success() {
                window.bytes += record.size_bytes as u64;
                summary.success_durations.add(record.duration_seconds);
                phases
                    .entry(window_of(record, PHASE_WINDOW))
                    .or_default()
                    .add(record.duration_seconds);
                SUCCESS
            } else {
                summary.errors += 1;
                summary.error_durations.add(record.duration_seconds);
                record.error_text.as_str()
            };

            *outcomes
                .entry(outcome.to_owned())
                .or_default()
                .entry(index)
                .or_default() += 1;
        }

        let width = RATE_WINDOW as f64;
        summary.rates = windows
            .iter()
            .map(|(&index, window)| {
                let bytes_per_second = window.bytes as f64 / width;
                RateWindow {
                    offset: index as u64 * RATE_WINDOW,
                    requests_per_second: window.requests as f64 / width,
                    bytes_per_second,
                    bytes_per_second_per_pod: bytes_per_second / window.nodes.len().max(1) as f64,
                }
            })
            .collect();

        summary.outcomes_per_second = outcomes
            .into_iter()
            .map(|(outcome, counts)| {
                let rates: Vec<f64> = windows
                    .keys()
                    .map(|index| counts.get(index).copied().unwrap_or(0) as f64 / width)
                    .collect();
                (outcome, rates)
            })
            .collect();

        summary.phases = phases
            .into_iter()
            .map(|(index, durations)| Phase {
                offset: index as u64 * PHASE_WINDOW,
                durations,
            })
            .collect();

        summary
    }

    /// Fraction of failed requests.
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.errors as f64 / self.requests as f64
        }
    }
}

fn write_percentiles(out: &mut String, label: &str, sketch: &DDSketch) {
    let Some(p) = Percentiles::of(sketch) else {
        return;
    };
    let secs = |seconds| Duration::try_from_secs_f64(seconds).unwrap_or_default();
    let _ = writeln!(
        out,
        "  {label} avg: {:.2?}; p50: {:.2?}; p90: {:.2?}; p99: {:.2?}",
        secs(p.avg).bold(),
        secs(p.p50),
        secs(p.p90),
        secs(p.p99)
    );
}

fn throughput(bytes_per_second: f64) -> String {
    format!("{}/s", ByteSize::b(bytes_per_second as u64))
}

/// Renders the report of one dataset.
pub fn render(dataset: &Dataset, summary: &Summary) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} {} ({})",
        "##".bold(),
        dataset.label().bold().blue(),
        dataset.path.display()
    );

    let _ = write!(out, "{} ({} requests", "UPLOADS:".bold().green(), summary.requests.bold());
    if summary.errors > 0 {
        let errors = format!(
            "{} ERRORS, {:.2}%",
            summary.errors,
            summary.error_rate() * 100.0
        );
        let _ = write!(out, ", {}", errors.bold().red());
    }
    if dataset.skipped > 0 {
        let _ = write!(out, ", {} malformed lines skipped", dataset.skipped);
    }
    let _ = writeln!(out, ")");

    write_percentiles(&mut out, "success duration", &summary.success_durations);
    write_percentiles(&mut out, "error duration", &summary.error_durations);

    if !summary.rates.is_empty() {
        let _ = writeln!(out, "{} ({RATE_WINDOW}s windows)", "RATES:".bold().green());
        for window in &summary.rates {
            let _ = writeln!(
                out,
                "  {:>6}s  {:>9.2} req/s  {:>12}  {:>12} per pod",
                window.offset,
                window.requests_per_second,
                throughput(window.bytes_per_second),
                throughput(window.bytes_per_second_per_pod),
            );
        }
    }

    if summary.errors > 0 {
        let _ = writeln!(
            out,
            "{} ({RATE_WINDOW}s windows)",
            "OUTCOMES PER SECOND:".bold().green()
        );
        // Successes first, then errors alphabetically.
        let ordered = summary
            .outcomes_per_second
            .get_key_value(SUCCESS)
            .into_iter()
            .chain(
                summary
                    .outcomes_per_second
                    .iter()
                    .filter(|(outcome, _)| *outcome != SUCCESS),
            );
        for (outcome, rates) in ordered {
            let rates: Vec<_> = rates.iter().map(|r| format!("{r:.1}")).collect();
            let _ = writeln!(out, "  {outcome}: {}", rates.join(" "));
        }
    }

    if !summary.phases.is_empty() {
        let _ = writeln!(
            out,
            "{} ({PHASE_WINDOW}s windows)",
            "SUCCESS DURATIONS OVER TIME:".bold().green()
        );
        for phase in &summary.phases {
            let label = format!("{}-{}s", phase.offset, phase.offset + PHASE_WINDOW);
            write_percentiles(&mut out, &label, &phase.durations);
        }
    }

    out
}
