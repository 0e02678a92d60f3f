//! Best-effort delivery of per-upload telemetry records.
//!
//! Each completed [`Attempt`] becomes exactly one [`TelemetryRecord`], sent as a single datagram
//! to a fixed collector. Delivery is fire-and-forget: there is no framing beyond the datagram,
//! no acknowledgement and no retransmission. A record that cannot be sent is dropped and the
//! worker continues.
//!
//! Channels are opened per worker, so sends never contend on a shared socket.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use bucketload_types::{Outcome, TelemetryRecord};
use tokio::net::{UdpSocket, lookup_host};
use tokio::time::Instant;

use crate::upload::Attempt;

/// Host of the collector that receives telemetry from all load generators.
pub const COLLECTOR_HOST: &str = "py-dev.lancs.ac.uk";

/// UDP port of the collector.
pub const COLLECTOR_PORT: u16 = 5050;

/// Upper bound for resolving the collector address.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Time after a failed lookup during which records are dropped without resolving again.
const RESOLVE_BACKOFF: Duration = Duration::from_secs(30);

/// A per-worker sink for encoded telemetry records.
#[async_trait::async_trait]
pub trait TelemetryChannel: fmt::Debug + Send {
    /// Sends one encoded record as a single message.
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()>;
}

/// Opens [`TelemetryChannel`]s for workers.
pub trait TelemetryTarget: fmt::Debug + Send + Sync {
    /// Opens the channel used by the worker with the given index.
    fn open(&self, worker: usize) -> Box<dyn TelemetryChannel>;
}

/// Sends records over UDP to a collector.
#[derive(Clone, Debug)]
pub struct UdpCollector {
    host: String,
    port: u16,
}

impl UdpCollector {
    /// Targets the collector at `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for UdpCollector {
    fn default() -> Self {
        Self::new(COLLECTOR_HOST, COLLECTOR_PORT)
    }
}

impl TelemetryTarget for UdpCollector {
    fn open(&self, _worker: usize) -> Box<dyn TelemetryChannel> {
        Box::new(UdpChannel {
            host: self.host.clone(),
            port: self.port,
            peer: None,
            retry_at: None,
            socket: None,
        })
    }
}

/// A lazily connected UDP socket.
///
/// The collector address is resolved and the socket bound on first use. A failed lookup is
/// retried after [`RESOLVE_BACKOFF`], and records sent in the meantime are dropped, so a slow
/// or failing resolver delays at most one send per backoff period.
struct UdpChannel {
    host: String,
    port: u16,
    peer: Option<SocketAddr>,
    retry_at: Option<Instant>,
    socket: Option<UdpSocket>,
}

impl fmt::Debug for UdpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpChannel")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl UdpChannel {
    async fn resolve(&mut self) -> io::Result<SocketAddr> {
        if let Some(peer) = self.peer {
            return Ok(peer);
        }

        if self.retry_at.is_some_and(|at| Instant::now() < at) {
            return Err(io::Error::other(format!(
                "collector {} did not resolve recently",
                self.host
            )));
        }

        let result = match tokio::time::timeout(RESOLVE_TIMEOUT, self.lookup()).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("resolving collector {} timed out", self.host),
            )),
        };

        match &result {
            Ok(peer) => {
                self.peer = Some(*peer);
                self.retry_at = None;
            }
            Err(_) => self.retry_at = Some(Instant::now() + RESOLVE_BACKOFF),
        }
        result
    }

    async fn lookup(&self) -> io::Result<SocketAddr> {
        lookup_host((self.host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no address for collector {}", self.host),
                )
            })
    }
}

#[async_trait::async_trait]
impl TelemetryChannel for UdpChannel {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        let peer = self.resolve().await?;

        let socket = match self.socket.take() {
            Some(socket) => socket,
            None => {
                let local: SocketAddr = match peer {
                    SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
                    SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
                };
                UdpSocket::bind(local).await?
            }
        };

        let result = socket.send_to(datagram, peer).await;
        self.socket = Some(socket);
        result.map(drop)
    }
}

/// Turns attempts of one worker into records and hands them to its channel.
#[derive(Debug)]
pub struct Emitter {
    worker: usize,
    node: String,
    endpoint_host: String,
    bucket_name: String,
    channel: Box<dyn TelemetryChannel>,
}

impl Emitter {
    /// Creates the emitter for the given worker.
    pub fn new(
        worker: usize,
        node: impl Into<String>,
        endpoint_host: impl Into<String>,
        bucket_name: impl Into<String>,
        channel: Box<dyn TelemetryChannel>,
    ) -> Self {
        Self {
            worker,
            node: node.into(),
            endpoint_host: endpoint_host.into(),
            bucket_name: bucket_name.into(),
            channel,
        }
    }

    /// Logs the attempt and sends its record.
    ///
    /// Send failures are logged and otherwise ignored.
    pub async fn emit(&mut self, attempt: &Attempt) {
        let record = TelemetryRecord::new(
            self.node.as_str(),
            attempt.start_timestamp,
            self.endpoint_host.as_str(),
            self.bucket_name.as_str(),
            attempt.outcome.clone(),
            attempt.duration.as_secs_f64(),
        );

        match &attempt.outcome {
            Outcome::Success(size) => tracing::info!(
                worker = self.worker,
                size,
                duration = record.duration_seconds,
                "uploaded object"
            ),
            Outcome::Failure(_) => tracing::error!(
                worker = self.worker,
                error = %record.error_text,
                duration = record.duration_seconds,
                "upload failed"
            ),
        }

        if let Err(error) = self.channel.send(&record.to_datagram()).await {
            tracing::debug!(worker = self.worker, %error, "dropped telemetry record");
        }
    }
}

/// Name of the machine running the workers, used as `workerNode` in every record.
pub fn node_name() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_owned())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Default)]
    struct Failing;

    #[async_trait::async_trait]
    impl TelemetryChannel for Failing {
        async fn send(&mut self, _datagram: &[u8]) -> io::Result<()> {
            Err(io::Error::other("collector unreachable"))
        }
    }

    #[tokio::test]
    async fn udp_delivers_one_datagram_per_record() {
        let collector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = collector.local_addr().unwrap().port();

        let channel = UdpCollector::new("127.0.0.1", port).open(0);
        let mut emitter = Emitter::new(0, "node-a", "s3.example.com", "bench", channel);
        emitter
            .emit(&Attempt {
                start_timestamp: 1700000000.5,
                duration: Duration::from_millis(250),
                outcome: Outcome::Success(10240),
            })
            .await;

        let mut buf = [0; 1024];
        let (len, _) = collector.recv_from(&mut buf).await.unwrap();
        assert_eq!(
            std::str::from_utf8(&buf[..len]).unwrap(),
            "node-a,1700000000.5,s3.example.com,bench,10240,0.25,"
        );
    }

    #[tokio::test]
    async fn send_failures_are_swallowed() {
        let mut emitter = Emitter::new(3, "node", "host", "bucket", Box::new(Failing));
        emitter
            .emit(&Attempt {
                start_timestamp: 0.0,
                duration: Duration::ZERO,
                outcome: Outcome::Failure("connection refused".into()),
            })
            .await;
    }

    #[tokio::test]
    async fn unresolvable_collector_is_an_error() {
        let mut channel = UdpCollector::new("collector.invalid", 5050).open(0);
        assert!(channel.send(b"record").await.is_err());
    }

    #[tokio::test]
    async fn failed_lookup_is_not_repeated() {
        let mut channel = UdpChannel {
            host: "collector.invalid".into(),
            port: 5050,
            peer: None,
            retry_at: None,
            socket: None,
        };

        assert!(channel.send(b"record").await.is_err());
        assert!(channel.retry_at.is_some());

        let start = Instant::now();
        let error = channel.send(b"record").await.unwrap_err();
        assert!(error.to_string().contains("did not resolve recently"), "{error}");
        assert!(start.elapsed() < RESOLVE_TIMEOUT);
        assert!(channel.peer.is_none());
    }

    #[test]
    fn node_name_is_never_empty() {
        assert!(!node_name().is_empty());
    }
}
