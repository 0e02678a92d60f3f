use anyhow::Result;

fn main() -> Result<()> {
    bucketload_generator::cli::execute()
}
