#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = solvio_rust::run().await {
        eprintln!("solvio-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
