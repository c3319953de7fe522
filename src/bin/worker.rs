#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = solvio_rust::run_worker().await {
        eprintln!("solvio-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
