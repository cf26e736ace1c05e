use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    handoff_cli::run().await
}
