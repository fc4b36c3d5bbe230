use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    onboard_watcher::run().await?;
    Ok(())
}
