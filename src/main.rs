#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gatepass::run().await
}
