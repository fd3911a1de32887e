#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mintyflow_lib::run().await
}
