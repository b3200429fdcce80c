#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fitblocks_connect::run().await
}
