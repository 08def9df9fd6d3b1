//! founding-spots HTTP server

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    founding_spots::server::run().await
}
