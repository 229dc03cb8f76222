//! Binary entrypoint for the mission control tool

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    mission_control::cli::run().await
}
