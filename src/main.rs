use anyhow::Result;
use eos::driver::EosDriver;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let mut driver =
        EosDriver::new().map_err(|e| anyhow::anyhow!("Failed to create driver: {}", e))?;

    info!("Eos EV charging load balancer starting up");

    match driver.run().await {
        Ok(_) => {
            info!("Driver shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Driver failed with error: {}", e);
            Err(anyhow::anyhow!("Driver error: {}", e))
        }
    }
}
