use anyhow::Result;

use voltronic_bridge::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::new();

    if let Err(e) = voltronic_bridge::run(options).await {
        error!("Application error: {:#}", e);
        std::process::exit(255);
    }

    Ok(())
}
