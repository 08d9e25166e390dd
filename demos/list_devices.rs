//! List devices and toggle the first one.
//!
//! ```sh
//! AMBIENTLED_TOKEN=... AMBIENTLED_URL=wss://lights.local:3000 \
//!     cargo run --example list_devices
//! ```

use ambientled_client_sdk::client::Client;
use ambientled_client_sdk::device::UpdateParams;
use ambientled_client_sdk::session::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let token = std::env::var("AMBIENTLED_TOKEN")?;
    let endpoint =
        std::env::var("AMBIENTLED_URL").unwrap_or_else(|_| "ws://localhost:3000".to_owned());

    let client = Client::connect(&token, &endpoint, Config::default()).await?;

    let devices = client.devices().await?;
    for device in &devices {
        println!(
            "{} ({}) online={} on={} brightness={}",
            device.name, device.id, device.online, device.data.lighting, device.data.brightness
        );
    }

    if let Some(device) = devices.first() {
        let params = UpdateParams::builder().brightness(75).build();
        client.turn_on(&device.id, params).await?;
        println!("turned {} on at 75% brightness", device.name);
    }

    client.disconnect().await;
    Ok(())
}
