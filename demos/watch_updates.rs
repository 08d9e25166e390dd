//! Print every device update the backend pushes until Ctrl-C.
//!
//! ```sh
//! AMBIENTLED_TOKEN=... AMBIENTLED_URL=wss://lights.local:3000 \
//!     cargo run --example watch_updates
//! ```

use std::sync::Arc;

use ambientled_client_sdk::session::{Config, Session};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let token = std::env::var("AMBIENTLED_TOKEN")?;
    let endpoint =
        std::env::var("AMBIENTLED_URL").unwrap_or_else(|_| "ws://localhost:3000".to_owned());

    let session = Session::new(&token, &endpoint, Config::default())?;
    session.connect().await?;

    session.subscribe(Arc::new(|device| {
        println!(
            "{}: on={} brightness={} color={} effect={}",
            device.name,
            device.data.lighting,
            device.data.brightness,
            device.data.color.as_deref().unwrap_or("-"),
            device.data.effect.as_deref().unwrap_or("-"),
        );
    }));

    println!("watching for updates, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    session.disconnect().await;
    Ok(())
}
