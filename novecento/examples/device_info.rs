//! Query device information

use novecento::{Device, DeviceConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (RUST_LOG=debug for protocol steps)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Change to your device IP
    let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "169.254.1.10".to_string());

    println!("Connecting to {}...", ip);

    let mut device = Device::new(ip, 23456);
    device.connect().await?;

    // The default configuration enables no probes; only the aux bank streams
    let geometry = device.configure(&DeviceConfig::new()).await?;

    if let Some(info) = device.info() {
        println!("✓ Device: {}", info);
        println!("  Probe types: {:?}", info.probe_type_codes);
        println!("  Queried at: {}", info.queried_at);
    }
    println!("✓ Block size: {} bytes", geometry.block_byte_size());

    device.disconnect().await?;
    println!("✓ Disconnected");

    Ok(())
}
