//! Stream aux channels for a few seconds

use std::time::Duration;

use novecento::{ChannelSlot, Device, DeviceConfig, SampleRate};
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let ip = std::env::var("DEVICE_IP").unwrap_or_else(|_| "169.254.1.10".to_string());
    let seconds: u64 = std::env::var("SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    let mut device = Device::new(ip, 23456).with_timeout(Duration::from_secs(2));
    device.connect().await?;

    // Probes on the first three connectors, aux bank at 2 kHz
    let config = DeviceConfig::new()
        .with_slot(0, ChannelSlot::enabled())
        .with_slot(1, ChannelSlot::enabled())
        .with_slot(2, ChannelSlot::enabled())
        .with_aux_rate(SampleRate::Hz2000);

    let geometry = device.configure(&config).await?;
    println!(
        "Streaming {} active slots, {} bytes per block",
        geometry.active_slots(),
        geometry.block_byte_size()
    );

    let mut samples = device.start_streaming(4).await?;

    for _ in 0..seconds {
        match timeout(Duration::from_secs(3), samples.recv()).await {
            Ok(Some(matrix)) => {
                let peak = matrix
                    .channel(0)
                    .fold(0.0f64, |acc, v| acc.max(v.abs()));
                println!(
                    "block {:>4}: {} samples/channel, aux 0 peak {:.4} V",
                    matrix.sequence(),
                    matrix.samples_per_channel(),
                    peak
                );
            }
            Ok(None) => break,
            Err(_) => {
                println!("No block within 3s");
                break;
            }
        }
    }

    let stats = device.stop_streaming().await?;
    println!(
        "Decoded {} blocks ({} malformed, {} dropped)",
        stats.blocks_decoded,
        stats.blocks_malformed,
        device.blocks_dropped()
    );

    device.disconnect().await?;
    Ok(())
}
