//! Configuration negotiation
//!
//! The device answers every query with a fixed 20-byte response and starts
//! streaming as soon as it accepts a configuration frame with the stream
//! bit set. Negotiation therefore runs strictly request/response and must
//! finish before anything else reads from the connection.

use std::time::Duration;

use tracing::{debug, info, trace, warn};

use novecento_core::{
    constants::{DEFAULT_TIMEOUT, RESPONSE_SIZE},
    BatteryResponse, Command, ConfigFrame, DeviceConfig, FirmwareResponse, PacketGeometry,
    Response, SettingsResponse, DEFAULT_FRAMES_PER_BLOCK,
};
use novecento_transport::Transport;
use novecento_types::DeviceInfo;

use crate::error::{Error, HandshakeStep, Result};

/// Negotiation options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiateOptions {
    /// Frames grouped into one decoded block
    pub frames_per_block: usize,

    /// How long to wait for each 20-byte response
    pub response_timeout: Duration,
}

impl Default for NegotiateOptions {
    fn default() -> Self {
        Self {
            frames_per_block: DEFAULT_FRAMES_PER_BLOCK,
            response_timeout: Duration::from_secs(DEFAULT_TIMEOUT),
        }
    }
}

/// Outcome of a successful negotiation
#[derive(Debug, Clone)]
pub struct Negotiated {
    /// Geometry of the stream the device is now sending
    pub geometry: PacketGeometry,

    /// Firmware, battery and probe information
    pub info: DeviceInfo,

    /// Settings before the configuration frame was sent
    pub baseline: SettingsResponse,

    /// Settings after the device accepted the configuration
    pub accepted: SettingsResponse,

    /// Receive buffer granted by the OS, if resizing succeeded
    pub receive_buffer: Option<usize>,
}

/// Negotiate a configuration with the device
///
/// Queries firmware, battery and current settings, sends the configuration
/// frame and reads the settings back. The returned geometry is derived from
/// the post-configuration response, so slots without a probe are dropped
/// even if the configuration requested them.
///
/// The device is streaming when this returns `Ok`. If anything fails after
/// the configuration frame went out, a stop frame is sent before the error
/// is returned.
pub async fn negotiate(
    transport: &mut dyn Transport,
    config: &DeviceConfig,
    options: &NegotiateOptions,
) -> Result<Negotiated> {
    if !transport.is_connected() {
        return Err(Error::NotConnected);
    }
    if options.frames_per_block == 0 {
        return Err(novecento_core::Error::InvalidFramesPerBlock.into());
    }

    // Reject bad selectors before touching the device
    let frame = ConfigFrame::encode(config)?;
    let timeout = options.response_timeout;

    let firmware = FirmwareResponse::decode(
        &query(transport, Command::QueryFirmware, HandshakeStep::QueryFirmware, timeout).await?,
    )?;
    debug!("Firmware identifier: {}", hex::encode(firmware.identifier()));

    let battery = BatteryResponse::decode(
        &query(transport, Command::QueryBattery, HandshakeStep::QueryBattery, timeout).await?,
    )?;
    if battery.percent() > 100 {
        warn!("Battery level reported as {}%, keeping raw value", battery.percent());
    } else {
        debug!("Battery level: {}%", battery.percent());
    }

    let baseline = SettingsResponse::decode(
        &query(transport, Command::QuerySettings, HandshakeStep::QueryBaseline, timeout).await?,
    )?;
    ensure_ok(&baseline, HandshakeStep::QueryBaseline)?;
    debug!("Baseline probe types: {:?}", baseline.type_codes());

    let info = DeviceInfo::new(firmware.identifier(), battery.percent())
        .with_probe_type_codes(baseline.type_codes());

    trace!("Configuration frame: {:?}", frame);
    let sent = transport
        .send(frame.as_bytes())
        .await
        .map_err(Error::handshake(HandshakeStep::SendConfiguration));

    let outcome = match sent {
        Ok(()) => accept(transport, config, options).await,
        Err(e) => Err(e),
    };

    // The frame may have reached the device even if the send failed
    let (geometry, accepted) = match outcome {
        Ok(accepted) => accepted,
        Err(e) => {
            send_stop(transport).await;
            return Err(e);
        }
    };

    let wanted = geometry.block_byte_size() * 2;
    let receive_buffer = match transport.set_receive_buffer_size(wanted) {
        Ok(granted) => Some(granted),
        Err(e) => {
            warn!("Could not size receive buffer to {} bytes: {}", wanted, e);
            None
        }
    };

    info!(
        "Configured {} ({} active slots, {} bytes per block)",
        info,
        geometry.active_slots(),
        geometry.block_byte_size()
    );

    Ok(Negotiated {
        geometry,
        info,
        baseline,
        accepted,
        receive_buffer,
    })
}

/// Read back the settings after the configuration frame
async fn accept(
    transport: &mut dyn Transport,
    config: &DeviceConfig,
    options: &NegotiateOptions,
) -> Result<(PacketGeometry, SettingsResponse)> {
    let accepted = SettingsResponse::decode(
        &query(
            transport,
            Command::QuerySettings,
            HandshakeStep::QueryAccepted,
            options.response_timeout,
        )
        .await?,
    )?;
    ensure_ok(&accepted, HandshakeStep::QueryAccepted)?;

    let geometry = PacketGeometry::derive(config, &accepted, options.frames_per_block)?;
    Ok((geometry, accepted))
}

/// Tell the device to stop streaming
///
/// Does not wait for a reply. Failures are logged: the connection is
/// usually being torn down anyway.
pub async fn send_stop(transport: &mut dyn Transport) {
    if !transport.is_connected() {
        debug!("Skipping stop frame, transport already closed");
        return;
    }

    let frame = ConfigFrame::stop();
    trace!("Stop frame: {:?}", frame);

    match transport.send(frame.as_bytes()).await {
        Ok(()) => debug!("Stop frame sent"),
        Err(e) => warn!("Failed to send stop frame: {}", e),
    }
}

async fn query(
    transport: &mut dyn Transport,
    command: Command,
    step: HandshakeStep,
    timeout: Duration,
) -> Result<[u8; RESPONSE_SIZE]> {
    debug!("Sending {}", command);

    transport
        .send(&command.frame())
        .await
        .map_err(Error::handshake(step))?;

    let buf = transport
        .receive_exact(RESPONSE_SIZE, timeout)
        .await
        .map_err(Error::handshake(step))?;

    let response = Response::decode(&buf)?;
    if !response.echoes(command) {
        warn!(
            "{} answered with echo 0x{:02X}, continuing",
            command,
            response.echo()
        );
    }

    Ok(*response.as_bytes())
}

fn ensure_ok(settings: &SettingsResponse, step: HandshakeStep) -> Result<()> {
    let status = settings.status();
    if status.is_ok() {
        Ok(())
    } else {
        Err(Error::DeviceStatus { step, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{response, settings, ScriptedTransport};
    use novecento_core::{ChannelSlot, DeviceStatus, SampleRate};
    use pretty_assertions::assert_eq;

    fn three_probe_config() -> DeviceConfig {
        DeviceConfig::new()
            .with_slot(0, ChannelSlot::enabled())
            .with_slot(1, ChannelSlot::enabled())
            .with_slot(2, ChannelSlot::enabled())
    }

    fn happy_script(accepted_codes: [u8; 10]) -> ScriptedTransport {
        ScriptedTransport::new()
            .with_reply(response(0x02, b"NV-FW 2.1"))
            .with_reply(response(0x03, &[87]))
            .with_reply(settings([1, 1, 1, 0, 0, 0, 0, 0, 0, 0], 0))
            .with_reply(settings(accepted_codes, 0))
    }

    #[tokio::test]
    async fn test_negotiate_sends_frames_in_order() {
        let mut transport = happy_script([1, 1, 1, 0, 0, 0, 0, 0, 0, 0]);
        let config = three_probe_config();

        negotiate(&mut transport, &config, &NegotiateOptions::default())
            .await
            .unwrap();

        let expected: Vec<Vec<u8>> = vec![
            Command::QueryFirmware.frame().to_vec(),
            Command::QueryBattery.frame().to_vec(),
            Command::QuerySettings.frame().to_vec(),
            ConfigFrame::encode(&config).unwrap().as_bytes().to_vec(),
            Command::QuerySettings.frame().to_vec(),
        ];
        assert_eq!(transport.sent(), expected);
    }

    #[tokio::test]
    async fn test_negotiate_geometry_and_info() {
        let mut transport = happy_script([1, 1, 1, 0, 0, 0, 0, 0, 0, 0]);

        let negotiated = negotiate(&mut transport, &three_probe_config(), &NegotiateOptions::default())
            .await
            .unwrap();

        // Three 14-channel probes at 2 kHz
        assert_eq!(&negotiated.geometry.slot_sizes()[..3], &[56, 56, 56]);
        assert_eq!(negotiated.geometry.frame_slot_total(), 168 + 16 + 128);
        assert_eq!(negotiated.info.firmware_version(), "NV-FW 2.1");
        assert_eq!(negotiated.info.battery_percent, 87);
        assert_eq!(negotiated.info.connected_probes(), 3);

        let block = negotiated.geometry.block_byte_size();
        assert_eq!(transport.buffer_requests, vec![block * 2]);
        assert_eq!(negotiated.receive_buffer, Some(block * 2));
    }

    #[tokio::test]
    async fn test_missing_probe_drops_slot() {
        // Slot 1 requested active but the device reports no probe there
        let mut transport = happy_script([1, 0, 1, 0, 0, 0, 0, 0, 0, 0]);

        let negotiated = negotiate(&mut transport, &three_probe_config(), &NegotiateOptions::default())
            .await
            .unwrap();

        let geometry = &negotiated.geometry;
        assert!(geometry.is_active(0));
        assert!(!geometry.is_active(1));
        assert!(geometry.is_active(2));
        assert_eq!(&geometry.slot_offsets()[..4], &[0, 56, 56, 112]);
        assert_eq!(geometry.frame_slot_total(), 112 + 16 + 128);
    }

    #[tokio::test]
    async fn test_baseline_status_error() {
        let mut transport = ScriptedTransport::new()
            .with_reply(response(0x02, b""))
            .with_reply(response(0x03, &[50]))
            .with_reply(settings([0; 10], 255));

        let err = negotiate(&mut transport, &DeviceConfig::new(), &NegotiateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::DeviceStatus {
                step: HandshakeStep::QueryBaseline,
                status: DeviceStatus::ChecksumError,
            }
        ));
        // Configuration frame never sent
        assert_eq!(transport.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_configuration() {
        let mut transport = ScriptedTransport::new()
            .with_reply(response(0x02, b""))
            .with_reply(response(0x03, &[50]))
            .with_reply(settings([0; 10], 0))
            .with_reply(settings([0; 10], 7));

        let err = negotiate(&mut transport, &DeviceConfig::new(), &NegotiateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::DeviceStatus {
                step: HandshakeStep::QueryAccepted,
                status: DeviceStatus::Other(7),
            }
        ));

        // The device may already be streaming, so it is told to stop
        let sent = transport.sent();
        assert_eq!(sent.len(), 6);
        assert_eq!(sent[5], ConfigFrame::stop().as_bytes().to_vec());
    }

    #[tokio::test]
    async fn test_lost_accepted_response_stops_device() {
        let mut transport = ScriptedTransport::new()
            .with_reply(response(0x02, b""))
            .with_reply(response(0x03, &[50]))
            .with_reply(settings([0; 10], 0))
            .with_reply(vec![0x01, 0, 0]);

        let err = negotiate(&mut transport, &DeviceConfig::new(), &NegotiateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Handshake {
                step: HandshakeStep::QueryAccepted,
                source: novecento_transport::Error::ShortRead { expected: 20, actual: 3 },
            }
        ));
        assert_eq!(transport.sent().last().unwrap(), &ConfigFrame::stop().as_bytes().to_vec());
        assert!(transport.buffer_requests.is_empty());
    }

    #[tokio::test]
    async fn test_battery_above_hundred_is_kept() {
        let mut transport = ScriptedTransport::new()
            .with_reply(response(0x02, b"FW"))
            .with_reply(response(0x03, &[0xFF]))
            .with_reply(settings([1, 0, 0, 0, 0, 0, 0, 0, 0, 0], 0))
            .with_reply(settings([1, 0, 0, 0, 0, 0, 0, 0, 0, 0], 0));

        let negotiated = negotiate(&mut transport, &DeviceConfig::new(), &NegotiateOptions::default())
            .await
            .unwrap();

        assert_eq!(negotiated.info.battery_percent, 255);
        assert_eq!(negotiated.info.connected_probes(), 1);

        // No stop frame on success
        let stop = ConfigFrame::stop().as_bytes().to_vec();
        assert_eq!(transport.sent().len(), 5);
        assert!(!transport.sent().contains(&stop));
    }

    #[tokio::test]
    async fn test_short_response_reports_step() {
        let mut transport = ScriptedTransport::new()
            .with_reply(response(0x02, b""))
            .with_reply(vec![0x03, 40, 0, 0]);

        let err = negotiate(&mut transport, &DeviceConfig::new(), &NegotiateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Handshake {
                step: HandshakeStep::QueryBattery,
                source: novecento_transport::Error::ShortRead { expected: 20, actual: 4 },
            }
        ));
    }

    #[tokio::test]
    async fn test_closed_connection_reports_step() {
        let mut transport = ScriptedTransport::new();

        let err = negotiate(&mut transport, &DeviceConfig::new(), &NegotiateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Handshake {
                step: HandshakeStep::QueryFirmware,
                source: novecento_transport::Error::ConnectionClosed,
            }
        ));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_invalid_config_sends_nothing() {
        let mut transport = happy_script([0; 10]);
        let config = DeviceConfig::new().with_slot(0, ChannelSlot::enabled().with_gain(4));

        let err = negotiate(&mut transport, &config, &NegotiateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Core(novecento_core::Error::InvalidSelector { field: "gain", .. })
        ));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_zero_frames_per_block_rejected() {
        let mut transport = happy_script([0; 10]);
        let options = NegotiateOptions {
            frames_per_block: 0,
            ..NegotiateOptions::default()
        };

        let err = negotiate(&mut transport, &DeviceConfig::new(), &options)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Core(novecento_core::Error::InvalidFramesPerBlock)));
    }

    #[tokio::test]
    async fn test_frames_per_block_scales_block() {
        let mut transport = happy_script([0; 10]);
        let options = NegotiateOptions {
            frames_per_block: 3,
            ..NegotiateOptions::default()
        };
        let config = DeviceConfig::new().with_aux_rate(SampleRate::Hz2000);

        let negotiated = negotiate(&mut transport, &config, &options).await.unwrap();

        assert_eq!(negotiated.geometry.frame_slot_total(), 64 + 128);
        assert_eq!(negotiated.geometry.block_byte_size(), 192 * 500 * 3 * 2);
    }

    #[tokio::test]
    async fn test_echo_mismatch_is_tolerated() {
        let mut transport = ScriptedTransport::new()
            .with_reply(response(0x7F, b"x"))
            .with_reply(response(0x03, &[10]))
            .with_reply(settings([0; 10], 0))
            .with_reply(settings([0; 10], 0));

        assert!(negotiate(&mut transport, &DeviceConfig::new(), &NegotiateOptions::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_send_stop() {
        let mut transport = ScriptedTransport::new();
        send_stop(&mut transport).await;
        assert_eq!(transport.sent(), vec![ConfigFrame::stop().as_bytes().to_vec()]);
    }

    #[tokio::test]
    async fn test_send_stop_after_close_is_silent() {
        let mut transport = ScriptedTransport::new();
        transport.disconnect().await.unwrap();

        send_stop(&mut transport).await;
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_stop_failure_is_logged() {
        let mut transport = ScriptedTransport::new().failing_sends();
        send_stop(&mut transport).await;
        assert!(transport.sent().is_empty());
    }
}
