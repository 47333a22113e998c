//! Audio device selection.
//!
//! The engine wants one full-duplex device running stereo at the fixed
//! 44,100 Hz engine rate; everything here exists to find that device and
//! pick stream configurations that fit.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SupportedStreamConfig};

use crate::types::SAMPLE_RATE;

/// One row of the --list-devices output
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub max_input_channels: usize,
    pub sample_rate: u32,
}

/// Enumerate input devices, flagging the host default
pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|device| device.name().ok());

    let mut devices = Vec::new();

    for device in host.input_devices()? {
        let name = match device.name() {
            Ok(name) => name,
            Err(_) => continue,
        };

        let (max_input_channels, sample_rate) = match device.default_input_config() {
            Ok(cfg) => (cfg.channels() as usize, cfg.sample_rate().0),
            Err(_) => (0, 0),
        };

        devices.push(AudioDeviceInfo {
            is_default: Some(&name) == default_name.as_ref(),
            name,
            max_input_channels,
            sample_rate,
        });
    }

    Ok(devices)
}

/// Resolve a device selector to an input device.
///
/// No selector means the host default. A numeric selector indexes the
/// input-device list; anything else matches device names
/// case-insensitively as a fragment.
pub fn select_input_device(selector: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    let selector = match selector {
        Some(selector) => selector,
        None => {
            return host
                .default_input_device()
                .context("No default input device available");
        }
    };

    let devices: Vec<Device> = host.input_devices()?.collect();

    if let Ok(index) = selector.parse::<usize>() {
        let count = devices.len();
        return devices.into_iter().nth(index).with_context(|| {
            format!("Audio device index {} out of range (found {} devices)", index, count)
        });
    }

    let fragment = selector.to_lowercase();
    for device in devices {
        if let Ok(name) = device.name() {
            if name.to_lowercase().contains(&fragment) {
                return Ok(device);
            }
        }
    }

    anyhow::bail!("Audio device '{}' not found", selector)
}

/// Whether a config range can carry the engine format: at least stereo,
/// with the engine rate inside its bounds
fn range_fits(channels: u16, min_rate: u32, max_rate: u32) -> bool {
    channels >= 2 && min_rate <= SAMPLE_RATE && SAMPLE_RATE <= max_rate
}

/// Pick an input configuration: stereo at the engine rate if the device
/// offers it, otherwise the device default. All effect timing math
/// assumes 44,100 Hz, so a fallback rate is worth a warning upstream.
pub fn get_stereo_input_config(device: &Device) -> Result<SupportedStreamConfig> {
    if let Ok(configs) = device.supported_input_configs() {
        for range in configs {
            if range_fits(
                range.channels(),
                range.min_sample_rate().0,
                range.max_sample_rate().0,
            ) {
                return Ok(range.with_sample_rate(cpal::SampleRate(SAMPLE_RATE)));
            }
        }
    }

    device
        .default_input_config()
        .context("Failed to get default input config")
}

/// Pick an output configuration to pair with the input
pub fn get_stereo_output_config(device: &Device) -> Result<SupportedStreamConfig> {
    if let Ok(configs) = device.supported_output_configs() {
        for range in configs {
            if range_fits(
                range.channels(),
                range.min_sample_rate().0,
                range.max_sample_rate().0,
            ) {
                return Ok(range.with_sample_rate(cpal::SampleRate(SAMPLE_RATE)));
            }
        }
    }

    device
        .default_output_config()
        .context("Failed to get default output config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_range_rejected() {
        assert!(!range_fits(1, 8_000, 96_000));
    }

    #[test]
    fn test_stereo_range_covering_engine_rate_fits() {
        assert!(range_fits(2, 8_000, 96_000));
        // Exact-rate-only devices fit too
        assert!(range_fits(2, SAMPLE_RATE, SAMPLE_RATE));
    }

    #[test]
    fn test_range_excluding_engine_rate_rejected() {
        // 48 kHz-only hardware
        assert!(!range_fits(2, 48_000, 48_000));
        // High-rate-only range
        assert!(!range_fits(2, 88_200, 192_000));
    }

    #[test]
    fn test_multichannel_range_fits() {
        // Aggregate interfaces expose more than two channels; the first
        // stereo pair is what gets used
        assert!(range_fits(8, 44_100, 48_000));
    }
}
