//! Platform audio: cpal input and output streams on one device.
//!
//! The input callback is the audio context. It accumulates incoming frames
//! into fixed 128-frame blocks, runs the effect pipeline on each, and pushes
//! the processed stereo frames into a wait-free ring. The output callback
//! drains the ring and emits silence on underrun — a missing block is heard
//! as silence, never an error path.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};

use crate::audio::device::{get_stereo_input_config, get_stereo_output_config};
use crate::audio::processor::BlockProcessor;
use crate::types::{BLOCK_SAMPLES, SAMPLE_RATE};

/// Monitor ring length in milliseconds (kept short for live feel)
const MONITOR_BUFFER_MS: usize = 50;

/// Accumulates input frames into fixed blocks, runs the pipeline, and
/// forwards processed audio to the output ring.
pub struct InputStage {
    processor: BlockProcessor,
    block_l: [i16; BLOCK_SAMPLES],
    block_r: [i16; BLOCK_SAMPLES],
    fill: usize,
    monitor: rtrb::Producer<f32>,
}

impl InputStage {
    pub fn new(processor: BlockProcessor, monitor: rtrb::Producer<f32>) -> Self {
        Self {
            processor,
            block_l: [0; BLOCK_SAMPLES],
            block_r: [0; BLOCK_SAMPLES],
            fill: 0,
            monitor,
        }
    }

    /// Feed interleaved f32 frames from the device. Whole blocks are
    /// processed as they complete; a partial tail stays staged for the
    /// next callback.
    pub fn feed(&mut self, data: &[f32], num_channels: usize) {
        if num_channels == 0 {
            return;
        }

        for frame in data.chunks_exact(num_channels) {
            let left = frame[0];
            let right = if num_channels > 1 { frame[1] } else { frame[0] };

            self.block_l[self.fill] = sample_to_i16(left);
            self.block_r[self.fill] = sample_to_i16(right);
            self.fill += 1;

            if self.fill == BLOCK_SAMPLES {
                self.processor.process_block(&mut self.block_l, &mut self.block_r);

                for i in 0..BLOCK_SAMPLES {
                    // Push drops on full; the output side will underrun to
                    // silence rather than anyone blocking
                    let _ = self.monitor.push(i16_to_sample(self.block_l[i]));
                    let _ = self.monitor.push(i16_to_sample(self.block_r[i]));
                }

                self.fill = 0;
            }
        }
    }
}

#[inline]
fn sample_to_i16(sample: f32) -> i16 {
    (sample * 32_767.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[inline]
fn i16_to_sample(sample: i16) -> f32 {
    sample as f32 / 32_768.0
}

/// Fill one output buffer from the monitor ring. Missing frames are
/// rendered as silence.
pub fn fill_output(data: &mut [f32], num_channels: usize, monitor: &mut rtrb::Consumer<f32>) {
    if num_channels == 0 {
        return;
    }

    for frame in data.chunks_exact_mut(num_channels) {
        let left = monitor.pop().unwrap_or(0.0);
        let right = monitor.pop().unwrap_or(0.0);

        for (channel, slot) in frame.iter_mut().enumerate() {
            *slot = match channel {
                0 => left,
                1 => right,
                _ => 0.0,
            };
        }
    }
}

/// Audio engine: owns the device and both streams.
pub struct AudioEngine {
    device: Device,
    input_config: StreamConfig,
    output_config: StreamConfig,
    input_stream: Option<Stream>,
    output_stream: Option<Stream>,
}

impl AudioEngine {
    /// Create an engine on the given full-duplex device
    pub fn with_device(device: Device) -> Result<Self> {
        let input_supported = get_stereo_input_config(&device)?;
        let output_supported = get_stereo_output_config(&device)?;

        let input_config = StreamConfig {
            channels: input_supported.channels(),
            sample_rate: input_supported.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(BLOCK_SAMPLES as u32),
        };

        let output_config = StreamConfig {
            channels: output_supported.channels(),
            sample_rate: output_supported.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(BLOCK_SAMPLES as u32),
        };

        Ok(Self {
            device,
            input_config,
            output_config,
            input_stream: None,
            output_stream: None,
        })
    }

    /// Build and start both streams, moving the processor into the input
    /// callback. Returns a warning string for non-fatal config mismatches.
    pub fn start(&mut self, processor: BlockProcessor) -> Result<Option<String>> {
        if self.input_stream.is_some() {
            return Ok(None);
        }

        let monitor_frames = SAMPLE_RATE as usize * 2 * MONITOR_BUFFER_MS / 1000;
        let (monitor_tx, mut monitor_rx) = rtrb::RingBuffer::new(monitor_frames);

        let mut stage = InputStage::new(processor, monitor_tx);
        let input_channels = self.input_config.channels as usize;
        let output_channels = self.output_config.channels as usize;

        let input_stream = self
            .device
            .build_input_stream(
                &self.input_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    stage.feed(data, input_channels);
                },
                |_err| {
                    // Stream errors surface as dropped audio; nothing to do
                    // from a callback context
                },
                None,
            )
            .context("Failed to build audio input stream")?;

        let output_stream = self
            .device
            .build_output_stream(
                &self.output_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    fill_output(data, output_channels, &mut monitor_rx);
                },
                |_err| {},
                None,
            )
            .context("Failed to build audio output stream")?;

        input_stream.play().context("Failed to play input stream")?;
        output_stream.play().context("Failed to play output stream")?;

        self.input_stream = Some(input_stream);
        self.output_stream = Some(output_stream);

        let mut warning = None;
        if self.input_config.sample_rate.0 != SAMPLE_RATE {
            warning = Some(format!(
                "Device runs at {}Hz, timing math assumes {}Hz. Quantization will drift.",
                self.input_config.sample_rate.0, SAMPLE_RATE
            ));
        } else if self.input_config.sample_rate.0 != self.output_config.sample_rate.0 {
            warning = Some(format!(
                "Sample rate mismatch: input {}Hz, output {}Hz. May cause choppy audio.",
                self.input_config.sample_rate.0, self.output_config.sample_rate.0
            ));
        }

        Ok(warning)
    }

    /// Stop and drop both streams
    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.input_stream.take() {
            stream.pause().context("Failed to pause input stream")?;
            drop(stream);
        }

        if let Some(stream) = self.output_stream.take() {
            stream.pause().context("Failed to pause output stream")?;
            drop(stream);
        }

        Ok(())
    }

    #[allow(dead_code)]
    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown".to_string())
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
