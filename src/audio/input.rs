//! Microphone capture via cpal.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use super::analyzer::SpectrumSource;
use super::spectrum::{AnalyserSpectrum, SampleRing};
use super::AudioError;

/// Selectable input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub id: String,
    pub label: String,
}

/// Provider of live spectrum sources (the microphone, or a fake in tests)
pub trait AudioInput {
    fn enumerate_devices(&self) -> Vec<AudioDevice>;

    /// Open `device_id`, or the system default input when `None`
    fn get_stream(
        &mut self,
        device_id: Option<&str>,
        fft_size: usize,
    ) -> Result<Box<dyn SpectrumSource>, AudioError>;

    /// Release a stream; dropping it stops capture
    fn stop_stream(&mut self, stream: Box<dyn SpectrumSource>) {
        drop(stream);
        debug!("Audio stream stopped");
    }
}

/// List input devices on the default host.
///
/// Unnamed devices get a positional "Microphone N" label.
pub fn enumerate_devices() -> Vec<AudioDevice> {
    let host = cpal::default_host();
    match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(i, device)| {
                let label = device
                    .name()
                    .unwrap_or_else(|_| format!("Microphone {}", i + 1));
                AudioDevice {
                    id: label.clone(),
                    label,
                }
            })
            .collect(),
        Err(e) => {
            error!("Error enumerating audio devices: {}", e);
            Vec::new()
        }
    }
}

/// Running cpal input stream feeding a mono sample ring
pub struct AudioStream {
    _stream: cpal::Stream,
    ring: Arc<Mutex<SampleRing>>,
    sample_rate: f32,
}

impl AudioStream {
    /// Open and start capture; `capacity` is the ring size in samples
    pub fn open(device_id: Option<&str>, capacity: usize) -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = match device_id {
            Some(id) => host
                .input_devices()
                .map_err(|e| AudioError::Config(e.to_string()))?
                .find(|d| d.name().map(|n| n == id).unwrap_or(false))
                .ok_or_else(|| AudioError::DeviceNotFound(id.to_string()))?,
            None => host.default_input_device().ok_or(AudioError::NoDevice)?,
        };

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let config = device
            .default_input_config()
            .map_err(|e| AudioError::Config(e.to_string()))?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;

        info!(
            "Audio input: {} @ {}Hz, {} channel(s)",
            device_name, sample_rate, channels
        );

        let ring = Arc::new(Mutex::new(SampleRing::new(capacity)));
        let ring_clone = Arc::clone(&ring);

        let stream = match config.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), ring_clone, channels),
            SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), ring_clone, channels),
            SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), ring_clone, channels),
            other => {
                return Err(AudioError::Config(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        }
        .map_err(|e| AudioError::Build(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Play(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            ring,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Copy the latest captured samples, oldest first
    pub fn latest(&self, out: &mut [f32]) {
        self.ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .copy_latest(out);
    }
}

/// Live microphone spectrum: capture ring plus analyser
pub struct CaptureSource {
    stream: AudioStream,
    analyser: AnalyserSpectrum,
    window: Vec<f32>,
}

impl CaptureSource {
    pub fn new(stream: AudioStream, fft_size: usize) -> Self {
        Self {
            stream,
            analyser: AnalyserSpectrum::new(fft_size),
            window: vec![0.0; fft_size],
        }
    }
}

impl SpectrumSource for CaptureSource {
    fn sample_rate(&self) -> f32 {
        self.stream.sample_rate()
    }

    fn bin_count(&self) -> usize {
        self.analyser.bin_count()
    }

    fn window_len(&self) -> usize {
        self.analyser.fft_size()
    }

    fn frequency_data(&mut self, out: &mut [f32]) {
        self.stream.latest(&mut self.window);
        self.analyser.process(&self.window, out);
    }

    fn time_domain_data(&mut self, out: &mut [f32]) {
        self.stream.latest(out);
    }
}

/// [`AudioInput`] backed by the default cpal host
#[derive(Debug, Default)]
pub struct CpalInput;

impl AudioInput for CpalInput {
    fn enumerate_devices(&self) -> Vec<AudioDevice> {
        enumerate_devices()
    }

    fn get_stream(
        &mut self,
        device_id: Option<&str>,
        fft_size: usize,
    ) -> Result<Box<dyn SpectrumSource>, AudioError> {
        let stream = AudioStream::open(device_id, fft_size * 2)?;
        Ok(Box::new(CaptureSource::new(stream, fft_size)))
    }
}

fn build_stream<T: cpal::Sample + cpal::SizedSample>(
    device: &Device,
    config: &StreamConfig,
    ring: Arc<Mutex<SampleRing>>,
    channels: usize,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    f32: cpal::FromSample<T>,
{
    let channels = channels.max(1);
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            // Downmix interleaved frames to mono f32
            let mono: Vec<f32> = data
                .chunks(channels)
                .map(|frame| {
                    let sum: f32 = frame
                        .iter()
                        .map(|s| <f32 as cpal::Sample>::from_sample(*s))
                        .sum();
                    sum / channels as f32
                })
                .collect();

            ring.lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_samples(&mono);
        },
        |err| {
            error!("Audio stream error: {}", err);
        },
        None,
    )
}
