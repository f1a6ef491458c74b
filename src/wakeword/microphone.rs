use crate::error::WakeWordError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Blocking PCM frame producer
pub trait AudioSource {
    /// Block until `frame_size` mono i16 samples are available
    fn read(&mut self, frame_size: usize) -> Result<Vec<i16>, WakeWordError>;
}

/// Microphone input through cpal
///
/// The stream is not `Send` on every platform, so open it on the thread that
/// reads from it.
pub struct CpalMicrophone {
    _stream: cpal::Stream,
    receiver: mpsc::Receiver<Vec<i16>>,
    pending: Vec<i16>,
    sample_rate: u32,
}

impl CpalMicrophone {
    /// Open a mono i16 input stream at exactly `sample_rate`
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate in Hz (16000 for wake word models)
    /// * `device_name` - Optional device name (None = default input device)
    pub fn open(sample_rate: u32, device_name: Option<&str>) -> Result<Self, WakeWordError> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            host.input_devices()
                .map_err(|e| WakeWordError::Source(format!("Failed to enumerate devices: {e}")))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| WakeWordError::Source(format!("Device '{name}' not found")))?
        } else {
            host.default_input_device()
                .ok_or_else(|| WakeWordError::Source("No default input device found".to_string()))?
        };

        let supported = device
            .supported_input_configs()
            .map_err(|e| WakeWordError::Source(format!("Failed to get supported configs: {e}")))?
            .any(|c| {
                c.channels() == 1
                    && c.sample_format() == cpal::SampleFormat::I16
                    && c.min_sample_rate().0 <= sample_rate
                    && c.max_sample_rate().0 >= sample_rate
            });
        if !supported {
            return Err(WakeWordError::Source(format!(
                "No supported config found (need mono i16 at {sample_rate} Hz)"
            )));
        }

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = mpsc::channel(100);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    match tx.try_send(data.to_vec()) {
                        Ok(()) | Err(TrySendError::Closed(_)) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::warn!("Audio buffer full, dropping {} samples", data.len());
                        }
                    }
                },
                move |err| {
                    tracing::error!("Audio stream error: {err}");
                },
                None,
            )
            .map_err(|e| WakeWordError::Source(format!("Failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| WakeWordError::Source(format!("Failed to start stream: {e}")))?;

        Ok(Self {
            _stream: stream,
            receiver: rx,
            pending: Vec::new(),
            sample_rate,
        })
    }

    /// List all available input devices
    #[must_use]
    pub fn list_devices() -> Vec<String> {
        let host = cpal::default_host();
        host.input_devices()
            .ok()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl AudioSource for CpalMicrophone {
    fn read(&mut self, frame_size: usize) -> Result<Vec<i16>, WakeWordError> {
        while self.pending.len() < frame_size {
            let chunk = self
                .receiver
                .blocking_recv()
                .ok_or_else(|| WakeWordError::Source("Audio stream closed".to_string()))?;
            self.pending.extend_from_slice(&chunk);
        }

        Ok(self.pending.drain(..frame_size).collect())
    }
}
