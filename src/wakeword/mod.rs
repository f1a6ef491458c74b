//! Wake word monitor
//!
//! A dedicated thread reads fixed-size frames from an [`AudioSource`], scores
//! them with a [`WakeWordScorer`] and sends a [`WakeWordEvent`] for every
//! keyword whose latest score is above the threshold. Events are dropped
//! while the channel is full, so a slow listener never blocks shutdown. Any
//! read or scoring error stops the monitor; restarting is up to the owner.
//!
//! ```text
//! Idle -> Loading -> Listening -> Stopped
//! ```

pub mod microphone;
pub mod scorer;

pub use microphone::{AudioSource, CpalMicrophone};
pub use scorer::{PredictionBuffer, WakeWordScorer};

use crate::config::schema::WakeWordConfig;
use crate::error::WakeWordError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Lifecycle of a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Loading,
    Listening,
    Stopped,
}

/// A keyword crossed the detection threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeWordEvent {
    pub keyword: String,
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    threshold: f32,
    chunk_size: usize,
    throttle: Duration,
}

impl From<&WakeWordConfig> for Settings {
    fn from(config: &WakeWordConfig) -> Self {
        Self {
            threshold: config.threshold,
            chunk_size: config.chunk_size,
            throttle: Duration::from_millis(config.throttle_ms),
        }
    }
}

#[derive(Debug, Clone)]
struct SharedState(Arc<Mutex<MonitorState>>);

impl SharedState {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(MonitorState::Idle)))
    }

    fn set(&self, state: MonitorState) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn get(&self) -> MonitorState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a running wake word thread
///
/// Dropping the handle stops the thread.
#[derive(Debug)]
pub struct WakeWordMonitor {
    running: Arc<AtomicBool>,
    state: SharedState,
    worker: Option<JoinHandle<()>>,
}

impl WakeWordMonitor {
    /// Start listening on a new thread
    ///
    /// `open_source` runs on that thread, so the source itself need not be
    /// `Send`.
    pub fn spawn<A, F, S>(
        config: &WakeWordConfig,
        open_source: F,
        scorer: S,
        events: mpsc::Sender<WakeWordEvent>,
    ) -> Result<Self, WakeWordError>
    where
        A: AudioSource + 'static,
        F: FnOnce() -> Result<A, WakeWordError> + Send + 'static,
        S: WakeWordScorer + 'static,
    {
        let settings = Settings::from(config);
        let running = Arc::new(AtomicBool::new(true));
        let state = SharedState::new();

        let worker = std::thread::Builder::new()
            .name("wakeword".to_string())
            .spawn({
                let running = Arc::clone(&running);
                let state = state.clone();
                move || run(settings, open_source, scorer, &events, &running, &state)
            })?;

        Ok(Self {
            running,
            state,
            worker: Some(worker),
        })
    }

    /// Listen on the configured microphone
    ///
    /// Returns `None` when wake word detection is disabled in config.
    pub fn start<S>(
        config: &WakeWordConfig,
        scorer: S,
        events: mpsc::Sender<WakeWordEvent>,
    ) -> Result<Option<Self>, WakeWordError>
    where
        S: WakeWordScorer + 'static,
    {
        if !config.enabled {
            tracing::info!("Wake word detection disabled");
            return Ok(None);
        }

        let sample_rate = config.sample_rate;
        let device = config.device.clone();
        let open_source = move || CpalMicrophone::open(sample_rate, device.as_deref());
        Self::spawn(config, open_source, scorer, events).map(Some)
    }

    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.state.get()
    }

    /// Whether the loop is still active (it clears itself on error)
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the loop and wait for the thread to exit
    ///
    /// No audio is read after this returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Wake word thread panicked");
                self.state.set(MonitorState::Stopped);
            }
        }
    }
}

impl Drop for WakeWordMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<A, F, S>(
    settings: Settings,
    open_source: F,
    mut scorer: S,
    events: &mpsc::Sender<WakeWordEvent>,
    running: &AtomicBool,
    state: &SharedState,
) where
    A: AudioSource,
    F: FnOnce() -> Result<A, WakeWordError>,
    S: WakeWordScorer,
{
    state.set(MonitorState::Loading);

    let opened = open_source().and_then(|source| scorer.load().map(|()| source));
    match opened {
        Ok(mut source) => {
            state.set(MonitorState::Listening);
            tracing::info!("Listening for wake words");

            while running.load(Ordering::SeqCst) {
                if let Err(e) = listen_once(&settings, &mut source, &mut scorer, events) {
                    tracing::error!("Wake word monitor stopped: {e}");
                    break;
                }
                if !settings.throttle.is_zero() {
                    std::thread::sleep(settings.throttle);
                }
            }

            scorer.unload();
        }
        Err(e) => {
            tracing::error!("Failed to start wake word monitor: {e}");
        }
    }

    running.store(false, Ordering::SeqCst);
    state.set(MonitorState::Stopped);
}

fn listen_once<A, S>(
    settings: &Settings,
    source: &mut A,
    scorer: &mut S,
    events: &mpsc::Sender<WakeWordEvent>,
) -> Result<(), WakeWordError>
where
    A: AudioSource,
    S: WakeWordScorer,
{
    let frame = source.read(settings.chunk_size)?;
    let prediction = scorer.predict(&frame)?;
    tracing::trace!("Wake word scores:\n{prediction}");

    for keyword in prediction.detections(settings.threshold) {
        tracing::info!("Wakeword detected: {keyword}");
        let event = WakeWordEvent {
            keyword: keyword.to_string(),
        };
        match events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!("Event channel full, dropping '{}' detection", event.keyword);
            }
            Err(TrySendError::Closed(_)) => {
                return Err(WakeWordError::Source("event receiver dropped".to_string()));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedSource {
        frames: usize,
    }

    impl AudioSource for ScriptedSource {
        fn read(&mut self, frame_size: usize) -> Result<Vec<i16>, WakeWordError> {
            if self.frames == 0 {
                return Err(WakeWordError::Source("end of script".to_string()));
            }
            self.frames -= 1;
            Ok(vec![0; frame_size])
        }
    }

    struct ScriptedScorer {
        scores: VecDeque<f32>,
        buffer: PredictionBuffer,
        loaded: Arc<AtomicBool>,
    }

    impl WakeWordScorer for ScriptedScorer {
        fn load(&mut self) -> Result<(), WakeWordError> {
            self.loaded.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn predict(&mut self, frame: &[i16]) -> Result<&PredictionBuffer, WakeWordError> {
            assert_eq!(frame.len(), 1280);
            let score = self.scores.pop_front().unwrap_or(0.0);
            self.buffer.push("hey_llama", score);
            Ok(&self.buffer)
        }

        fn unload(&mut self) {
            self.loaded.store(false, Ordering::SeqCst);
        }
    }

    fn config() -> WakeWordConfig {
        WakeWordConfig {
            throttle_ms: 0,
            ..WakeWordConfig::default()
        }
    }

    #[test]
    fn test_scorer_released_on_stop() {
        let loaded = Arc::new(AtomicBool::new(false));
        let scorer = ScriptedScorer {
            scores: VecDeque::from(vec![0.1, 0.2]),
            buffer: PredictionBuffer::default(),
            loaded: Arc::clone(&loaded),
        };
        let (tx, _rx) = mpsc::channel(8);

        let mut monitor =
            WakeWordMonitor::spawn(&config(), || Ok(ScriptedSource { frames: 2 }), scorer, tx)
                .unwrap();
        monitor.stop();

        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert!(!monitor.is_running());
        assert!(!loaded.load(Ordering::SeqCst));
    }

    #[test]
    fn test_start_disabled_does_not_listen() {
        let loaded = Arc::new(AtomicBool::new(false));
        let scorer = ScriptedScorer {
            scores: VecDeque::new(),
            buffer: PredictionBuffer::default(),
            loaded: Arc::clone(&loaded),
        };
        let (tx, _rx) = mpsc::channel(8);
        let config = WakeWordConfig {
            enabled: false,
            ..config()
        };

        let monitor = WakeWordMonitor::start(&config, scorer, tx).unwrap();
        assert!(monitor.is_none());
        assert!(!loaded.load(Ordering::SeqCst));
    }

    #[test]
    #[ignore = "requires audio devices - may segfault in CI"]
    fn test_start_on_configured_device() {
        let scorer = ScriptedScorer {
            scores: VecDeque::new(),
            buffer: PredictionBuffer::default(),
            loaded: Arc::new(AtomicBool::new(false)),
        };
        let (tx, _rx) = mpsc::channel(8);
        let config = WakeWordConfig {
            device: Some("no-such-device".to_string()),
            ..config()
        };

        let mut monitor = WakeWordMonitor::start(&config, scorer, tx).unwrap().unwrap();
        monitor.stop();
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }

    #[test]
    fn test_source_open_failure_stops() {
        let scorer = ScriptedScorer {
            scores: VecDeque::new(),
            buffer: PredictionBuffer::default(),
            loaded: Arc::new(AtomicBool::new(false)),
        };
        let (tx, mut rx) = mpsc::channel(8);

        let mut monitor = WakeWordMonitor::spawn(
            &config(),
            || -> Result<ScriptedSource, WakeWordError> {
                Err(WakeWordError::Source("no microphone".to_string()))
            },
            scorer,
            tx,
        )
        .unwrap();
        monitor.stop();

        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_stops_monitor() {
        let scorer = ScriptedScorer {
            scores: std::iter::repeat(0.9).take(100).collect(),
            buffer: PredictionBuffer::default(),
            loaded: Arc::new(AtomicBool::new(false)),
        };
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        let mut monitor =
            WakeWordMonitor::spawn(&config(), || Ok(ScriptedSource { frames: 100 }), scorer, tx)
                .unwrap();
        monitor.stop();
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }
}
