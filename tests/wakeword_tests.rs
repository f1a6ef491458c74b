use llama_assistant::config::WakeWordConfig;
use llama_assistant::error::WakeWordError;
use llama_assistant::wakeword::{
    AudioSource, MonitorState, PredictionBuffer, WakeWordEvent, WakeWordMonitor, WakeWordScorer,
};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Noise frames, then an error once the script runs out
struct NoiseSource {
    remaining: usize,
}

impl AudioSource for NoiseSource {
    fn read(&mut self, frame_size: usize) -> Result<Vec<i16>, WakeWordError> {
        if self.remaining == 0 {
            return Err(WakeWordError::Source("end of recording".to_string()));
        }
        self.remaining -= 1;

        let mut rng = rand::thread_rng();
        Ok((0..frame_size).map(|_| rng.gen_range(-500..500)).collect())
    }
}

/// Replays fixed per-keyword scores, one row per frame
struct ScriptedScorer {
    rows: VecDeque<Vec<(&'static str, f32)>>,
    buffer: PredictionBuffer,
}

impl ScriptedScorer {
    fn single(keyword: &'static str, scores: &[f32]) -> Self {
        Self::rows(scores.iter().map(|&s| vec![(keyword, s)]).collect())
    }

    fn rows(rows: Vec<Vec<(&'static str, f32)>>) -> Self {
        Self {
            rows: rows.into(),
            buffer: PredictionBuffer::default(),
        }
    }
}

impl WakeWordScorer for ScriptedScorer {
    fn load(&mut self) -> Result<(), WakeWordError> {
        Ok(())
    }

    fn predict(&mut self, frame: &[i16]) -> Result<&PredictionBuffer, WakeWordError> {
        if frame.is_empty() {
            return Err(WakeWordError::Scorer("empty frame".to_string()));
        }
        if let Some(row) = self.rows.pop_front() {
            for (keyword, score) in row {
                self.buffer.push(keyword, score);
            }
        }
        Ok(&self.buffer)
    }

    fn unload(&mut self) {
        self.buffer.clear();
    }
}

fn config(threshold: f32) -> WakeWordConfig {
    WakeWordConfig {
        threshold,
        throttle_ms: 0,
        ..WakeWordConfig::default()
    }
}

/// Run the monitor until the source is exhausted and collect its events
fn run_to_end(
    config: &WakeWordConfig,
    frames: usize,
    scorer: ScriptedScorer,
) -> Vec<WakeWordEvent> {
    let (tx, mut rx) = mpsc::channel(64);
    let mut monitor = WakeWordMonitor::spawn(
        config,
        move || Ok(NoiseSource { remaining: frames }),
        scorer,
        tx,
    )
    .unwrap();

    // The source error ends the loop on its own
    let mut events = Vec::new();
    while let Some(event) = rx.blocking_recv() {
        events.push(event);
    }

    monitor.stop();
    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert!(!monitor.is_running());
    events
}

#[test]
fn test_score_above_threshold_emits_once() {
    let events = run_to_end(&config(0.5), 2, ScriptedScorer::single("hey_llama", &[0.3, 0.6]));
    assert_eq!(
        events,
        vec![WakeWordEvent {
            keyword: "hey_llama".to_string()
        }]
    );
}

#[test]
fn test_scores_at_or_below_threshold_emit_nothing() {
    let events = run_to_end(
        &config(0.5),
        4,
        ScriptedScorer::single("hey_llama", &[0.1, 0.5, 0.49, 0.2]),
    );
    assert!(events.is_empty());
}

#[test]
fn test_configured_threshold_is_used() {
    let events = run_to_end(&config(0.7), 2, ScriptedScorer::single("hey_llama", &[0.6, 0.65]));
    assert!(events.is_empty());

    let events = run_to_end(&config(0.2), 2, ScriptedScorer::single("hey_llama", &[0.1, 0.3]));
    assert_eq!(events.len(), 1);
}

#[test]
fn test_each_keyword_reported() {
    let scorer = ScriptedScorer::rows(vec![
        vec![("alexa", 0.9), ("hey_llama", 0.1)],
        vec![("alexa", 0.2), ("hey_llama", 0.8)],
    ]);
    let events = run_to_end(&config(0.5), 2, scorer);

    let keywords: Vec<_> = events.into_iter().map(|e| e.keyword).collect();
    assert_eq!(keywords, vec!["alexa", "hey_llama"]);
}

#[test]
fn test_sustained_score_emits_per_frame() {
    let events = run_to_end(&config(0.5), 3, ScriptedScorer::single("hey_llama", &[0.7, 0.8, 0.9]));
    assert_eq!(events.len(), 3);
}

#[test]
fn test_stop_while_listening() {
    let (tx, mut rx) = mpsc::channel(64);
    let mut monitor = WakeWordMonitor::spawn(
        &config(0.5),
        || Ok(NoiseSource { remaining: usize::MAX }),
        ScriptedScorer::single("hey_llama", &[]),
        tx,
    )
    .unwrap();

    monitor.stop();
    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert!(!monitor.is_running());
    assert!(rx.try_recv().is_err());
}

/// Silent frames, counting every read
struct CountingSource {
    reads: Arc<AtomicUsize>,
}

impl AudioSource for CountingSource {
    fn read(&mut self, frame_size: usize) -> Result<Vec<i16>, WakeWordError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0; frame_size])
    }
}

/// Scores every frame the same
struct ConstantScorer {
    score: f32,
    buffer: PredictionBuffer,
}

impl WakeWordScorer for ConstantScorer {
    fn load(&mut self) -> Result<(), WakeWordError> {
        Ok(())
    }

    fn predict(&mut self, _frame: &[i16]) -> Result<&PredictionBuffer, WakeWordError> {
        self.buffer.push("hey_llama", self.score);
        Ok(&self.buffer)
    }

    fn unload(&mut self) {}
}

fn wait_for_reads(reads: &AtomicUsize, at_least: usize) {
    let started = Instant::now();
    while reads.load(Ordering::SeqCst) < at_least {
        assert!(started.elapsed() < Duration::from_secs(5), "monitor never read audio");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_no_read_after_stop() {
    let reads = Arc::new(AtomicUsize::new(0));
    let (tx, _rx) = mpsc::channel(64);
    let mut monitor = WakeWordMonitor::spawn(
        &config(0.5),
        {
            let reads = Arc::clone(&reads);
            move || Ok(CountingSource { reads })
        },
        ConstantScorer {
            score: 0.0,
            buffer: PredictionBuffer::default(),
        },
        tx,
    )
    .unwrap();

    wait_for_reads(&reads, 3);
    monitor.stop();
    let after_stop = reads.load(Ordering::SeqCst);

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(reads.load(Ordering::SeqCst), after_stop);
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[test]
fn test_stop_with_undrained_events() {
    let reads = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = mpsc::channel(1);
    let monitor = WakeWordMonitor::spawn(
        &config(0.5),
        {
            let reads = Arc::clone(&reads);
            move || Ok(CountingSource { reads })
        },
        ConstantScorer {
            score: 0.9,
            buffer: PredictionBuffer::default(),
        },
        tx,
    )
    .unwrap();

    // Channel holds one event; the rest have nowhere to go
    wait_for_reads(&reads, 5);
    assert!(monitor.is_running());

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let mut monitor = monitor;
        monitor.stop();
        done_tx.send(monitor.state()).ok();
    });

    let state = done_rx
        .recv_timeout(Duration::from_secs(3))
        .expect("stop() blocked on a full event channel");
    assert_eq!(state, MonitorState::Stopped);

    assert_eq!(
        rx.try_recv().unwrap(),
        WakeWordEvent {
            keyword: "hey_llama".to_string()
        }
    );
}
