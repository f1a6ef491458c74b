use crate::error::WakeWordError;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Scores kept per keyword when no capacity is given
pub const DEFAULT_BUFFER_LEN: usize = 30;

/// Rolling per-keyword score history
#[derive(Debug, Clone)]
pub struct PredictionBuffer {
    scores: BTreeMap<String, VecDeque<f32>>,
    capacity: usize,
}

impl Default for PredictionBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_LEN)
    }
}

impl PredictionBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            scores: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a score, dropping the oldest once full
    pub fn push(&mut self, keyword: &str, score: f32) {
        let history = self.scores.entry(keyword.to_string()).or_default();
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(score);
    }

    /// Most recent score for `keyword`
    #[must_use]
    pub fn latest(&self, keyword: &str) -> Option<f32> {
        self.scores.get(keyword).and_then(|h| h.back().copied())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VecDeque<f32>)> {
        self.scores.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keywords whose most recent score is strictly above `threshold`
    pub fn detections(&self, threshold: f32) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(move |(_, h)| h.back().is_some_and(|&s| s > threshold))
            .map(|(k, _)| k)
    }

    pub fn clear(&mut self) {
        self.scores.clear();
    }
}

/// Latest score per keyword, one row each
impl fmt::Display for PredictionBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<18} | Score", "Model Name")?;
        write!(f, "{:-<26}", "")?;
        for (keyword, history) in self.iter() {
            if let Some(score) = history.back() {
                write!(f, "\n{keyword:<18} | {:.3}", score.abs())?;
            }
        }
        Ok(())
    }
}

/// Wake-word model contract
///
/// `load` is called when the monitor starts listening and `unload` when it
/// stops, both on the monitor thread.
pub trait WakeWordScorer: Send {
    fn load(&mut self) -> Result<(), WakeWordError>;

    /// Score one frame of 16 kHz mono PCM and return the updated history
    fn predict(&mut self, frame: &[i16]) -> Result<&PredictionBuffer, WakeWordError>;

    fn unload(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_latest() {
        let mut buffer = PredictionBuffer::new(3);
        assert_eq!(buffer.latest("hey_llama"), None);

        for score in [0.1, 0.2, 0.3, 0.4] {
            buffer.push("hey_llama", score);
        }

        assert_eq!(buffer.latest("hey_llama"), Some(0.4));
        let (_, history) = buffer.iter().next().unwrap();
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_detections_use_latest_score_only() {
        let mut buffer = PredictionBuffer::default();
        buffer.push("alexa", 0.9);
        buffer.push("alexa", 0.1);
        buffer.push("hey_llama", 0.3);
        buffer.push("hey_llama", 0.6);
        buffer.push("hey_jarvis", 0.5);

        let detected: Vec<_> = buffer.detections(0.5).collect();
        assert_eq!(detected, vec!["hey_llama"]);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut buffer = PredictionBuffer::new(0);
        buffer.push("k", 0.2);
        buffer.push("k", 0.7);
        assert_eq!(buffer.latest("k"), Some(0.7));
        assert_eq!(buffer.iter().next().unwrap().1.len(), 1);
    }

    #[test]
    fn test_display_latest_scores() {
        let mut buffer = PredictionBuffer::default();
        buffer.push("hey_llama", 0.1);
        buffer.push("hey_llama", 0.875);
        buffer.push("alexa", 0.25);

        let table = buffer.to_string();
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Model Name"));
        assert_eq!(lines[2], "alexa              | 0.250");
        assert_eq!(lines[3], "hey_llama          | 0.875");
    }

    #[test]
    fn test_display_empty() {
        let table = PredictionBuffer::default().to_string();
        assert_eq!(table.lines().count(), 2);
    }

    #[test]
    fn test_clear() {
        let mut buffer = PredictionBuffer::default();
        buffer.push("k", 0.7);
        buffer.clear();
        assert_eq!(buffer.detections(0.5).count(), 0);
    }
}
