use tokio::time::Instant;

/// Snapshot of the resident model
///
/// The backend itself stays owned by the lifecycle manager. Two handles refer
/// to the same loaded backend iff their `instance_id`s match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRuntimeHandle {
    pub model_id: String,
    pub instance_id: u64,
    pub loaded_at: Instant,
    pub last_used_at: Instant,
}

impl ModelRuntimeHandle {
    pub(crate) fn new(model_id: impl Into<String>, instance_id: u64) -> Self {
        let now = Instant::now();
        Self {
            model_id: model_id.into(),
            instance_id,
            loaded_at: now,
            last_used_at: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }

    #[must_use]
    pub fn same_backend(&self, other: &Self) -> bool {
        self.instance_id == other.instance_id
    }
}
