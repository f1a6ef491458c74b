use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Cancellable single-shot idle timer
///
/// Every `arm` cancels the pending task and bumps the generation. A firing
/// task receives the generation it was armed with so its owner can ignore a
/// fire that lost the race against a rearm.
#[derive(Debug)]
pub(crate) struct IdleEvictionTimer {
    idle_timeout: Duration,
    generation: u64,
    deadline: Option<Instant>,
    task: Option<JoinHandle<()>>,
}

impl IdleEvictionTimer {
    pub(crate) const fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            generation: 0,
            deadline: None,
            task: None,
        }
    }

    /// Schedule `on_expire` to run `idle_timeout` from now
    pub(crate) fn arm<F, Fut>(&mut self, on_expire: F)
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.generation = self.generation.wrapping_add(1);

        let generation = self.generation;
        let deadline = Instant::now() + self.idle_timeout;
        self.deadline = Some(deadline);
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_expire(generation).await;
        }));

        tracing::debug!(
            "Idle timer armed (generation {generation}, {}s)",
            self.idle_timeout.as_secs()
        );
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.deadline = None;
    }

    /// Whether a fire carrying `generation` is still the pending one
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.deadline.is_some() && self.generation == generation
    }

    pub(crate) const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) const fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

impl Drop for IdleEvictionTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
