use std::{future::Future, time::Duration};

use tokio::task::JoinHandle;

/// Single-shot, re-armable timer.
///
/// Every `arm` and `cancel` bumps a generation counter. The callback receives
/// the generation it was armed with; the owner must check it with
/// [`IdleTimer::claim`] under its own lock before acting, which turns any
/// timer that lost a race with a later arm/cancel into a no-op.
#[derive(Debug, Default)]
pub struct IdleTimer {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl IdleTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any outstanding timer.
    pub fn arm<F, Fut>(&mut self, after: Duration, on_fire: F)
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            on_fire(generation).await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Accepts a firing from `generation` if it is still the armed one.
    ///
    /// On success the timer becomes disarmed without aborting the task, since
    /// the caller is usually running inside it.
    pub fn claim(&mut self, generation: u64) -> bool {
        if self.task.is_none() || self.generation != generation {
            return false;
        }
        self.task = None;
        self.generation = self.generation.wrapping_add(1);
        true
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
