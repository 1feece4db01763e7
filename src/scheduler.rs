use crate::prelude::*;

use std::time::Duration;
use tokio::time::Instant;

pub type Task = Box<dyn FnMut() -> Result<()> + Send>;

struct ScheduledTask {
    name: &'static str,
    period: Duration,
    next_run: Instant,
    task: Task,
}

/// Cooperative loop for the consumer side: an ordered list of periodic tasks,
/// none of which may block on the inverter link.
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task that first runs immediately and then every `period`.
    pub fn every<F>(mut self, name: &'static str, period: Duration, task: F) -> Self
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        self.tasks.push(ScheduledTask {
            name,
            period,
            next_run: Instant::now(),
            task: Box::new(task),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.iter().map(|t| t.next_run).min()
    }

    /// Runs every task due at `now`, in registration order. Returns how many
    /// ran.
    pub fn run_due(&mut self, now: Instant) -> usize {
        let mut ran = 0;

        for t in self.tasks.iter_mut().filter(|t| t.next_run <= now) {
            if let Err(e) = (t.task)() {
                error!("task {} failed: {}", t.name, e);
            }
            ran += 1;

            // stay on the same cadence, skipping ahead only if we fell behind
            t.next_run += t.period;
            if t.next_run <= now {
                let behind = now.duration_since(t.next_run);
                let missed = (behind.as_nanos() / t.period.as_nanos().max(1)) as u32 + 1;
                t.next_run += t.period * missed;
                debug!("task {} skipped {} runs", t.name, missed);
            }
        }

        ran
    }

    pub async fn start(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        debug!("scheduler starting with {} tasks", self.tasks.len());

        loop {
            let Some(deadline) = self.next_deadline() else {
                let _ = shutdown.recv().await;
                break;
            };

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    self.run_due(Instant::now());
                }
                _ = shutdown.recv() => break,
            }
        }

        debug!("scheduler exiting");
        Ok(())
    }
}
