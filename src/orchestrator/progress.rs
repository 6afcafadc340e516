//! Simulated analysis progress
//!
//! The stage list is cosmetic. It advances on a fixed timer and knows nothing
//! about what the backend is actually doing; the real request is never
//! delayed or influenced by it.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::classifier::QueryIntent;

/// Default cadence between stage advances
pub const DEFAULT_TICK: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressStage {
    pub label: &'static str,
    pub nominal_duration: Duration,
}

pub const STAGES: [ProgressStage; 5] = [
    ProgressStage {
        label: "Gathering market data...",
        nominal_duration: Duration::from_millis(1500),
    },
    ProgressStage {
        label: "Running technical analysis...",
        nominal_duration: Duration::from_millis(2000),
    },
    ProgressStage {
        label: "Analyzing fundamentals...",
        nominal_duration: Duration::from_millis(2000),
    },
    ProgressStage {
        label: "Processing news & sentiment...",
        nominal_duration: Duration::from_millis(1500),
    },
    ProgressStage {
        label: "Synthesizing recommendation...",
        nominal_duration: Duration::from_millis(2000),
    },
];

const LAST_STAGE: usize = STAGES.len() - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Idle,
    Running,
    Settled,
}

/// What the progress UI should show right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Orchestration run this snapshot belongs to (0 before the first run)
    pub run: u64,
    pub intent: Option<QueryIntent>,
    pub phase: ProgressPhase,
    /// Index into `STAGES`; equals `STAGES.len()` once settled
    pub stage_index: usize,
}

impl ProgressSnapshot {
    pub fn idle() -> Self {
        Self {
            run: 0,
            intent: None,
            phase: ProgressPhase::Idle,
            stage_index: 0,
        }
    }

    pub(crate) fn started(run: u64, intent: QueryIntent) -> Self {
        Self {
            run,
            intent: Some(intent),
            phase: ProgressPhase::Running,
            stage_index: 0,
        }
    }

    pub(crate) fn settled(run: u64, intent: QueryIntent) -> Self {
        Self {
            run,
            intent: Some(intent),
            phase: ProgressPhase::Settled,
            stage_index: STAGES.len(),
        }
    }

    /// Stage list is only shown while an analysis request is outstanding
    pub fn shows_stages(&self) -> bool {
        self.phase == ProgressPhase::Running && self.intent == Some(QueryIntent::Analysis)
    }

    pub fn current_stage(&self) -> Option<&'static ProgressStage> {
        if self.shows_stages() {
            STAGES.get(self.stage_index)
        } else {
            None
        }
    }
}

/// Handle to a running progress ticker.
///
/// `stop` is idempotent and synchronous: once it returns no further stage is
/// published. Dropping the handle stops it too.
pub struct ProgressSimulator {
    live: Arc<Mutex<bool>>,
    task: Option<JoinHandle<()>>,
    run: u64,
}

impl ProgressSimulator {
    /// Start ticking `run` forward from its current stage.
    pub fn start(progress: Arc<watch::Sender<ProgressSnapshot>>, run: u64, tick: Duration) -> Self {
        let live = Arc::new(Mutex::new(true));
        let task_live = Arc::clone(&live);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let capped = {
                    // Held while publishing so `stop` cannot interleave with a send
                    let live = task_live.lock().unwrap_or_else(|e| e.into_inner());
                    if !*live {
                        break;
                    }

                    let mut capped = false;
                    progress.send_if_modified(|snapshot| {
                        if snapshot.run != run || snapshot.phase != ProgressPhase::Running {
                            capped = true;
                            return false;
                        }
                        if snapshot.stage_index < LAST_STAGE {
                            snapshot.stage_index += 1;
                        }
                        capped = snapshot.stage_index >= LAST_STAGE;
                        debug!(run, stage = snapshot.stage_index, "Progress advanced");
                        true
                    });
                    capped
                };

                if capped {
                    break;
                }
            }
        });

        Self {
            live,
            task: Some(task),
            run,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn stop(&mut self) {
        *self.live.lock().unwrap_or_else(|e| e.into_inner()) = false;
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(run = self.run, "Progress simulator stopped");
        }
    }
}

impl Drop for ProgressSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}
