//! Periodic and event-driven refresh triggers.
//!
//! The scheduler owns at most one timer task. The interval is read from
//! [`Settings`] whenever the timer (re)starts, so a changed interval takes
//! effect on the next activation rather than mid-interval.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::Settings;
use crate::repository::{QuizRepository, RefreshOutcome};

/// What caused a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// Periodic timer tick
    Timer,
    /// The app came back to the foreground
    Foreground,
    /// The user asked for it (pull-to-refresh)
    Manual,
}

impl RefreshTrigger {
    /// Automatic triggers stay quiet on failure; user-initiated ones report.
    pub fn is_silent(self) -> bool {
        !matches!(self, RefreshTrigger::Manual)
    }
}

pub struct RefreshScheduler {
    repository: Arc<QuizRepository>,
    settings: Arc<Settings>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(repository: Arc<QuizRepository>, settings: Arc<Settings>) -> Self {
        Self {
            repository,
            settings,
            timer: Mutex::new(None),
        }
    }

    /// (Re)start the periodic timer with the currently configured interval.
    ///
    /// Any previous timer is cancelled first. Returns the interval in use,
    /// or `None` when periodic refresh is disabled.
    pub fn start(&self) -> Option<Duration> {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timer.take() {
            previous.abort();
        }

        let period = match self.settings.refresh_interval() {
            Some(period) => period,
            None => {
                debug!("Periodic refresh disabled");
                return None;
            }
        };

        info!(secs = period.as_secs_f64(), "Starting periodic refresh");
        let repository = Arc::clone(&self.repository);
        *timer = Some(tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                // Detached so stopping the timer never cancels a refresh
                let repository = Arc::clone(&repository);
                tokio::spawn(async move {
                    repository.refresh(RefreshTrigger::Timer.is_silent()).await;
                });
            }
        }));
        Some(period)
    }

    /// Cancel the periodic timer. In-flight refreshes run to completion.
    pub fn stop(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = timer.take() {
            handle.abort();
            debug!("Periodic refresh stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        let timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        timer.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// App returned to the foreground: pick up interval changes and refresh
    /// quietly.
    pub async fn on_foreground(&self) -> RefreshOutcome {
        self.start();
        self.trigger(RefreshTrigger::Foreground).await
    }

    /// User-initiated refresh; failures are reported to subscribers.
    pub async fn pull_to_refresh(&self) -> RefreshOutcome {
        self.trigger(RefreshTrigger::Manual).await
    }

    pub async fn trigger(&self, trigger: RefreshTrigger) -> RefreshOutcome {
        debug!(?trigger, "Refresh triggered");
        self.repository.refresh(trigger.is_silent()).await
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
