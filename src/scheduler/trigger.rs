//! Periodic trigger that owns the tick schedule.
//!
//! Interval changes arrive as commands over a channel and are applied between
//! ticks, so a reschedule never overlaps a running tick.

use crate::config::ScheduleInterval;
use crate::db::{DbError, Store};

use super::Dispatcher;

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Persists the interval the trigger is running on.
pub trait ScheduleStore: Send + Sync {
    fn save_schedule_interval(&self, interval: &ScheduleInterval) -> Result<(), DbError>;
}

impl ScheduleStore for Store {
    fn save_schedule_interval(&self, interval: &ScheduleInterval) -> Result<(), DbError> {
        self.set_schedule_interval(interval.as_str())
    }
}

/// Commands accepted by a running trigger.
#[derive(Debug, Clone)]
pub enum TriggerCommand {
    Reschedule(ScheduleInterval),
    Shutdown,
}

#[derive(Error, Debug)]
#[error("trigger is not running")]
pub struct TriggerStopped;

/// Cloneable handle for steering a running [`Trigger`].
#[derive(Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<TriggerCommand>,
}

impl TriggerHandle {
    /// Switch to a new interval once the current tick (if any) has finished.
    pub async fn reschedule(&self, interval: ScheduleInterval) -> Result<(), TriggerStopped> {
        self.tx
            .send(TriggerCommand::Reschedule(interval))
            .await
            .map_err(|_| TriggerStopped)
    }

    pub async fn shutdown(&self) -> Result<(), TriggerStopped> {
        self.tx
            .send(TriggerCommand::Shutdown)
            .await
            .map_err(|_| TriggerStopped)
    }
}

/// Owner of the schedule: runs one tick per interval until shut down.
pub struct Trigger {
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn ScheduleStore>,
    interval: ScheduleInterval,
    rx: mpsc::Receiver<TriggerCommand>,
}

impl Trigger {
    /// Start the trigger loop in a background task.
    ///
    /// The first tick fires one full interval after start.
    pub fn spawn(
        dispatcher: Arc<Dispatcher>,
        store: Arc<dyn ScheduleStore>,
        interval: ScheduleInterval,
    ) -> (TriggerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        let trigger = Self {
            dispatcher,
            store,
            interval,
            rx,
        };
        let task = tokio::spawn(trigger.run());
        (TriggerHandle { tx }, task)
    }

    async fn run(mut self) {
        tracing::info!("Scheduler started with interval: {}", self.interval);
        let mut ticker = new_ticker(&self.interval);

        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(TriggerCommand::Reschedule(interval)) => {
                        if let Err(e) = self.store.save_schedule_interval(&interval) {
                            tracing::error!("Failed to save interval {}: {}", interval, e);
                        }
                        tracing::info!("Changing scheduler interval to: {}", interval);
                        ticker = new_ticker(&interval);
                        self.interval = interval;
                    }
                    Some(TriggerCommand::Shutdown) | None => break,
                },
                _ = ticker.tick() => {
                    self.dispatcher.run_tick().await;
                }
            }
        }

        tracing::info!("Scheduler stopped");
    }
}

fn new_ticker(interval: &ScheduleInterval) -> Interval {
    let period = interval.period();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
