use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::dispatcher::DeliveryDispatcher;
use crate::core::error::{Error, Result};
use crate::core::lifecycle::LifecycleComponent;
use crate::core::store::types::TaskStatus;
use crate::core::store::{ContentStore, NewErrorLog};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Releases due tasks into delivery. Post-now goes through the same claim,
/// so a task released here can never be delivered a second time elsewhere.
pub struct Scheduler {
    store: Arc<ContentStore>,
    dispatcher: Arc<DeliveryDispatcher>,
}

impl Scheduler {
    pub fn new(store: Arc<ContentStore>, dispatcher: Arc<DeliveryDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// One polling cycle: claim and deliver every task whose slot has
    /// passed, oldest slot first. Returns how many tasks this cycle
    /// actually claimed.
    pub async fn release_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.store.due_tasks(now).await?;
        let mut released = 0usize;

        for task in due {
            if !self
                .store
                .claim_task(&task.task_id, &[TaskStatus::Scheduled])
                .await?
            {
                // Lost the claim to a concurrent post-now or cancel.
                continue;
            }
            released += 1;
            info!("Releasing task {} for delivery", task.task_id);

            let selection = self.store.selected_platforms(&task.task_id).await?;
            let mut has_usable = false;
            for platform_id in &selection {
                if let Some(platform) = self.store.get_platform(platform_id).await? {
                    if platform.is_usable(now) {
                        has_usable = true;
                        break;
                    }
                }
            }

            // A selection that went entirely stale while the task waited
            // fails outright: one error-log entry, no attempt rows.
            if !has_usable {
                let err = if selection.is_empty() {
                    Error::PlatformUnavailable("task has no platform selection".into())
                } else {
                    Error::PlatformUnavailable(
                        "no selected platform is still active and unexpired".into(),
                    )
                };
                self.store
                    .record_error(NewErrorLog {
                        task_id: Some(task.task_id.clone()),
                        error_type: Some(err.error_type().to_string()),
                        error_code: Some(err.error_code().to_string()),
                        message: Some(err.to_string()),
                        ..Default::default()
                    })
                    .await?;
                self.store
                    .finish_task(&task.task_id, TaskStatus::Failed)
                    .await?;
                continue;
            }

            // A storage failure mid-round leaves the task in `dispatching`
            // for an operator to retry; the cycle moves on.
            if let Err(e) = self.dispatcher.deliver(&task.task_id).await {
                error!("Delivery of task {} aborted: {}", task.task_id, e);
            }
        }

        Ok(released)
    }
}

/// Background polling loop around the scheduler, wired into the daemon
/// lifecycle.
pub struct SchedulerWorker {
    scheduler: Arc<Scheduler>,
    poll_interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerWorker {
    pub fn new(scheduler: Arc<Scheduler>, poll_interval: Duration) -> Self {
        Self {
            scheduler,
            poll_interval,
            handle: None,
        }
    }
}

#[async_trait::async_trait]
impl LifecycleComponent for SchedulerWorker {
    async fn on_start(&mut self) -> anyhow::Result<()> {
        let scheduler = self.scheduler.clone();
        let poll_interval = self.poll_interval;
        info!(
            "Scheduler worker polling every {}s",
            poll_interval.as_secs()
        );

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.release_due(Utc::now()).await {
                    warn!("Scheduler cycle failed: {}", e);
                }
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> anyhow::Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        Ok(())
    }
}
