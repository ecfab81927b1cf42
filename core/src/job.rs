use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::{ParlanceError, Result};

#[derive(Debug, Clone, Default)]
pub struct JobConfig {
    /// Generated when absent.
    pub id: Option<String>,
    pub room_name: String,
    pub timeout: Option<Duration>,
}

type ShutdownHook = Box<dyn Fn(&str) + Send + Sync>;

/// One unit of work for an agent: a single conversation in a room.
pub struct Job {
    id: String,
    room_name: String,
    created_at: DateTime<Utc>,
    deadline: Option<Instant>,
    token: CancellationToken,
    shutdown_reason: Mutex<Option<String>>,
    hooks: Mutex<Vec<ShutdownHook>>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("room_name", &self.room_name)
            .field("created_at", &self.created_at)
            .field("shutdown_reason", &*self.shutdown_reason.lock())
            .finish_non_exhaustive()
    }
}

impl Job {
    /// Creates a job scoped under `parent`; cancelling the parent ends the job.
    pub fn new(parent: &CancellationToken, config: JobConfig) -> Result<Self> {
        if config.room_name.trim().is_empty() {
            return Err(ParlanceError::Job("room name is required".into()));
        }
        let id = config
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_job_id);
        Ok(Self {
            id,
            room_name: config.room_name,
            created_at: Utc::now(),
            deadline: config
                .timeout
                .filter(|t| !t.is_zero())
                .map(|t| Instant::now() + t),
            token: parent.child_token(),
            shutdown_reason: Mutex::new(None),
            hooks: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Ends the job; only the first reason is kept.
    ///
    /// Registered hooks run once, in registration order, with that reason.
    pub fn shutdown(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let first = {
            let mut slot = self.shutdown_reason.lock();
            if slot.is_none() {
                info!(target: "job", job_id = %self.id, reason = %reason, "Job shutdown requested");
                *slot = Some(reason.clone());
                true
            } else {
                false
            }
        };
        if first {
            let hooks = std::mem::take(&mut *self.hooks.lock());
            for hook in &hooks {
                hook(&reason);
            }
        }
        self.token.cancel();
    }

    /// Registers a callback for [`shutdown`](Self::shutdown). On a job that
    /// was already shut down it runs immediately with the recorded reason.
    pub fn on_shutdown(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        let mut hooks = self.hooks.lock();
        let reason = self.shutdown_reason.lock().clone();
        match reason {
            Some(reason) => {
                drop(hooks);
                hook(&reason);
            }
            None => hooks.push(Box::new(hook)),
        }
    }

    pub fn shutdown_reason(&self) -> Option<String> {
        self.shutdown_reason.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.deadline.map_or(true, |d| Instant::now() < d)
    }

    /// Completes when the job is shut down, its parent is cancelled or the timeout expires.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

fn generate_job_id() -> String {
    format!("job_{}", Uuid::new_v4().simple())
}
