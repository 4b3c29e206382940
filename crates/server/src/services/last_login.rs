//! Last-login propagation.
//!
//! In sync mode the write happens inline and its failure fails the login.
//! In queued mode writes go to a bounded channel drained by a background
//! worker; each write gets a few attempts and is then dropped. A full or
//! closed queue degrades to an inline write.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

use authsvc_core::UserId;

use crate::config::LastLoginMode;
use crate::db::{RepositoryError, UserStore};

/// Attempts per queued write.
const WRITE_ATTEMPTS: u32 = 3;

/// Base delay between attempts; attempt `n` waits `n * RETRY_BACKOFF`.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// One login to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRecord {
    pub user_id: UserId,
    pub ip: String,
    pub at: DateTime<Utc>,
}

impl LoginRecord {
    /// A login from `ip` happening now.
    #[must_use]
    pub fn now(user_id: UserId, ip: &str) -> Self {
        Self {
            user_id,
            ip: ip.to_owned(),
            at: Utc::now(),
        }
    }
}

/// Writes last-login metadata, inline or through a queue.
#[derive(Clone)]
pub struct LastLoginRecorder {
    users: Arc<dyn UserStore>,
    queue: Option<mpsc::Sender<LoginRecord>>,
}

impl LastLoginRecorder {
    /// Build a recorder for `mode`.
    ///
    /// Queued mode spawns the worker, so this must run inside a tokio
    /// runtime. The worker exits once every clone of the recorder is gone.
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, mode: LastLoginMode) -> Self {
        match mode {
            LastLoginMode::Sync => Self::sync(users),
            LastLoginMode::Queued { capacity } => Self::queued(users, capacity),
        }
    }

    /// Recorder that writes inline.
    #[must_use]
    pub fn sync(users: Arc<dyn UserStore>) -> Self {
        Self { users, queue: None }
    }

    /// Recorder backed by a queue of `capacity` pending writes.
    #[must_use]
    pub fn queued(users: Arc<dyn UserStore>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(Arc::clone(&users), rx));
        Self {
            users,
            queue: Some(tx),
        }
    }

    /// Whether writes are handed to the background worker.
    #[must_use]
    pub const fn is_queued(&self) -> bool {
        self.queue.is_some()
    }

    /// Record a login.
    ///
    /// # Errors
    ///
    /// In sync mode, returns the store error. Queued mode never fails; lost
    /// writes are logged.
    pub async fn record(&self, record: LoginRecord) -> Result<(), RepositoryError> {
        let Some(queue) = &self.queue else {
            return self
                .users
                .record_login(record.user_id, &record.ip, record.at)
                .await;
        };

        match queue.try_send(record) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(record) | TrySendError::Closed(record)) => {
                warn!(user_id = %record.user_id, "last-login queue unavailable, writing inline");
                if let Err(e) = self
                    .users
                    .record_login(record.user_id, &record.ip, record.at)
                    .await
                {
                    error!(user_id = %record.user_id, error = %e, "last-login write failed");
                }
                Ok(())
            }
        }
    }
}

async fn run_worker(users: Arc<dyn UserStore>, mut rx: mpsc::Receiver<LoginRecord>) {
    while let Some(record) = rx.recv().await {
        write_with_retry(users.as_ref(), &record).await;
    }
    debug!("last-login worker stopped");
}

async fn write_with_retry(users: &dyn UserStore, record: &LoginRecord) {
    for attempt in 1..=WRITE_ATTEMPTS {
        match users
            .record_login(record.user_id, &record.ip, record.at)
            .await
        {
            Ok(()) => return,
            Err(RepositoryError::NotFound) => {
                warn!(user_id = %record.user_id, "user vanished before last-login write");
                return;
            }
            Err(e) if attempt < WRITE_ATTEMPTS => {
                warn!(user_id = %record.user_id, attempt, error = %e, "last-login write failed, retrying");
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
            Err(e) => {
                error!(user_id = %record.user_id, error = %e, "last-login write dropped");
            }
        }
    }
}
