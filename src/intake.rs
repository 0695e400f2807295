//! Event intake: the HTTP surface that turns platform events into
//! deployment runs or install notifications.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bootstrap::{BootstrapExecutor, OpenSshChannel};
use crate::command_runner::{QUERY_TIMEOUT, TokioCommandRunner};
use crate::credentials::HttpObjectStore;
use crate::event::{EventKind, RepositoryEvent};
use crate::pipeline::{self, Deps};
use crate::provision::ProvisionCoordinator;
use crate::resolver::HttpConfigApi;
use crate::settings::Settings;

/// Outbound install notification payload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notification {
    pub username: String,
    pub repo: String,
    pub visibility: String,
}

/// One recorded notification, timestamped at intake.
#[derive(Debug, Clone)]
pub struct NotificationRecord {
    pub notification: Notification,
    pub at: DateTime<Utc>,
}

/// Explicitly owned, bounded record of notifications this process has
/// handled. Oldest entries are evicted at capacity; lifetime and locking
/// are the owner's, not ambient module state.
#[derive(Debug)]
pub struct NotificationLog {
    entries: VecDeque<NotificationRecord>,
    capacity: usize,
}

impl NotificationLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, notification: Notification) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(NotificationRecord {
            notification,
            at: Utc::now(),
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent entries, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<NotificationRecord> {
        self.entries.iter().cloned().collect()
    }
}

/// Fold an installation event into notifications, recording each in the
/// log. Repository visibility maps from the platform's `private` flag.
pub fn record_installation(
    log: &mut NotificationLog,
    event: &RepositoryEvent,
) -> Vec<Notification> {
    let mut out = Vec::with_capacity(event.repositories.len());
    for repo in &event.repositories {
        let notification = Notification {
            username: event.actor.clone(),
            repo: repo.name.clone(),
            visibility: if repo.private { "private" } else { "public" }.to_string(),
        };
        log.push(notification.clone());
        out.push(notification);
    }
    out
}

/// Shared intake state.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub client: reqwest::Client,
    pub notifications: Arc<Mutex<NotificationLog>>,
}

impl AppState {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            client: reqwest::Client::new(),
            notifications: Arc::new(Mutex::new(NotificationLog::new(128))),
        }
    }

    /// Production pipeline collaborators for one run.
    fn deps(
        &self,
    ) -> Deps<
        HttpConfigApi,
        HttpObjectStore,
        TokioCommandRunner,
        OpenSshChannel<TokioCommandRunner>,
    > {
        let s = &self.settings;
        Deps {
            config_api: HttpConfigApi::new(self.client.clone(), s.config_api_base.clone()),
            credential_store: HttpObjectStore::new(
                self.client.clone(),
                s.object_store_base.clone(),
                s.credential_bucket.clone(),
            ),
            provisioner: ProvisionCoordinator::new(s.verify_dir.clone(), s.deploy_dir.clone()),
            bootstrapper: BootstrapExecutor::new(
                OpenSshChannel::new(TokioCommandRunner::new(QUERY_TIMEOUT), s.ssh_user.clone()),
                Duration::from_secs(s.bootstrap_delay_secs),
                s.bootstrap_max_attempts,
            ),
        }
    }
}

/// Build the intake router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(handle_event))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Dispatch one inbound event.
///
/// Deployment failures are logged, never surfaced to the event platform —
/// the response is 204 either way. Installation events take the lightweight
/// notification path.
async fn handle_event(
    State(state): State<AppState>,
    Json(event): Json<RepositoryEvent>,
) -> StatusCode {
    match event.kind {
        EventKind::IssuesOpened => {
            let deps = state.deps();
            if let Err(err) = pipeline::deploy(&deps, &event.actor, &event.repo_name).await {
                tracing::error!(
                    actor = %event.actor,
                    repo = %event.repo_name,
                    error = %err,
                    "deploy failed"
                );
            }
        }
        EventKind::RepositoriesAdded | EventKind::RepositoriesRemoved => {
            let notifications = {
                let mut log = match state.notifications.lock() {
                    Ok(log) => log,
                    Err(poisoned) => poisoned.into_inner(),
                };
                record_installation(&mut log, &event)
            };
            tracing::info!(
                actor = %event.actor,
                kind = ?event.kind,
                count = notifications.len(),
                "installation event recorded"
            );
            for notification in notifications {
                forward(&state, notification);
            }
        }
    }
    StatusCode::NO_CONTENT
}

/// Fire-and-forget forwarding to the configured intake endpoint. Failures
/// are logged, never propagated or retried.
fn forward(state: &AppState, notification: Notification) {
    let Some(endpoint) = state.settings.intake_endpoint.clone() else {
        return;
    };
    let client = state.client.clone();
    tokio::spawn(async move {
        let result = client.post(&endpoint).json(&notification).send().await;
        match result.and_then(reqwest::Response::error_for_status) {
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(repo = %notification.repo, error = %err, "notification forward failed");
            }
        }
    });
}
