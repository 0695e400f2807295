//! Inbound platform events: the trigger for every deployment run.

use serde::Deserialize;

/// Event kinds the intake reacts to. Anything else is rejected at
/// deserialization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum EventKind {
    #[serde(rename = "issues.opened")]
    IssuesOpened,
    #[serde(rename = "installation_repositories.added")]
    RepositoriesAdded,
    #[serde(rename = "installation_repositories.removed")]
    RepositoriesRemoved,
}

/// A repository listed on an installation event.
#[derive(Debug, Clone, Deserialize)]
pub struct ListedRepository {
    pub name: String,
    #[serde(default)]
    pub private: bool,
}

/// One inbound event. Ephemeral — built per delivery, consumed once.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryEvent {
    /// The user whose action triggered the event.
    pub actor: String,
    /// Repository the event was raised on.
    #[serde(rename = "repoName")]
    pub repo_name: String,
    pub kind: EventKind,
    /// Repositories added or removed, for installation events.
    #[serde(default)]
    pub repositories: Vec<ListedRepository>,
}
