//! External collaborators consumed by the record owner
//!
//! None of these are part of the approval engine itself; they are injected so
//! deployments can point them at real services or in-process fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::events::OutcomeNotification;
use crate::types::PersonId;
use crate::CoreError;

/// Entry of the people directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    /// Identifier
    pub id: PersonId,

    /// Display name
    pub name: String,

    /// Direct manager, `None` at the top of the chart
    #[serde(default)]
    pub manager_id: Option<PersonId>,
}

/// Identity validation
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Whether the person exists.
    ///
    /// Callers treat an `Err` the same as `Ok(false)`.
    async fn exists(&self, person_id: PersonId) -> Result<bool, CoreError>;
}

/// Receives outcome events for requesters, fire-and-forget
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one notification
    async fn notify(&self, notification: &OutcomeNotification) -> Result<(), CoreError>;
}

/// Read-only org chart queries
#[async_trait]
pub trait OrgChart: Send + Sync {
    /// Direct reports of a person
    async fn children(&self, person_id: PersonId) -> Result<Vec<Person>, CoreError>;

    /// Direct manager of a person
    async fn parent(&self, person_id: PersonId) -> Result<Option<Person>, CoreError>;
}
