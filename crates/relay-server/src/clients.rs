//! HTTP clients for the identity and notification services
//!
//! Both services are outside Relay; these adapt their REST APIs to the
//! collaborator traits the record owner depends on.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use relay_core::{
    CoreError, FinalStatus, IdentityDirectory, NotificationDispatcher, OutcomeNotification, PersonId,
    RequestId,
};

use crate::error::ServerResult;

fn build_client(timeout: Duration) -> ServerResult<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

fn map_http_error(error: reqwest::Error, timeout: Duration) -> CoreError {
    if error.is_timeout() {
        CoreError::Timeout(timeout.as_millis() as u64)
    } else if error.is_connect() {
        CoreError::Transport(format!("Connection error: {}", error))
    } else {
        CoreError::Transport(format!("HTTP error: {}", error))
    }
}

/// Identity checks against `GET {base}/employees/{id}/exists`
#[derive(Debug, Clone)]
pub struct HttpIdentityDirectory {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl HttpIdentityDirectory {
    /// Create a client for the identity service at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ServerResult<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: build_client(timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl IdentityDirectory for HttpIdentityDirectory {
    async fn exists(&self, person_id: PersonId) -> Result<bool, CoreError> {
        let url = format!("{}/employees/{}/exists", self.base_url, person_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_http_error(e, self.timeout))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => response
                .json::<bool>()
                .await
                .map_err(|e| CoreError::SerializationError(format!("Failed to parse response: {}", e))),
            status => Err(CoreError::Transport(format!("Identity service returned {}", status))),
        }
    }
}

/// Body accepted by the notification service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    /// Workflow record
    pub request_id: RequestId,
    /// Requester being notified
    pub employee_id: PersonId,
    /// Result of the decision that triggered the notification
    pub result: &'static str,
    /// Approver who rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<PersonId>,
    /// Approver of an intermediate step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<PersonId>,
    /// Step just approved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,
    /// Steps in the workflow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<usize>,
    /// Record status after the decision
    pub final_result: &'static str,
}

impl From<&OutcomeNotification> for NotificationRequest {
    fn from(notification: &OutcomeNotification) -> Self {
        let mut request = Self {
            request_id: notification.request_id,
            employee_id: notification.requester_id,
            result: "approved",
            rejected_by: None,
            approved_by: None,
            current_step: None,
            total_steps: None,
            final_result: notification.outcome.as_str(),
        };

        match notification.outcome {
            FinalStatus::Rejected => {
                request.result = "rejected";
                request.rejected_by = notification.actor_id;
            }
            FinalStatus::InProgress => {
                request.approved_by = notification.actor_id;
                request.current_step = notification.step_info.map(|p| p.current_step);
                request.total_steps = notification.step_info.map(|p| p.total_steps);
            }
            FinalStatus::Approved => {}
        }
        request
    }
}

/// Sends outcomes to `POST {base}/notifications/send`
#[derive(Debug, Clone)]
pub struct HttpNotificationDispatcher {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl HttpNotificationDispatcher {
    /// Create a client for the notification service at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ServerResult<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: build_client(timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl NotificationDispatcher for HttpNotificationDispatcher {
    async fn notify(&self, notification: &OutcomeNotification) -> Result<(), CoreError> {
        let url = format!("{}/notifications/send", self.base_url);
        let body = NotificationRequest::from(notification);
        debug!(request_id = %body.request_id, result = body.result, "Sending notification");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_http_error(e, self.timeout))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CoreError::Transport(format!(
                "Notification service returned {}",
                response.status()
            )))
        }
    }
}

/// Writes outcomes to the log instead of delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingNotificationDispatcher {
    async fn notify(&self, notification: &OutcomeNotification) -> Result<(), CoreError> {
        info!(
            event_type = notification.event_type(),
            request_id = %notification.request_id,
            requester_id = %notification.requester_id,
            actor_id = ?notification.actor_id,
            "Outcome notification"
        );
        Ok(())
    }
}
