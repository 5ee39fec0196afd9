use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use uuid::Uuid;

use super::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageStatus {
    /// Appended at the start of a turn, not yet answered
    Pending,
    Complete,
    /// The turn that produced or answered this message failed or was cancelled
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A message in a conversation
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
    pub created: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: String, status: MessageStatus) -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            status,
            created: Utc::now(),
        }
    }

    /// Create a pending user message with the current timestamp
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content.into(), MessageStatus::Pending)
    }

    /// Create a complete agent message with the current timestamp
    pub fn agent<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Agent, content.into(), MessageStatus::Complete)
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_complete(&self) -> bool {
        self.status == MessageStatus::Complete
    }
}
