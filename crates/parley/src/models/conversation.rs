use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::{Message, MessageStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    /// The vendor's handle for this conversation, known once the first stream starts
    pub vendor_conversation_id: Option<String>,
    /// The vector context holding files uploaded into this conversation
    pub vector_store_id: Option<String>,
    pub messages: Vec<Message>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            vendor_conversation_id: None,
            vector_store_id: None,
            messages: Vec::new(),
            created: now,
            updated: now,
        }
    }

    /// Messages are append-only; nothing removes or reorders them.
    pub fn append(&mut self, message: Message) {
        self.updated = Utc::now();
        self.messages.push(message);
    }

    /// Returns false when no message has that id.
    pub fn set_status(&mut self, message_id: &str, status: MessageStatus) -> bool {
        match self.messages.iter_mut().find(|m| m.id == message_id) {
            Some(message) => {
                message.status = status;
                self.updated = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;
    use serde_json::json;

    #[test]
    fn test_append_and_status() {
        let mut conversation = Conversation::new();
        let user = Message::user("hello");
        let user_id = user.id.clone();
        conversation.append(user);
        conversation.append(Message::agent("Hello there!"));

        assert!(conversation.set_status(&user_id, MessageStatus::Complete));
        assert!(!conversation.set_status("missing", MessageStatus::Complete));
        assert!(conversation.messages[0].is_complete());
        assert_eq!(conversation.last_message().unwrap().role, Role::Agent);
    }

    #[test]
    fn test_serialization_uses_camel_case() {
        let mut conversation = Conversation::new();
        conversation.vendor_conversation_id = Some("conv_vendor".into());
        conversation.append(Message::user("hi"));

        let value = serde_json::to_value(&conversation).unwrap();
        assert_eq!(value["vendorConversationId"], json!("conv_vendor"));
        assert_eq!(value["vectorStoreId"], json!(null));
        assert_eq!(value["messages"][0]["role"], json!("user"));
        assert_eq!(value["messages"][0]["status"], json!("pending"));
    }
}
