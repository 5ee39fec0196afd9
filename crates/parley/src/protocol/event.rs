use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// The closed vocabulary of canonical event kinds carried on the wire.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
pub enum EventKind {
    #[serde(rename = "conversation.started")]
    #[strum(serialize = "conversation.started")]
    ConversationStarted,
    #[serde(rename = "message.delta")]
    #[strum(serialize = "message.delta")]
    MessageDelta,
    #[serde(rename = "message.ended")]
    #[strum(serialize = "message.ended")]
    MessageEnded,
    #[serde(rename = "function.pending")]
    #[strum(serialize = "function.pending")]
    FunctionPending,
    #[serde(rename = "vectorstore.created")]
    #[strum(serialize = "vectorstore.created")]
    VectorStoreCreated,
    #[serde(rename = "vectorstore.file.uploaded")]
    #[strum(serialize = "vectorstore.file.uploaded")]
    VectorStoreFileUploaded,
    #[serde(rename = "vectorstore.files.processed")]
    #[strum(serialize = "vectorstore.files.processed")]
    VectorStoreFilesProcessed,
    #[serde(rename = "error")]
    #[strum(serialize = "error")]
    Error,
}

/// A vendor-neutral event: a kind from the closed vocabulary plus a JSON object payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub kind: EventKind,
    pub payload: Map<String, Value>,
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl CanonicalEvent {
    pub fn new(kind: EventKind, payload: Map<String, Value>) -> Self {
        Self { kind, payload }
    }

    pub fn conversation_started<S: Into<String>>(
        conversation_id: S,
        vendor_conversation_id: Option<&str>,
    ) -> Self {
        Self::new(
            EventKind::ConversationStarted,
            object(json!({
                "conversationId": conversation_id.into(),
                "vendorConversationId": vendor_conversation_id,
            })),
        )
    }

    pub fn message_delta<S: Into<String>, T: Into<String>>(message_id: S, content: T) -> Self {
        Self::new(
            EventKind::MessageDelta,
            object(json!({
                "messageId": message_id.into(),
                "content": content.into(),
            })),
        )
    }

    pub fn message_ended(total_tokens: i64) -> Self {
        Self::new(
            EventKind::MessageEnded,
            object(json!({ "totalTokens": total_tokens })),
        )
    }

    /// Informational only: the accumulated arguments stay inside the normalizer.
    pub fn function_pending<S: Into<String>>(tool_call_id: S, name: Option<&str>) -> Self {
        Self::new(
            EventKind::FunctionPending,
            object(json!({
                "toolCallId": tool_call_id.into(),
                "name": name,
            })),
        )
    }

    pub fn vector_store_created<S: Into<String>>(vector_store_id: S) -> Self {
        Self::new(
            EventKind::VectorStoreCreated,
            object(json!({ "vectorStoreId": vector_store_id.into() })),
        )
    }

    pub fn vector_store_file_uploaded<S: Into<String>, T: Into<String>>(
        file_id: S,
        file_name: T,
    ) -> Self {
        Self::new(
            EventKind::VectorStoreFileUploaded,
            object(json!({
                "fileId": file_id.into(),
                "fileName": file_name.into(),
            })),
        )
    }

    pub fn vector_store_files_processed<S: Into<String>>(
        vector_store_id: S,
        file_ids: &[String],
    ) -> Self {
        let files: Vec<Value> = file_ids
            .iter()
            .map(|id| json!({ "fileId": id }))
            .collect();
        Self::new(
            EventKind::VectorStoreFilesProcessed,
            object(json!({
                "vectorStoreId": vector_store_id.into(),
                "files": files,
            })),
        )
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self::new(
            EventKind::Error,
            object(json!({ "message": message.into() })),
        )
    }

    /// `message.ended` and `error` close a stream; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::MessageEnded | EventKind::Error)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// The `(messageId, content)` pair of a `message.delta` event
    pub fn as_delta(&self) -> Option<(&str, &str)> {
        if self.kind != EventKind::MessageDelta {
            return None;
        }
        Some((self.str_field("messageId")?, self.str_field("content")?))
    }

    pub fn error_message(&self) -> Option<&str> {
        if self.kind != EventKind::Error {
            return None;
        }
        self.str_field("message")
    }

    pub fn total_tokens(&self) -> Option<i64> {
        if self.kind != EventKind::MessageEnded {
            return None;
        }
        self.payload.get("totalTokens").and_then(Value::as_i64)
    }

    pub fn vendor_conversation_id(&self) -> Option<&str> {
        if self.kind != EventKind::ConversationStarted {
            return None;
        }
        self.str_field("vendorConversationId")
    }
}
