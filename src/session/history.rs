//! Chat conversation history
//!
//! A conversation belongs to one user and holds alternating user and
//! assistant messages in order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TITLE_MAX_CHARS: usize = 30;
pub const UNTITLED_CONVERSATION: &str = "New Chat";

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(role: &str) -> Self {
        match role.to_lowercase().as_str() {
            "assistant" | "agent" | "ai" => MessageRole::Assistant,
            _ => MessageRole::User,
        }
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: Uuid::new_v4(),
            user_id: user_id.into(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Rebuild a stored conversation.
    pub fn restore(
        conversation_id: Uuid,
        user_id: impl Into<String>,
        created_at: DateTime<Utc>,
        messages: Vec<ChatMessage>,
    ) -> Self {
        let updated_at = messages.last().map(|m| m.timestamp).unwrap_or(created_at);
        Self {
            conversation_id,
            user_id: user_id.into(),
            created_at,
            updated_at,
            messages,
        }
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// First line of the opening user message, cut to 30 characters.
    pub fn title(&self) -> String {
        match self.messages.first() {
            Some(first) if first.role == MessageRole::User => {
                let line = first.content.lines().next().unwrap_or_default();
                if line.chars().count() > TITLE_MAX_CHARS {
                    let cut: String = line.chars().take(TITLE_MAX_CHARS).collect();
                    format!("{}...", cut)
                } else {
                    line.to_string()
                }
            }
            _ => UNTITLED_CONVERSATION.to_string(),
        }
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            conversation_id: self.conversation_id,
            title: self.title(),
            message_count: self.messages.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Listing entry for a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub title: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_first_user_line() {
        let mut conversation = Conversation::new("uid-1");
        assert_eq!(conversation.title(), "New Chat");

        conversation.add_message(ChatMessage::new(
            MessageRole::User,
            "How much should I save?\nI earn 50k.",
        ));
        assert_eq!(conversation.title(), "How much should I save?");
    }

    #[test]
    fn test_long_titles_are_truncated() {
        let mut conversation = Conversation::new("uid-1");
        conversation.add_message(ChatMessage::new(
            MessageRole::User,
            "Explain the difference between a Roth IRA and a 401k",
        ));
        assert_eq!(conversation.title(), "Explain the difference between...");
    }

    #[test]
    fn test_title_requires_user_opening() {
        let mut conversation = Conversation::new("uid-1");
        conversation.add_message(ChatMessage::new(MessageRole::Assistant, "Welcome back!"));
        assert_eq!(conversation.title(), "New Chat");
    }

    #[test]
    fn test_message_count_and_summary() {
        let mut conversation = Conversation::new("uid-1");
        conversation.add_message(ChatMessage::new(MessageRole::User, "What is RSI?"));
        conversation.add_message(ChatMessage::new(
            MessageRole::Assistant,
            "RSI is a momentum oscillator.",
        ));

        let summary = conversation.summary();
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.title, "What is RSI?");
        assert_eq!(summary.conversation_id, conversation.conversation_id);
    }

    #[test]
    fn test_role_round_trip_through_storage_names() {
        assert_eq!(MessageRole::parse(MessageRole::Assistant.as_str()), MessageRole::Assistant);
        assert_eq!(MessageRole::parse("AGENT"), MessageRole::Assistant);
        assert_eq!(MessageRole::parse("unknown"), MessageRole::User);
    }
}
