use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of the participant that authored a [`ConversationTurn`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A system-level instruction or prompt.
    System,
    /// A human end-user, or synthetic feedback spoken on their behalf.
    User,
    /// The model.
    Assistant,
}

/// Binary content attached to a turn, e.g. a photo for image analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type such as `image/jpeg`.
    pub mime_type: String,
    /// Raw bytes of the attachment.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment from raw bytes.
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Guesses an image MIME type from a file extension, defaulting to JPEG.
    pub fn image_mime_for(path: &std::path::Path) -> &'static str {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("png") => "image/png",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("bmp") => "image/bmp",
            _ => "image/jpeg",
        }
    }
}

/// A single provider-agnostic turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who spoke.
    pub role: Role,
    /// The text of the turn.
    pub content: String,
    /// Optional attached content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl ConversationTurn {
    /// Creates a new turn with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            attachment: None,
        }
    }

    /// Creates a new turn with [`Role::System`].
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a new turn with [`Role::User`].
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a new turn with [`Role::Assistant`].
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attaches binary content to this turn.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// The ordered turns sent to a backend for one exchange.
///
/// Built fresh per request and only ever appended to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn.
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// All turns in order.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The system prompt, if the first turn carries one.
    pub fn system_prompt(&self) -> Option<&str> {
        self.turns
            .first()
            .filter(|t| t.role == Role::System)
            .map(|t| t.content.as_str())
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the transcript has no turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recently appended turn.
    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }
}

impl FromIterator<ConversationTurn> for Transcript {
    fn from_iter<I: IntoIterator<Item = ConversationTurn>>(iter: I) -> Self {
        Self {
            turns: iter.into_iter().collect(),
        }
    }
}

/// A chat message as stored by the host, used to build conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// Host-assigned message id.
    pub message_id: i64,
    /// Chat the message belongs to.
    pub chat_id: i64,
    /// Display name of the sender.
    pub sender_name: String,
    /// Message text.
    pub content: String,
    /// When the message was sent.
    pub sent_at: DateTime<Utc>,
    /// Id of the message this one replies to.
    #[serde(default)]
    pub reply_to: Option<i64>,
    /// Whether the bot itself authored the message.
    #[serde(default)]
    pub from_bot: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_system_prompt() {
        let mut t = Transcript::new();
        assert!(t.system_prompt().is_none());
        t.push(ConversationTurn::system("be nice"));
        t.push(ConversationTurn::user("hi"));
        assert_eq!(t.system_prompt(), Some("be nice"));
        assert_eq!(t.len(), 2);
        assert_eq!(t.last().unwrap().role, Role::User);
    }

    #[test]
    fn test_turn_serialization_skips_missing_attachment() {
        let turn = ConversationTurn::assistant("ok");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }

    #[test]
    fn test_image_mime_guess() {
        use std::path::Path;
        assert_eq!(Attachment::image_mime_for(Path::new("a.PNG")), "image/png");
        assert_eq!(Attachment::image_mime_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(Attachment::image_mime_for(Path::new("noext")), "image/jpeg");
    }
}
