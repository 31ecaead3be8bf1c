use chrono::{Duration as ChronoDuration, Utc};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use switchboard_core::{
    Attachment, ConversationTurn, HistoryMessage, Role, SwitchboardResult, Transcript,
};
use switchboard_store::HistorySource;
use tracing::debug;

static EXCESS_NEWLINES: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\n{3,}").ok());

/// Builds the history part of a transcript from stored chat messages.
///
/// Takes the messages of the last `window_minutes`, or the latest
/// `min_messages` when the window holds fewer than that.
#[derive(Clone)]
pub struct HistoryWindow {
    history: Arc<dyn HistorySource>,
    window_minutes: i64,
    min_messages: usize,
}

impl HistoryWindow {
    /// Window over `history`.
    pub fn new(history: Arc<dyn HistorySource>, window_minutes: i64, min_messages: usize) -> Self {
        Self {
            history,
            window_minutes,
            min_messages,
        }
    }

    /// Append the windowed history of `message.chat_id`, then `message` itself
    /// as the final user turn, to `transcript`.
    ///
    /// `message` is skipped if the store already returned it as history.
    pub async fn extend(
        &self,
        transcript: &mut Transcript,
        message: &HistoryMessage,
        attachment: Option<Attachment>,
    ) -> SwitchboardResult<()> {
        let since = Utc::now() - ChronoDuration::minutes(self.window_minutes);
        let mut messages = self.history.messages_since(message.chat_id, since).await?;
        if messages.len() < self.min_messages {
            messages = self
                .history
                .latest_messages(message.chat_id, self.min_messages)
                .await?;
        }
        messages.retain(|m| m.message_id != message.message_id);
        debug!(chat_id = message.chat_id, messages = messages.len(), "History window loaded");

        for turn in merge_turns(&messages) {
            transcript.push(turn);
        }

        let mut turn = ConversationTurn::user(collapse_newlines(&render_line(message)));
        if let Some(attachment) = attachment {
            turn = turn.with_attachment(attachment);
        }
        transcript.push(turn);
        Ok(())
    }
}

/// One history line: `[time] Sender (reply to #id): content`.
pub fn render_line(message: &HistoryMessage) -> String {
    let reply = message
        .reply_to
        .map(|id| format!(" (reply to #{id})"))
        .unwrap_or_default();
    format!(
        "[{}] {}{}: {}",
        message.sent_at.format("%Y-%m-%d %H:%M:%S"),
        message.sender_name,
        reply,
        message.content
    )
}

fn collapse_newlines(text: &str) -> String {
    match EXCESS_NEWLINES.as_ref() {
        Some(re) => re.replace_all(text, "\n\n").into_owned(),
        None => text.to_string(),
    }
}

/// Consecutive messages from the same sender become one turn.
fn merge_turns(messages: &[HistoryMessage]) -> Vec<ConversationTurn> {
    let mut turns: Vec<ConversationTurn> = Vec::new();
    let mut last_sender: Option<(&str, bool)> = None;

    for message in messages {
        let line = render_line(message);
        let sender = (message.sender_name.as_str(), message.from_bot);
        match turns.last_mut() {
            Some(turn) if last_sender == Some(sender) => {
                turn.content.push('\n');
                turn.content.push_str(&line);
            }
            _ => {
                let role = if message.from_bot {
                    Role::Assistant
                } else {
                    Role::User
                };
                turns.push(ConversationTurn::new(role, line));
            }
        }
        last_sender = Some(sender);
    }

    for turn in &mut turns {
        turn.content = collapse_newlines(&turn.content);
    }
    turns
}
