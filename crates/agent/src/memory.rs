use std::sync::Arc;

use risepal_core::clock::Clock;
use risepal_core::dialogue::ConversationState;
use risepal_core::domain::chat::{NewChatMessage, Sender};
use risepal_db::repositories::ChatMessageRepository;

use crate::llm::LlmClient;
use crate::prompts;

pub const SUMMARY_UNAVAILABLE: &str = "summary unavailable";

/// Keeps the rolling summary and the persisted chat log. Failures here degrade
/// context but never abort a turn.
pub struct MemorySummarizer {
    llm: Arc<dyn LlmClient>,
    chat_log: Arc<dyn ChatMessageRepository>,
    clock: Arc<dyn Clock>,
    history_window: u32,
}

impl MemorySummarizer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        chat_log: Arc<dyn ChatMessageRepository>,
        clock: Arc<dyn Clock>,
        history_window: u32,
    ) -> Self {
        Self { llm, chat_log, clock, history_window }
    }

    /// Reads recent history, stores the incoming message and returns the state
    /// with a fresh summary.
    pub async fn summarize(&self, state: ConversationState, message: &str) -> ConversationState {
        let history = match self.chat_log.recent(&state.session_id, self.history_window).await {
            Ok(history) => history,
            Err(error) => {
                tracing::error!(
                    event_name = "memory.history.read_failed",
                    session_id = %state.session_id,
                    error = %error,
                    "chat history unavailable, summarising without it"
                );
                Vec::new()
            }
        };

        self.record(&state, Sender::User, message).await;

        let summary = match self.llm.complete(&prompts::memory_summary(&history, message)).await {
            Ok(summary) if !summary.trim().is_empty() => summary.trim().to_string(),
            Ok(_) => SUMMARY_UNAVAILABLE.to_string(),
            Err(error) => {
                tracing::warn!(
                    event_name = "memory.summary.failed",
                    session_id = %state.session_id,
                    error = %error,
                    "memory summary unavailable"
                );
                SUMMARY_UNAVAILABLE.to_string()
            }
        };

        state.with_summary(summary)
    }

    pub async fn record_reply(&self, state: &ConversationState, reply: &str) {
        self.record(state, Sender::Bot, reply).await;
    }

    async fn record(&self, state: &ConversationState, sender: Sender, message: &str) {
        let entry = NewChatMessage {
            session_id: state.session_id.clone(),
            user_id: Some(state.user.id),
            sender,
            message: message.to_string(),
            timestamp: self.clock.now(),
        };
        if let Err(error) = self.chat_log.append(entry).await {
            tracing::error!(
                event_name = "memory.chat_log.write_failed",
                session_id = %state.session_id,
                sender = sender.as_str(),
                error = %error,
                "failed to persist chat message"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use risepal_core::clock::FixedClock;
    use risepal_core::dialogue::{ConversationState, SessionUser};
    use risepal_core::domain::chat::{Sender, SessionId};
    use risepal_core::domain::user::{Role, UserId};
    use risepal_db::repositories::InMemoryChatMessageRepository;

    use super::{MemorySummarizer, SUMMARY_UNAVAILABLE};
    use crate::llm::ScriptedLlmClient;
    use crate::prompts::SUMMARY_MARKER;

    fn state() -> ConversationState {
        ConversationState::new(
            SessionId::from("s-1"),
            SessionUser {
                id: UserId(3),
                full_name: "Sam Wilson".to_string(),
                role: Role::Employee,
                team: "Software".to_string(),
            },
        )
    }

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2025, 7, 10).expect("date")))
    }

    #[tokio::test]
    async fn summary_is_written_and_message_persisted() {
        let chat_log = Arc::new(InMemoryChatMessageRepository::default());
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .on(SUMMARY_MARKER, "Intent: submit update\nProvided: none\nMissing: work done"),
        );
        let summarizer = MemorySummarizer::new(llm.clone(), chat_log.clone(), clock(), 5);

        let first = summarizer.summarize(state(), "I want to submit my update").await;
        summarizer.record_reply(&first, "What did you work on?").await;
        let second = summarizer.summarize(first, "Fixed the login bug").await;

        assert!(second.summary.starts_with("Intent: submit update"));
        let log = chat_log.all(&SessionId::from("s-1")).await;
        assert_eq!(log.len(), 3);
        assert_eq!(log[1].sender, Sender::Bot);
        let last_prompt = llm.prompts().pop().expect("prompt");
        assert!(last_prompt.contains("Bot: What did you work on?"));
        assert!(last_prompt.contains("User: Fixed the login bug"));
    }

    #[tokio::test]
    async fn completion_failure_yields_the_marker() {
        let chat_log = Arc::new(InMemoryChatMessageRepository::default());
        let llm = Arc::new(ScriptedLlmClient::new().failing_on(SUMMARY_MARKER, "offline"));
        let summarizer = MemorySummarizer::new(llm, chat_log.clone(), clock(), 5);

        let next = summarizer.summarize(state(), "hello").await;

        assert_eq!(next.summary, SUMMARY_UNAVAILABLE);
        assert_eq!(chat_log.all(&SessionId::from("s-1")).await.len(), 1);
    }
}
