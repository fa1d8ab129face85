use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use risepal_core::audit::AuditSink;
use risepal_core::clock::Clock;
use risepal_core::config::DialogueConfig;
use risepal_core::dialogue::slots::default_schemas;
use risepal_core::dialogue::{ConversationState, Intent, SessionUser, SlotSchema};
use risepal_core::domain::chat::SessionId;
use risepal_core::errors::{DomainError, TurnError};
use risepal_db::repositories::{
    ChatMessageRepository, DailyUpdateRepository, SqlChatMessageRepository,
    SqlDailyUpdateRepository, SqlTaskRepository, SqlUserRepository, TaskRepository,
    UserRepository,
};
use risepal_db::DbPool;
use serde::Serialize;

use crate::clarification::{assess, Clarification};
use crate::classifier::IntentClassifier;
use crate::dispatch::{ActionDispatcher, DispatchContext, DispatchDeps, HandlerRegistry};
use crate::extraction::{ExtractionInput, SlotExtractor};
use crate::guardrails::IntentGuardrail;
use crate::llm::LlmClient;
use crate::memory::MemorySummarizer;
use crate::state::InMemoryConversationStore;

pub const TIMEOUT_REPLY: &str = "Sorry, that took too long. Please try again in a moment.";

#[derive(Clone, Debug)]
pub struct TurnRequest {
    pub session_id: SessionId,
    pub user: SessionUser,
    pub message: String,
    pub correlation_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed,
    Clarification,
    Failed,
    Timeout,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Clarification => "clarification",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    pub reply: String,
    pub intent: Intent,
    pub outcome: TurnOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl TurnReply {
    fn new(reply: impl Into<String>, intent: Intent, outcome: TurnOutcome) -> Self {
        Self { reply: reply.into(), intent, outcome, error_kind: None }
    }

    fn failed(intent: Intent, error: &TurnError) -> Self {
        Self {
            reply: error.user_message(),
            intent,
            outcome: TurnOutcome::Failed,
            error_kind: Some(error.kind()),
        }
    }
}

/// Store and completion collaborators for a runtime.
#[derive(Clone)]
pub struct RuntimeDeps {
    pub users: Arc<dyn UserRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub updates: Arc<dyn DailyUpdateRepository>,
    pub chat_log: Arc<dyn ChatMessageRepository>,
    pub llm: Arc<dyn LlmClient>,
    pub clock: Arc<dyn Clock>,
    pub audit: Arc<dyn AuditSink>,
}

impl RuntimeDeps {
    pub fn sqlite(
        pool: DbPool,
        llm: Arc<dyn LlmClient>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            users: Arc::new(SqlUserRepository::new(pool.clone())),
            tasks: Arc::new(SqlTaskRepository::new(pool.clone())),
            updates: Arc::new(SqlDailyUpdateRepository::new(pool.clone())),
            chat_log: Arc::new(SqlChatMessageRepository::new(pool)),
            llm,
            clock,
            audit,
        }
    }
}

/// Runs conversational turns: summarise, classify, extract, clarify or
/// dispatch, then fold the result into the session state.
pub struct AgentRuntime {
    summarizer: MemorySummarizer,
    classifier: IntentClassifier,
    extractor: SlotExtractor,
    schemas: BTreeMap<Intent, SlotSchema>,
    dispatcher: ActionDispatcher,
    sessions: InMemoryConversationStore,
    clock: Arc<dyn Clock>,
    turn_timeout: Duration,
}

impl AgentRuntime {
    pub fn new(deps: RuntimeDeps, config: &DialogueConfig) -> Result<Self, DomainError> {
        let schemas = default_schemas()?;
        if let Some(intent) = Intent::ALL.into_iter().find(|intent| !schemas.contains_key(intent)) {
            return Err(DomainError::InvalidSchema {
                intent,
                reason: "no slot schema declared".to_string(),
            });
        }

        let guardrail = IntentGuardrail::new(config.role_policy.clone());
        let dispatch_deps = DispatchDeps {
            users: deps.users,
            tasks: deps.tasks,
            updates: deps.updates,
            llm: deps.llm.clone(),
            clock: deps.clock.clone(),
            update_policy: config.update_policy,
        };
        let registry = HandlerRegistry::standard(&dispatch_deps, &config.role_policy);

        Ok(Self {
            summarizer: MemorySummarizer::new(
                deps.llm.clone(),
                deps.chat_log,
                deps.clock.clone(),
                config.history_window,
            ),
            classifier: IntentClassifier::new(deps.llm.clone(), guardrail),
            extractor: SlotExtractor::new(deps.llm, config.email_domain.clone()),
            schemas,
            dispatcher: ActionDispatcher::new(registry, config.role_policy.clone(), deps.audit),
            sessions: InMemoryConversationStore::default(),
            clock: deps.clock,
            turn_timeout: Duration::from_secs(config.turn_timeout_secs.max(1)),
        })
    }

    pub async fn handle_turn(&self, request: TurnRequest) -> TurnReply {
        let TurnRequest { session_id, user, message, correlation_id } = request;
        let previous = self.sessions.get(&session_id).await;
        let state = ConversationState::resume(previous, session_id, user);

        let run = self.run_turn(state.clone(), &message, &correlation_id);
        let (next, reply) = match tokio::time::timeout(self.turn_timeout, run).await {
            Ok(finished) => finished,
            Err(_) => {
                tracing::warn!(
                    event_name = "dialogue.turn.timeout",
                    correlation_id = %correlation_id,
                    session_id = %state.session_id,
                    timeout_secs = self.turn_timeout.as_secs(),
                    "turn exceeded its time budget"
                );
                let intent = state.pending_intent().unwrap_or(Intent::Other);
                (state.next_turn(), TurnReply::new(TIMEOUT_REPLY, intent, TurnOutcome::Timeout))
            }
        };

        self.summarizer.record_reply(&next, &reply.reply).await;
        tracing::info!(
            event_name = "dialogue.turn.finished",
            correlation_id = %correlation_id,
            session_id = %next.session_id,
            intent = reply.intent.as_str(),
            outcome = reply.outcome.as_str(),
            error_kind = reply.error_kind.unwrap_or(""),
            turn = next.turn_count,
            "turn finished"
        );
        self.sessions.put(next).await;
        reply
    }

    pub async fn discard_session(&self, session_id: &SessionId) -> bool {
        self.sessions.discard(session_id).await
    }

    pub async fn session(&self, session_id: &SessionId) -> Option<ConversationState> {
        self.sessions.get(session_id).await
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.len().await
    }

    async fn run_turn(
        &self,
        state: ConversationState,
        message: &str,
        correlation_id: &str,
    ) -> (ConversationState, TurnReply) {
        let state = self.summarizer.summarize(state, message).await.next_turn();
        let classification = self.classifier.classify(&state, message).await;
        let intent = classification.intent;
        tracing::debug!(
            event_name = "dialogue.turn.classified",
            correlation_id,
            session_id = %state.session_id,
            intent = intent.as_str(),
            source = classification.source.as_str(),
            "intent classified"
        );

        let Some(schema) = self.schemas.get(&intent) else {
            let error = TurnError::UnauthorizedIntent { role: state.role(), intent };
            return (state, TurnReply::failed(intent, &error));
        };

        let known = state.known_for(intent);
        let input = ExtractionInput {
            message,
            summary: &state.summary,
            known: &known,
            today: self.clock.today(),
        };
        let values = match self.extractor.extract(schema, input).await {
            Ok(values) => values,
            Err(error) => {
                tracing::warn!(
                    event_name = "dialogue.extract.failed",
                    correlation_id,
                    session_id = %state.session_id,
                    error = %error,
                    "slot extraction failed"
                );
                return (state, TurnReply::failed(intent, &error));
            }
        };

        let slots = match assess(schema, values) {
            Clarification::Incomplete { missing, question, known } => {
                tracing::debug!(
                    event_name = "dialogue.clarification.asked",
                    correlation_id,
                    missing = ?missing,
                    "asking for missing fields"
                );
                let reply = TurnReply::new(question, intent, TurnOutcome::Clarification);
                return (state.with_pending(intent, known), reply);
            }
            Clarification::Complete(slots) => slots,
        };

        let context = DispatchContext { state: &state, message, correlation_id };
        match self.dispatcher.dispatch(context, &slots).await {
            Ok(outcome) => {
                let reply = TurnReply::new(outcome.reply, intent, TurnOutcome::Completed);
                (state.without_pending().with_resolved(outcome.refs), reply)
            }
            Err(error) => (state.without_pending(), TurnReply::failed(intent, &error)),
        }
    }
}
