use std::sync::Arc;

use risepal_core::dialogue::{ConversationState, Intent};

use crate::guardrails::{GuardrailDecision, IntentGuardrail};
use crate::llm::LlmClient;
use crate::prompts;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassificationSource {
    Completion,
    /// The completion call failed.
    Fallback,
    /// The completion answered with something that is not a label.
    Unrecognized,
    /// The label exists but the role may not use it.
    Coerced,
    /// The message was read as an answer to an open clarification question.
    PendingContinuation,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Fallback => "fallback",
            Self::Unrecognized => "unrecognized",
            Self::Coerced => "coerced",
            Self::PendingContinuation => "pending_continuation",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub source: ClassificationSource,
}

/// Picks one intent for a message from the caller's allowed set. The result is
/// always a member of that set, whatever the completion service answers.
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    guardrail: IntentGuardrail,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, guardrail: IntentGuardrail) -> Self {
        Self { llm, guardrail }
    }

    pub async fn classify(&self, state: &ConversationState, message: &str) -> Classification {
        let role = state.role();
        let allowed = self.guardrail.allowed(role);
        let prompt = prompts::classification(message, &state.summary, &allowed);

        let classified = match self.llm.complete(&prompt).await {
            Err(error) => {
                tracing::warn!(
                    event_name = "dialogue.classify.fallback",
                    session_id = %state.session_id,
                    error = %error,
                    "intent classification failed, using other"
                );
                Classification { intent: Intent::Other, source: ClassificationSource::Fallback }
            }
            Ok(raw) => match Intent::parse_label(&raw) {
                None => {
                    tracing::debug!(
                        event_name = "dialogue.classify.unrecognized",
                        session_id = %state.session_id,
                        raw = %raw.trim(),
                        "completion answered without a known label"
                    );
                    Classification {
                        intent: Intent::Other,
                        source: ClassificationSource::Unrecognized,
                    }
                }
                Some(intent) => {
                    let decision = self.guardrail.evaluate(role, intent);
                    let source = match &decision {
                        GuardrailDecision::Allow => ClassificationSource::Completion,
                        GuardrailDecision::Degrade { reason_code, error, .. } => {
                            tracing::info!(
                                event_name = "dialogue.classify.coerced",
                                session_id = %state.session_id,
                                reason_code = *reason_code,
                                error = %error,
                                "classified intent not permitted for role"
                            );
                            ClassificationSource::Coerced
                        }
                    };
                    Classification { intent: decision.effective(intent), source }
                }
            },
        };

        if classified.intent != Intent::Other {
            return classified;
        }
        match state.pending_intent() {
            Some(pending) if self.guardrail.policy().permits(role, pending) => Classification {
                intent: pending,
                source: ClassificationSource::PendingContinuation,
            },
            _ => classified,
        }
    }
}
