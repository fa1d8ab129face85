use std::sync::Arc;

use async_trait::async_trait;
use risepal_core::dialogue::{Intent, RolePolicy};
use risepal_core::domain::user::Role;
use risepal_core::errors::TurnError;

use super::{ActionHandler, DispatchContext, DispatchOutcome};
use crate::clarification::CompleteSlots;
use crate::llm::LlmClient;
use crate::prompts;

/// Help and small talk, limited to what the caller's role can do.
pub struct OtherHandler {
    llm: Arc<dyn LlmClient>,
    policy: RolePolicy,
}

impl OtherHandler {
    pub fn new(llm: Arc<dyn LlmClient>, policy: RolePolicy) -> Self {
        Self { llm, policy }
    }

    fn static_help(&self, role: Role) -> String {
        let abilities = self
            .policy
            .allowed(role)
            .into_iter()
            .filter(|intent| *intent != Intent::Other)
            .map(|intent| format!("- {}", intent.description()))
            .collect::<Vec<_>>();

        if abilities.is_empty() {
            return "I'm RisePal. There are no actions available for your role yet.".to_string();
        }
        format!("I'm RisePal. Here is what I can do for you:\n{}", abilities.join("\n"))
    }
}

#[async_trait]
impl ActionHandler for OtherHandler {
    fn intent(&self) -> Intent {
        Intent::Other
    }

    async fn handle(
        &self,
        context: DispatchContext<'_>,
        _slots: &CompleteSlots,
    ) -> Result<DispatchOutcome, TurnError> {
        let role = context.state.role();
        let prompt =
            prompts::help(context.message, &context.state.user.full_name, &self.policy.allowed(role));

        let reply = match self.llm.complete(&prompt).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => self.static_help(role),
            Err(error) => {
                tracing::warn!(
                    event_name = "dispatch.other.help_fallback",
                    correlation_id = context.correlation_id,
                    error = %error,
                    "help reply unavailable, using static help"
                );
                self.static_help(role)
            }
        };
        Ok(DispatchOutcome::reply(reply))
    }
}
