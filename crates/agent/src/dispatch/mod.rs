//! Action dispatch: one handler per intent, each performing a single store
//! operation once the clarification step has produced complete slots.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use risepal_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use risepal_core::clock::Clock;
use risepal_core::dialogue::{ConversationState, Intent, ResolvedRefs, RolePolicy};
use risepal_core::domain::daily_update::UpdatePolicy;
use risepal_core::errors::TurnError;
use risepal_db::repositories::{
    DailyUpdateRepository, RepositoryError, TaskRepository, UserRepository,
};

use crate::clarification::CompleteSlots;
use crate::llm::LlmClient;

pub mod add_comment;
pub mod assign_task;
pub mod create_user;
pub mod other;
pub mod retrieve_updates;
pub mod submit_update;

pub use add_comment::AddCommentHandler;
pub use assign_task::AssignTaskHandler;
pub use create_user::CreateUserHandler;
pub use other::OtherHandler;
pub use retrieve_updates::RetrieveUpdatesHandler;
pub use submit_update::SubmitUpdateHandler;

/// What a handler knows about the turn besides its slots.
#[derive(Clone, Copy, Debug)]
pub struct DispatchContext<'a> {
    pub state: &'a ConversationState,
    pub message: &'a str,
    pub correlation_id: &'a str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub reply: String,
    pub refs: ResolvedRefs,
}

impl DispatchOutcome {
    pub fn reply(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), refs: ResolvedRefs::none() }
    }

    pub fn with_refs(self, refs: ResolvedRefs) -> Self {
        Self { refs, ..self }
    }
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn intent(&self) -> Intent;
    async fn handle(
        &self,
        context: DispatchContext<'_>,
        slots: &CompleteSlots,
    ) -> Result<DispatchOutcome, TurnError>;
}

/// Shared collaborators the standard handlers are built from.
#[derive(Clone)]
pub struct DispatchDeps {
    pub users: Arc<dyn UserRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub updates: Arc<dyn DailyUpdateRepository>,
    pub llm: Arc<dyn LlmClient>,
    pub clock: Arc<dyn Clock>,
    pub update_policy: UpdatePolicy,
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Intent, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn standard(deps: &DispatchDeps, policy: &RolePolicy) -> Self {
        let mut registry = Self::default();
        registry.register(AssignTaskHandler::new(
            deps.users.clone(),
            deps.tasks.clone(),
            deps.clock.clone(),
        ));
        registry.register(SubmitUpdateHandler::new(
            deps.tasks.clone(),
            deps.updates.clone(),
            deps.update_policy,
        ));
        registry.register(RetrieveUpdatesHandler::new(
            deps.users.clone(),
            deps.updates.clone(),
            deps.llm.clone(),
        ));
        registry.register(AddCommentHandler::new(deps.updates.clone()));
        registry.register(CreateUserHandler::new(deps.users.clone()));
        registry.register(OtherHandler::new(deps.llm.clone(), policy.clone()));
        registry
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: ActionHandler + 'static,
    {
        self.handlers.insert(handler.intent(), Arc::new(handler));
    }

    pub fn get(&self, intent: Intent) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&intent).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Routes complete slots to the handler for their intent and audits the result.
pub struct ActionDispatcher {
    registry: HandlerRegistry,
    policy: RolePolicy,
    audit: Arc<dyn AuditSink>,
}

impl ActionDispatcher {
    pub fn new(registry: HandlerRegistry, policy: RolePolicy, audit: Arc<dyn AuditSink>) -> Self {
        Self { registry, policy, audit }
    }

    pub async fn dispatch(
        &self,
        context: DispatchContext<'_>,
        slots: &CompleteSlots,
    ) -> Result<DispatchOutcome, TurnError> {
        let intent = slots.intent();
        let role = context.state.role();

        let result = match self.registry.get(intent) {
            Some(handler) if self.policy.permits(role, intent) => {
                handler.handle(context, slots).await
            }
            _ => Err(TurnError::UnauthorizedIntent { role, intent }),
        };

        let outcome = match &result {
            Ok(_) => AuditOutcome::Success,
            Err(TurnError::PersistenceFailure(_)) | Err(TurnError::ExtractionFailure { .. }) => {
                AuditOutcome::Failed
            }
            Err(_) => AuditOutcome::Rejected,
        };
        let audit_context = AuditContext::for_user(
            context.state.session_id.clone(),
            context.correlation_id,
            context.state.user.id,
        );
        let mut event = AuditEvent::new(
            &audit_context,
            format!("dispatch.{}", intent.as_str()),
            AuditCategory::Dispatch,
            outcome,
        )
        .with_metadata("role", role.as_str());
        if let Err(error) = &result {
            event = event.with_metadata("error_kind", error.kind());
        }
        self.audit.emit(event);

        result
    }
}

/// Maps a repository failure onto the turn taxonomy. Store faults are logged
/// here with their cause.
pub(crate) fn store_error(entity: &'static str, error: RepositoryError) -> TurnError {
    match error {
        RepositoryError::UniqueViolation { field, value } => {
            TurnError::DuplicateEntity { entity, field: field_label(&field), value }
        }
        other => {
            tracing::error!(
                event_name = "dispatch.store.failed",
                entity,
                error = %other,
                "store operation failed"
            );
            TurnError::PersistenceFailure(other.to_string())
        }
    }
}

fn field_label(field: &str) -> &'static str {
    match field {
        "email" => "email",
        "full_name" => "full name",
        "date" => "date",
        _ => "value",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use risepal_core::audit::{AuditOutcome, InMemoryAuditSink};
    use risepal_core::dialogue::slots::{default_schemas, field};
    use risepal_core::dialogue::{Intent, RolePolicy, SlotValues};
    use risepal_core::errors::TurnError;

    use super::{
        store_error, ActionDispatcher, ActionHandler, DispatchContext, DispatchOutcome,
        HandlerRegistry,
    };
    use crate::clarification::{assess, Clarification, CompleteSlots};
    use crate::test_support::session_state;
    use risepal_core::domain::user::Role;
    use risepal_db::repositories::RepositoryError;

    struct Echo;

    #[async_trait]
    impl ActionHandler for Echo {
        fn intent(&self) -> Intent {
            Intent::AddComment
        }

        async fn handle(
            &self,
            _context: DispatchContext<'_>,
            slots: &CompleteSlots,
        ) -> Result<DispatchOutcome, TurnError> {
            Ok(DispatchOutcome::reply(slots.text(field::COMMENT)))
        }
    }

    fn comment_slots() -> CompleteSlots {
        let schemas = default_schemas().expect("schemas");
        match assess(&schemas[&Intent::AddComment], SlotValues::new().with(field::COMMENT, "hi")) {
            Clarification::Complete(slots) => slots,
            other => panic!("expected complete slots, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_runs_the_registered_handler_and_audits() {
        let mut registry = HandlerRegistry::default();
        registry.register(Echo);
        let audit = Arc::new(InMemoryAuditSink::default());
        let dispatcher = ActionDispatcher::new(registry, RolePolicy::default(), audit.clone());
        let state = session_state(Role::Manager);

        let outcome = dispatcher
            .dispatch(
                DispatchContext { state: &state, message: "hi", correlation_id: "req-1" },
                &comment_slots(),
            )
            .await
            .expect("dispatched");

        assert_eq!(outcome.reply, "hi");
        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "dispatch.add_comment");
        assert_eq!(events[0].outcome, AuditOutcome::Success);
        assert_eq!(events[0].correlation_id, "req-1");
    }

    #[tokio::test]
    async fn role_without_the_intent_is_refused() {
        let mut registry = HandlerRegistry::default();
        registry.register(Echo);
        let audit = Arc::new(InMemoryAuditSink::default());
        let dispatcher = ActionDispatcher::new(registry, RolePolicy::default(), audit.clone());
        let state = session_state(Role::Employee);

        let result = dispatcher
            .dispatch(
                DispatchContext { state: &state, message: "hi", correlation_id: "req-2" },
                &comment_slots(),
            )
            .await;

        assert!(matches!(result, Err(TurnError::UnauthorizedIntent { .. })));
        assert_eq!(audit.events()[0].outcome, AuditOutcome::Rejected);
    }

    #[test]
    fn unique_violations_become_duplicates() {
        let error = store_error(
            "user",
            RepositoryError::UniqueViolation {
                field: "full_name".to_string(),
                value: "Sam Wilson".to_string(),
            },
        );
        assert_eq!(
            error.user_message(),
            "A user with full name 'Sam Wilson' already exists. Nothing was changed."
        );
        let error = store_error("task", RepositoryError::Decode("bad row".to_string()));
        assert!(matches!(error, TurnError::PersistenceFailure(_)));
    }
}
