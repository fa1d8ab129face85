use std::sync::Arc;

use async_trait::async_trait;
use risepal_core::dialogue::slots::field;
use risepal_core::dialogue::{EmployeeRef, Intent, ResolvedRefs};
use risepal_core::domain::user::{
    canonical_name, generate_temporary_password, hash_password, NewUser, Role,
};
use risepal_core::errors::TurnError;
use risepal_db::repositories::UserRepository;

use super::{store_error, ActionHandler, DispatchContext, DispatchOutcome};
use crate::clarification::CompleteSlots;

pub struct CreateUserHandler {
    users: Arc<dyn UserRepository>,
}

impl CreateUserHandler {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl ActionHandler for CreateUserHandler {
    fn intent(&self) -> Intent {
        Intent::CreateUser
    }

    async fn handle(
        &self,
        context: DispatchContext<'_>,
        slots: &CompleteSlots,
    ) -> Result<DispatchOutcome, TurnError> {
        let full_name = canonical_name(&format!(
            "{} {}",
            slots.text(field::FIRST_NAME),
            slots.text(field::LAST_NAME)
        ));
        let role = slots
            .text(field::ROLE)
            .parse::<Role>()
            .map_err(|error| TurnError::ExtractionFailure { reason: error.to_string() })?;
        let password = generate_temporary_password();

        let created = self
            .users
            .create(NewUser {
                full_name,
                email: slots.text(field::EMAIL).to_string(),
                role,
                team: slots.text(field::TEAM).to_string(),
                credential_hash: hash_password(&password),
            })
            .await
            .map_err(|error| store_error("user", error))?;

        tracing::info!(
            event_name = "dispatch.create_user.created",
            correlation_id = context.correlation_id,
            user_id = created.id.0,
            role = created.role.as_str(),
            "user created"
        );

        let reply = format!(
            "User {} has been created as {} in {} with email {}. Temporary password: {} \
             (share it securely; it is shown only once).",
            created.full_name,
            created.role.display_name(),
            created.team,
            created.email,
            password
        );
        Ok(DispatchOutcome::reply(reply).with_refs(ResolvedRefs::employee(EmployeeRef {
            id: created.id,
            full_name: created.full_name,
        })))
    }
}

#[cfg(test)]
mod tests {
    use risepal_core::dialogue::slots::{default_schemas, field};
    use risepal_core::dialogue::{Intent, SlotValues};
    use risepal_core::domain::user::{verify_password, Role};
    use risepal_core::errors::TurnError;

    use super::CreateUserHandler;
    use crate::clarification::{assess, Clarification, CompleteSlots};
    use crate::dispatch::{ActionHandler, DispatchContext};
    use crate::llm::ScriptedLlmClient;
    use crate::test_support::Harness;

    fn slots(first: &str, last: &str, email: &str) -> CompleteSlots {
        let values = SlotValues::new()
            .with(field::FIRST_NAME, first)
            .with(field::LAST_NAME, last)
            .with(field::ROLE, "employee")
            .with(field::TEAM, "Software")
            .with(field::EMAIL, email);
        match assess(&default_schemas().expect("schemas")[&Intent::CreateUser], values) {
            Clarification::Complete(slots) => slots,
            other => panic!("expected complete slots, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn creates_an_active_user_with_a_hashed_temporary_password() {
        let harness = Harness::new(ScriptedLlmClient::new()).await;
        let state = harness.state_for(&harness.admin);

        let outcome = CreateUserHandler::new(harness.deps.users.clone())
            .handle(
                DispatchContext { state: &state, message: "add", correlation_id: "req-1" },
                &slots("Jane", "Doe", "jane.doe@example.com"),
            )
            .await
            .expect("created");

        let user = harness
            .deps
            .users
            .find_by_full_name("Jane Doe")
            .await
            .expect("lookup")
            .expect("present");
        assert!(user.is_active());
        assert_eq!(user.role, Role::Employee);
        let password = outcome
            .reply
            .split("Temporary password: ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .expect("password in reply");
        assert!(verify_password(password, &user.credential_hash));
        assert_ne!(user.credential_hash, password);
    }

    #[tokio::test]
    async fn colliding_email_is_a_duplicate_and_changes_nothing() {
        let harness = Harness::new(ScriptedLlmClient::new()).await;
        let state = harness.state_for(&harness.admin);
        let before = harness.deps.users.count().await.expect("count");

        let error = CreateUserHandler::new(harness.deps.users.clone())
            .handle(
                DispatchContext { state: &state, message: "add", correlation_id: "req-2" },
                &slots("Samuel", "Wilson", "sam.wilson@example.com"),
            )
            .await
            .expect_err("duplicate");

        assert!(matches!(error, TurnError::DuplicateEntity { field: "email", .. }));
        assert_eq!(harness.deps.users.count().await.expect("count"), before);
    }
}
