use std::sync::Arc;

use async_trait::async_trait;
use risepal_core::dialogue::slots::field;
use risepal_core::dialogue::{Intent, ResolvedRefs};
use risepal_core::errors::TurnError;
use risepal_db::repositories::DailyUpdateRepository;

use super::{store_error, ActionHandler, DispatchContext, DispatchOutcome};
use crate::clarification::CompleteSlots;

pub const NO_UPDATE_GUIDANCE: &str = "I don't know which update to comment on yet. Ask me for an \
     employee's update first (for example \"show me Sam Wilson's update for today\"), then tell \
     me your comment.";

pub struct AddCommentHandler {
    updates: Arc<dyn DailyUpdateRepository>,
}

impl AddCommentHandler {
    pub fn new(updates: Arc<dyn DailyUpdateRepository>) -> Self {
        Self { updates }
    }
}

#[async_trait]
impl ActionHandler for AddCommentHandler {
    fn intent(&self) -> Intent {
        Intent::AddComment
    }

    async fn handle(
        &self,
        context: DispatchContext<'_>,
        slots: &CompleteSlots,
    ) -> Result<DispatchOutcome, TurnError> {
        let Some(target) = context.state.last_update.clone() else {
            return Ok(DispatchOutcome::reply(NO_UPDATE_GUIDANCE));
        };

        let updated = self
            .updates
            .append_comment(target.id, slots.text(field::COMMENT))
            .await
            .map_err(|error| store_error("daily update", error))?;
        if updated.is_none() {
            return Err(TurnError::EntityNotFound {
                entity: "daily update",
                key: target.title.clone(),
            });
        }

        let reply = format!(
            "Your comment has been added to {}'s update '{}' for {}.",
            target.owner.full_name,
            target.title,
            target.date.format("%Y-%m-%d")
        );
        Ok(DispatchOutcome::reply(reply).with_refs(ResolvedRefs::update(target)))
    }
}

#[cfg(test)]
mod tests {
    use risepal_core::dialogue::slots::{default_schemas, field};
    use risepal_core::dialogue::{EmployeeRef, Intent, ResolvedRefs, SlotValues, UpdateRef};
    use risepal_core::domain::daily_update::{DailyUpdateId, NewDailyUpdate, UpdatePolicy};
    use risepal_core::errors::TurnError;

    use super::{AddCommentHandler, NO_UPDATE_GUIDANCE};
    use crate::clarification::{assess, Clarification, CompleteSlots};
    use crate::dispatch::{ActionHandler, DispatchContext};
    use crate::llm::ScriptedLlmClient;
    use crate::test_support::{today, Harness};

    fn slots() -> CompleteSlots {
        let values = SlotValues::new().with(field::COMMENT, "Please add tests");
        match assess(&default_schemas().expect("schemas")[&Intent::AddComment], values) {
            Clarification::Complete(slots) => slots,
            other => panic!("expected complete slots, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn without_a_resolved_update_only_guidance_is_returned() {
        let harness = Harness::new(ScriptedLlmClient::new()).await;
        let state = harness.state_for(&harness.manager);

        let outcome = AddCommentHandler::new(harness.deps.updates.clone())
            .handle(
                DispatchContext { state: &state, message: "nice", correlation_id: "req-1" },
                &slots(),
            )
            .await
            .expect("guidance");

        assert_eq!(outcome.reply, NO_UPDATE_GUIDANCE);
        assert_eq!(harness.deps.updates.count().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn comment_is_appended_to_the_resolved_update() {
        let harness = Harness::new(ScriptedLlmClient::new()).await;
        let update = harness
            .deps
            .updates
            .create(
                NewDailyUpdate {
                    user_id: harness.employee.id,
                    date: today(),
                    title: "Login fix".to_string(),
                    work_done: "Fixed the login bug".to_string(),
                    reference_link: None,
                    task_id: None,
                },
                UpdatePolicy::AllowMultiple,
            )
            .await
            .expect("update");
        let target = UpdateRef {
            id: update.id,
            date: update.date,
            title: update.title.clone(),
            owner: EmployeeRef {
                id: harness.employee.id,
                full_name: harness.employee.full_name.clone(),
            },
        };
        let state = harness.state_for(&harness.manager).with_resolved(ResolvedRefs::update(target));

        let outcome = AddCommentHandler::new(harness.deps.updates.clone())
            .handle(
                DispatchContext { state: &state, message: "add", correlation_id: "req-2" },
                &slots(),
            )
            .await
            .expect("commented");

        assert_eq!(
            outcome.reply,
            "Your comment has been added to Sam Wilson's update 'Login fix' for 2025-07-10."
        );
        let stored =
            harness.deps.updates.find_by_id(update.id).await.expect("lookup").expect("present");
        assert_eq!(stored.comment.as_deref(), Some("Please add tests"));
    }

    #[tokio::test]
    async fn vanished_update_is_not_found() {
        let harness = Harness::new(ScriptedLlmClient::new()).await;
        let target = UpdateRef {
            id: DailyUpdateId(404),
            date: today(),
            title: "Gone".to_string(),
            owner: EmployeeRef { id: harness.employee.id, full_name: "Sam Wilson".to_string() },
        };
        let state = harness.state_for(&harness.manager).with_resolved(ResolvedRefs::update(target));

        let error = AddCommentHandler::new(harness.deps.updates.clone())
            .handle(
                DispatchContext { state: &state, message: "add", correlation_id: "req-3" },
                &slots(),
            )
            .await
            .expect_err("missing row");

        assert!(matches!(error, TurnError::EntityNotFound { entity: "daily update", .. }));
    }
}
