use std::sync::Arc;

use async_trait::async_trait;
use risepal_core::dialogue::dates::parse_absolute;
use risepal_core::dialogue::slots::field;
use risepal_core::dialogue::Intent;
use risepal_core::domain::daily_update::{NewDailyUpdate, UpdatePolicy};
use risepal_core::errors::TurnError;
use risepal_db::repositories::{DailyUpdateRepository, TaskRepository};

use super::{store_error, ActionHandler, DispatchContext, DispatchOutcome};
use crate::clarification::CompleteSlots;

pub struct SubmitUpdateHandler {
    tasks: Arc<dyn TaskRepository>,
    updates: Arc<dyn DailyUpdateRepository>,
    policy: UpdatePolicy,
}

impl SubmitUpdateHandler {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        updates: Arc<dyn DailyUpdateRepository>,
        policy: UpdatePolicy,
    ) -> Self {
        Self { tasks, updates, policy }
    }
}

#[async_trait]
impl ActionHandler for SubmitUpdateHandler {
    fn intent(&self) -> Intent {
        Intent::SubmitUpdate
    }

    async fn handle(
        &self,
        context: DispatchContext<'_>,
        slots: &CompleteSlots,
    ) -> Result<DispatchOutcome, TurnError> {
        let user = &context.state.user;
        let date = parse_absolute(slots.text(field::DATE))
            .map_err(|error| TurnError::ExtractionFailure { reason: error.to_string() })?;

        let task = match slots.get(field::TASK_TITLE) {
            Some(title) => Some(
                self.tasks
                    .find_for_assignee_by_title(user.id, title)
                    .await
                    .map_err(|error| store_error("task", error))?
                    .ok_or_else(|| TurnError::EntityNotFound {
                        entity: "task",
                        key: title.to_string(),
                    })?,
            ),
            None => None,
        };

        let update = NewDailyUpdate {
            user_id: user.id,
            date,
            title: slots.text(field::TITLE).to_string(),
            work_done: slots.text(field::WORK_DONE).to_string(),
            reference_link: slots.get(field::REFERENCE_LINK).map(str::to_string),
            task_id: task.as_ref().map(|task| task.id),
        };
        let created = self
            .updates
            .create(update, self.policy)
            .await
            .map_err(|error| store_error("daily update", error))?;

        tracing::info!(
            event_name = "dispatch.submit_update.created",
            correlation_id = context.correlation_id,
            update_id = created.id.0,
            "daily update recorded"
        );

        let mut reply = format!(
            "Thanks {}! Your update '{}' for {} has been recorded.",
            user.full_name,
            created.title,
            created.date.format("%Y-%m-%d")
        );
        if let Some(task) = task {
            reply.push_str(&format!(" It is linked to your task '{}'.", task.title));
        }
        Ok(DispatchOutcome::reply(reply))
    }
}
