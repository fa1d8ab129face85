use std::sync::Arc;

use async_trait::async_trait;
use risepal_core::clock::Clock;
use risepal_core::dialogue::dates::parse_absolute;
use risepal_core::dialogue::slots::field;
use risepal_core::dialogue::{EmployeeRef, Intent, ResolvedRefs};
use risepal_core::domain::task::NewTask;
use risepal_core::errors::TurnError;
use risepal_db::repositories::{TaskRepository, UserRepository};

use super::{store_error, ActionHandler, DispatchContext, DispatchOutcome};
use crate::clarification::CompleteSlots;

pub struct AssignTaskHandler {
    users: Arc<dyn UserRepository>,
    tasks: Arc<dyn TaskRepository>,
    clock: Arc<dyn Clock>,
}

impl AssignTaskHandler {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tasks: Arc<dyn TaskRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { users, tasks, clock }
    }
}

#[async_trait]
impl ActionHandler for AssignTaskHandler {
    fn intent(&self) -> Intent {
        Intent::AssignTask
    }

    async fn handle(
        &self,
        context: DispatchContext<'_>,
        slots: &CompleteSlots,
    ) -> Result<DispatchOutcome, TurnError> {
        let assignee_name = slots.text(field::ASSIGNEE_NAME);
        let assignee = self
            .users
            .find_by_full_name(assignee_name)
            .await
            .map_err(|error| store_error("user", error))?
            .ok_or_else(|| TurnError::EntityNotFound {
                entity: "user",
                key: assignee_name.to_string(),
            })?;

        let due_date = parse_absolute(slots.text(field::DUE_DATE))
            .map_err(|error| TurnError::ExtractionFailure { reason: error.to_string() })?;

        let task = NewTask {
            title: slots.text(field::TITLE).to_string(),
            description: slots.text(field::DESCRIPTION).to_string(),
            assigned_by: context.state.user.id,
            assigned_to: assignee.id,
            assigned_date: self.clock.today(),
            due_date,
        };
        task.validate().map_err(|error| TurnError::ExtractionFailure { reason: error.to_string() })?;

        let created = self.tasks.create(task).await.map_err(|error| store_error("task", error))?;
        tracing::info!(
            event_name = "dispatch.assign_task.created",
            correlation_id = context.correlation_id,
            task_id = created.id.0,
            assignee_id = assignee.id.0,
            "task assigned"
        );

        let reply = format!(
            "Task '{}' has been assigned to {}, due {}.",
            created.title,
            assignee.full_name,
            created.due_date.format("%Y-%m-%d")
        );
        Ok(DispatchOutcome::reply(reply).with_refs(ResolvedRefs::employee(EmployeeRef {
            id: assignee.id,
            full_name: assignee.full_name,
        })))
    }
}
