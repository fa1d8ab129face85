use std::sync::Arc;

use async_trait::async_trait;
use risepal_core::dialogue::dates::parse_absolute;
use risepal_core::dialogue::slots::field;
use risepal_core::dialogue::{EmployeeRef, Intent, ResolvedRefs, UpdateRef};
use risepal_core::domain::daily_update::DailyUpdate;
use risepal_core::errors::TurnError;
use risepal_db::repositories::{DailyUpdateRepository, UserRepository};

use super::{store_error, ActionHandler, DispatchContext, DispatchOutcome};
use crate::clarification::CompleteSlots;
use crate::llm::LlmClient;
use crate::prompts;

/// Looks up the latest update of an employee for a date. Stored facts are
/// always reported from the row; the prose summary is optional decoration.
pub struct RetrieveUpdatesHandler {
    users: Arc<dyn UserRepository>,
    updates: Arc<dyn DailyUpdateRepository>,
    llm: Arc<dyn LlmClient>,
}

impl RetrieveUpdatesHandler {
    pub fn new(
        users: Arc<dyn UserRepository>,
        updates: Arc<dyn DailyUpdateRepository>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self { users, updates, llm }
    }

    async fn summary(&self, employee: &str, update: &DailyUpdate) -> Option<String> {
        match self.llm.complete(&prompts::update_summary(employee, update)).await {
            Ok(summary) if !summary.trim().is_empty() => Some(summary.trim().to_string()),
            Ok(_) => None,
            Err(error) => {
                tracing::warn!(
                    event_name = "dispatch.retrieve_updates.summary_failed",
                    update_id = update.id.0,
                    error = %error,
                    "update summary unavailable, reporting stored facts only"
                );
                None
            }
        }
    }
}

#[async_trait]
impl ActionHandler for RetrieveUpdatesHandler {
    fn intent(&self) -> Intent {
        Intent::RetrieveUpdates
    }

    async fn handle(
        &self,
        context: DispatchContext<'_>,
        slots: &CompleteSlots,
    ) -> Result<DispatchOutcome, TurnError> {
        let name = slots.text(field::EMPLOYEE_NAME);
        let employee = self
            .users
            .find_by_full_name(name)
            .await
            .map_err(|error| store_error("user", error))?
            .ok_or_else(|| TurnError::EntityNotFound { entity: "employee", key: name.to_string() })?;
        let date = parse_absolute(slots.text(field::DATE))
            .map_err(|error| TurnError::ExtractionFailure { reason: error.to_string() })?;

        let owner = EmployeeRef { id: employee.id, full_name: employee.full_name.clone() };
        let found = self
            .updates
            .latest_for(employee.id, date)
            .await
            .map_err(|error| store_error("daily update", error))?;

        let Some(update) = found else {
            let reply = format!(
                "{} has not submitted an update for {}.",
                employee.full_name,
                date.format("%Y-%m-%d")
            );
            return Ok(DispatchOutcome::reply(reply).with_refs(ResolvedRefs::employee(owner)));
        };

        tracing::debug!(
            event_name = "dispatch.retrieve_updates.found",
            correlation_id = context.correlation_id,
            update_id = update.id.0,
            "update found"
        );

        let mut lines = vec![
            format!("Update from {} for {}:", employee.full_name, update.date.format("%Y-%m-%d")),
            format!("Title: {}", update.title),
            format!("Work done: {}", update.work_done),
        ];
        if let Some(link) = &update.reference_link {
            lines.push(format!("Reference: {link}"));
        }
        if let Some(comment) = &update.comment {
            lines.push(format!("Comments: {comment}"));
        }
        if let Some(summary) = self.summary(&employee.full_name, &update).await {
            lines.push(String::new());
            lines.push(format!("Summary: {summary}"));
        }

        let refs = ResolvedRefs::update(UpdateRef {
            id: update.id,
            date: update.date,
            title: update.title.clone(),
            owner,
        });
        Ok(DispatchOutcome::reply(lines.join("\n")).with_refs(refs))
    }
}
