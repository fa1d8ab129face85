use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(DomainError::InvariantViolation(format!("unknown task status `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub assigned_by: UserId,
    pub assigned_to: UserId,
    pub assigned_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: TaskStatus,
}

/// A task ready for insertion. Dates are already absolute calendar dates, so a
/// relative phrase such as "next Friday" can never reach the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub assigned_by: UserId,
    pub assigned_to: UserId,
    pub assigned_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl NewTask {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::InvariantViolation("task title must not be empty".into()));
        }
        if self.description.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "task description must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{NewTask, TaskStatus};
    use crate::domain::user::UserId;

    #[test]
    fn status_round_trips_through_storage_labels() {
        for status in [TaskStatus::Open, TaskStatus::InProgress, TaskStatus::Completed] {
            assert_eq!(status.as_str().parse::<TaskStatus>().ok(), Some(status));
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn blank_title_is_rejected() {
        let day = NaiveDate::from_ymd_opt(2025, 7, 10).expect("valid date");
        let task = NewTask {
            title: "  ".to_string(),
            description: "Prepare the quarterly report".to_string(),
            assigned_by: UserId(1),
            assigned_to: UserId(2),
            assigned_date: day,
            due_date: day,
        };
        assert!(task.validate().is_err());
    }
}
