use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::task::TaskId;
use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DailyUpdateId(pub i64);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUpdate {
    pub id: DailyUpdateId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub title: String,
    pub work_done: String,
    pub reference_link: Option<String>,
    pub comment: Option<String>,
    pub task_id: Option<TaskId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewDailyUpdate {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub title: String,
    pub work_done: String,
    pub reference_link: Option<String>,
    pub task_id: Option<TaskId>,
}

/// Whether a user may submit more than one update for the same date.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    #[default]
    AllowMultiple,
    OnePerDay,
}

impl std::str::FromStr for UpdatePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow_multiple" => Ok(Self::AllowMultiple),
            "one_per_day" => Ok(Self::OnePerDay),
            other => Err(format!("unsupported update policy `{other}`")),
        }
    }
}
