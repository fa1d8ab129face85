use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::user::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CreateUser,
    AssignTask,
    RetrieveUpdates,
    AddComment,
    SubmitUpdate,
    Other,
}

/// Accepted spellings per intent. `other` is matched last so that a line such as
/// "assign_task (other options rejected)" resolves to the specific label.
const LABELS: &[(Intent, &[&str])] = &[
    (Intent::CreateUser, &["create_user", "add_user", "new_user"]),
    (Intent::AssignTask, &["assign_task", "assign_tasks"]),
    (Intent::RetrieveUpdates, &["retrieve_updates", "retrieve_update", "get_updates"]),
    (Intent::AddComment, &["add_comment", "add_feedback", "comment"]),
    (Intent::SubmitUpdate, &["submit_update", "submit_updates", "employee_update"]),
    (Intent::Other, &["other", "help"]),
];

impl Intent {
    pub const ALL: [Intent; 6] = [
        Intent::CreateUser,
        Intent::AssignTask,
        Intent::RetrieveUpdates,
        Intent::AddComment,
        Intent::SubmitUpdate,
        Intent::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateUser => "create_user",
            Self::AssignTask => "assign_task",
            Self::RetrieveUpdates => "retrieve_updates",
            Self::AddComment => "add_comment",
            Self::SubmitUpdate => "submit_update",
            Self::Other => "other",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::CreateUser => "create a new user account (name, role, team)",
            Self::AssignTask => "assign a task to an employee (assignee, description, due date)",
            Self::RetrieveUpdates => "look up an employee's daily update for a date",
            Self::AddComment => "add feedback to the daily update you just looked at",
            Self::SubmitUpdate => "submit your daily work update",
            Self::Other => "anything else, including questions about how to use the assistant",
        }
    }

    /// Finds the first recognisable intent label in free-form completion output.
    pub fn parse_label(raw: &str) -> Option<Intent> {
        raw.lines().find_map(|line| {
            let normalized = normalize_label_line(line);
            if normalized == "__" {
                return None;
            }
            LABELS.iter().find_map(|(intent, spellings)| {
                spellings
                    .iter()
                    .any(|spelling| normalized.contains(&format!("_{spelling}_")))
                    .then_some(*intent)
            })
        })
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .into_iter()
            .find(|intent| intent.as_str() == value.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("unknown intent `{value}`"))
    }
}

fn normalize_label_line(line: &str) -> String {
    let mut normalized = String::from("_");
    for character in line.chars() {
        if character.is_ascii_alphanumeric() {
            normalized.push(character.to_ascii_lowercase());
        } else if !normalized.ends_with('_') {
            normalized.push('_');
        }
    }
    if !normalized.ends_with('_') {
        normalized.push('_');
    }
    if normalized == "_" {
        normalized.push('_');
    }
    normalized
}

/// Role → permitted intents. `other` is always permitted so that coercion has a
/// safe target for every role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicy {
    allowed: BTreeMap<Role, BTreeSet<Intent>>,
}

impl RolePolicy {
    pub fn new(table: BTreeMap<Role, BTreeSet<Intent>>) -> Self {
        let mut allowed = table;
        for role in Role::ALL {
            allowed.entry(role).or_default().insert(Intent::Other);
        }
        Self { allowed }
    }

    pub fn allowed(&self, role: Role) -> Vec<Intent> {
        self.allowed.get(&role).map(|set| set.iter().copied().collect()).unwrap_or_default()
    }

    pub fn permits(&self, role: Role, intent: Intent) -> bool {
        intent == Intent::Other
            || self.allowed.get(&role).is_some_and(|set| set.contains(&intent))
    }

    pub fn table(&self) -> &BTreeMap<Role, BTreeSet<Intent>> {
        &self.allowed
    }
}

impl Default for RolePolicy {
    fn default() -> Self {
        let mut table = BTreeMap::new();
        table.insert(Role::Admin, BTreeSet::from([Intent::CreateUser]));
        table.insert(
            Role::Manager,
            BTreeSet::from([Intent::AssignTask, Intent::RetrieveUpdates, Intent::AddComment]),
        );
        table.insert(Role::Employee, BTreeSet::from([Intent::SubmitUpdate]));
        Self::new(table)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::{Intent, RolePolicy};
    use crate::domain::user::Role;

    #[test]
    fn parses_labels_wrapped_in_noise() {
        assert_eq!(Intent::parse_label("assign_task"), Some(Intent::AssignTask));
        assert_eq!(Intent::parse_label("  \"Retrieve_Updates\".\n"), Some(Intent::RetrieveUpdates));
        assert_eq!(
            Intent::parse_label("Classification: submit update"),
            Some(Intent::SubmitUpdate)
        );
        assert_eq!(Intent::parse_label("\n\n`create_user`"), Some(Intent::CreateUser));
        assert_eq!(Intent::parse_label("another thing entirely"), None);
        assert_eq!(Intent::parse_label(""), None);
    }

    #[test]
    fn specific_label_wins_over_other_on_the_same_line() {
        assert_eq!(Intent::parse_label("other than that: add_comment"), Some(Intent::AddComment));
    }

    #[test]
    fn default_policy_matches_role_table() {
        let policy = RolePolicy::default();
        assert_eq!(policy.allowed(Role::Admin), vec![Intent::CreateUser, Intent::Other]);
        assert!(policy.permits(Role::Manager, Intent::AddComment));
        assert!(!policy.permits(Role::Employee, Intent::AssignTask));
        assert!(policy.permits(Role::Employee, Intent::Other));
    }

    #[test]
    fn custom_policy_always_includes_other() {
        let mut table = BTreeMap::new();
        table.insert(Role::Employee, BTreeSet::from([Intent::SubmitUpdate]));
        let policy = RolePolicy::new(table);

        assert_eq!(policy.allowed(Role::Admin), vec![Intent::Other]);
        assert!(policy.permits(Role::Manager, Intent::Other));
        assert!(!policy.permits(Role::Manager, Intent::AssignTask));
    }
}
