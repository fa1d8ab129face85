use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::dialogue::intent::Intent;
use crate::errors::DomainError;

/// Field names shared by prompts, schemas and dispatch handlers.
pub mod field {
    pub const ASSIGNEE_NAME: &str = "assignee_name";
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const DUE_DATE: &str = "due_date";
    pub const WORK_DONE: &str = "work_done";
    pub const REFERENCE_LINK: &str = "reference_link";
    pub const TASK_TITLE: &str = "task_title";
    pub const DATE: &str = "date";
    pub const EMPLOYEE_NAME: &str = "employee_name";
    pub const COMMENT: &str = "comment";
    pub const FIRST_NAME: &str = "first_name";
    pub const LAST_NAME: &str = "last_name";
    pub const EMAIL: &str = "email";
    pub const ROLE: &str = "role";
    pub const TEAM: &str = "team";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotKind {
    Text,
    PersonName,
    Date,
    Role,
    Email,
    Url,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotDefault {
    Today,
}

/// How a field may be filled in when the user did not state it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Derivation {
    /// Secondary completion call that condenses `from` into a short title.
    ShortTitle { from: &'static str, max_words: usize },
    /// Deterministic `first.last@domain` address.
    EmailFromNames { first: &'static str, last: &'static str },
}

impl Derivation {
    pub fn sources(&self) -> Vec<&'static str> {
        match self {
            Self::ShortTitle { from, .. } => vec![from],
            Self::EmailFromNames { first, last } => vec![first, last],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlotSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub hint: &'static str,
    pub kind: SlotKind,
    pub required: bool,
    /// Gating fields identify people or fix dates; they are only ever taken from
    /// what the user said, never derived.
    pub gating: bool,
    pub derive: Option<Derivation>,
    pub default: Option<SlotDefault>,
}

impl SlotSpec {
    pub fn required(name: &'static str, label: &'static str, kind: SlotKind) -> Self {
        Self {
            name,
            label,
            hint: "",
            kind,
            required: true,
            gating: false,
            derive: None,
            default: None,
        }
    }

    pub fn optional(name: &'static str, label: &'static str, kind: SlotKind) -> Self {
        Self { required: false, ..Self::required(name, label, kind) }
    }

    pub fn gating(mut self) -> Self {
        self.gating = true;
        self
    }

    pub fn derived(mut self, derivation: Derivation) -> Self {
        self.derive = Some(derivation);
        self
    }

    pub fn defaulting(mut self, default: SlotDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_hint(mut self, hint: &'static str) -> Self {
        self.hint = hint;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlotSchema {
    intent: Intent,
    fields: Vec<SlotSpec>,
}

impl SlotSchema {
    pub fn new(intent: Intent, fields: Vec<SlotSpec>) -> Result<Self, DomainError> {
        let invalid = |reason: String| DomainError::InvalidSchema { intent, reason };

        let mut names = BTreeSet::new();
        for spec in &fields {
            if !names.insert(spec.name) {
                return Err(invalid(format!("duplicate field `{}`", spec.name)));
            }
        }

        for spec in &fields {
            let Some(derivation) = spec.derive else {
                continue;
            };
            if spec.gating {
                return Err(invalid(format!("gating field `{}` cannot be derived", spec.name)));
            }
            for source in derivation.sources() {
                if !names.contains(source) {
                    return Err(invalid(format!(
                        "field `{}` derives from unknown field `{source}`",
                        spec.name
                    )));
                }
            }
        }

        Ok(Self { intent, fields })
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn fields(&self) -> &[SlotSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&SlotSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Required fields that have no value, in schema order.
    pub fn missing<'a>(&'a self, values: &SlotValues) -> Vec<&'a SlotSpec> {
        self.fields.iter().filter(|spec| spec.required && values.get(spec.name).is_none()).collect()
    }
}

/// Field → value mapping. Blank values are never stored, so `get` returning
/// `Some` always means the field is filled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotValues(BTreeMap<String, String>);

impl SlotValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.0.remove(name);
        } else {
            self.0.insert(name.to_string(), trimmed.to_string());
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Values from `newer` win; values only present in `self` are kept.
    pub fn overlaid_with(&self, newer: &SlotValues) -> SlotValues {
        let mut merged = self.clone();
        for (name, value) in newer.iter() {
            merged.set(name, value);
        }
        merged
    }
}

/// The slot schema for every intent, in the form the extractor and the
/// clarification controller consume.
pub fn default_schemas() -> Result<BTreeMap<Intent, SlotSchema>, DomainError> {
    use field::*;
    use SlotKind::*;

    let schemas = [
        SlotSchema::new(
            Intent::AssignTask,
            vec![
                SlotSpec::required(ASSIGNEE_NAME, "the assignee's full name", PersonName)
                    .gating()
                    .with_hint("full name of the person the task is for"),
                SlotSpec::required(DESCRIPTION, "a short task description", Text)
                    .with_hint("what the task involves"),
                SlotSpec::required(DUE_DATE, "a due date (e.g. 2025-07-20)", Date)
                    .gating()
                    .with_hint("YYYY-MM-DD, or the date phrase exactly as the user said it"),
                SlotSpec::required(TITLE, "a task title", Text)
                    .derived(Derivation::ShortTitle { from: DESCRIPTION, max_words: 4 })
                    .with_hint("short task title, only if the user stated one"),
            ],
        )?,
        SlotSchema::new(
            Intent::SubmitUpdate,
            vec![
                SlotSpec::required(WORK_DONE, "a description of the work you did", Text)
                    .with_hint("what the employee worked on"),
                SlotSpec::required(TITLE, "a title for the update", Text)
                    .derived(Derivation::ShortTitle { from: WORK_DONE, max_words: 10 })
                    .with_hint("short title, only if the user stated one"),
                SlotSpec::required(DATE, "the date of the update", Date)
                    .defaulting(SlotDefault::Today)
                    .with_hint("date the work was done, if mentioned"),
                SlotSpec::optional(REFERENCE_LINK, "a reference link", Url)
                    .with_hint("URL mentioned by the user"),
                SlotSpec::optional(TASK_TITLE, "the related task", Text)
                    .with_hint("title of an assigned task this update is for, if mentioned"),
            ],
        )?,
        SlotSchema::new(
            Intent::RetrieveUpdates,
            vec![
                SlotSpec::required(EMPLOYEE_NAME, "the employee's full name", PersonName)
                    .gating()
                    .with_hint("full name of the employee whose update is requested"),
                SlotSpec::required(DATE, "the date of the update", Date)
                    .gating()
                    .defaulting(SlotDefault::Today)
                    .with_hint("requested date, if mentioned"),
            ],
        )?,
        SlotSchema::new(
            Intent::AddComment,
            vec![SlotSpec::required(COMMENT, "the comment you want to add", Text)
                .with_hint("only the feedback text, without names or dates")],
        )?,
        SlotSchema::new(
            Intent::CreateUser,
            vec![
                SlotSpec::required(FIRST_NAME, "the user's first name", PersonName).gating(),
                SlotSpec::required(LAST_NAME, "the user's last name", PersonName).gating(),
                SlotSpec::required(ROLE, "a role (admin, manager or employee)", Role),
                SlotSpec::required(TEAM, "a team (e.g. Software, HR, Operations)", PersonName)
                    .with_hint("team name such as Software, HR or Operations"),
                SlotSpec::required(EMAIL, "an email address", Email)
                    .derived(Derivation::EmailFromNames { first: FIRST_NAME, last: LAST_NAME })
                    .with_hint("email address, only if the user stated one"),
            ],
        )?,
        SlotSchema::new(Intent::Other, Vec::new())?,
    ];

    Ok(schemas.into_iter().map(|schema| (schema.intent(), schema)).collect())
}

#[cfg(test)]
mod tests {
    use super::{default_schemas, field, Derivation, SlotKind, SlotSchema, SlotSpec, SlotValues};
    use crate::dialogue::intent::Intent;
    use crate::errors::DomainError;

    #[test]
    fn every_intent_has_a_schema() {
        let schemas = default_schemas().expect("default schemas are valid");
        for intent in Intent::ALL {
            assert!(schemas.contains_key(&intent), "missing schema for {intent}");
        }
    }

    #[test]
    fn gating_fields_cannot_be_derived() {
        let result = SlotSchema::new(
            Intent::AssignTask,
            vec![
                SlotSpec::required(field::DESCRIPTION, "description", SlotKind::Text),
                SlotSpec::required(field::ASSIGNEE_NAME, "assignee", SlotKind::PersonName)
                    .gating()
                    .derived(Derivation::ShortTitle { from: field::DESCRIPTION, max_words: 2 }),
            ],
        );

        assert!(matches!(result, Err(DomainError::InvalidSchema { .. })));
    }

    #[test]
    fn derivation_sources_must_exist() {
        let result = SlotSchema::new(
            Intent::SubmitUpdate,
            vec![SlotSpec::required(field::TITLE, "title", SlotKind::Text)
                .derived(Derivation::ShortTitle { from: field::WORK_DONE, max_words: 5 })],
        );

        assert!(result.is_err());
    }

    #[test]
    fn missing_lists_blank_required_fields_in_order() {
        let schemas = default_schemas().expect("schemas");
        let schema = &schemas[&Intent::AssignTask];
        let values = SlotValues::new().with(field::DESCRIPTION, "Draft the report");

        let missing = schema.missing(&values).iter().map(|spec| spec.name).collect::<Vec<_>>();
        assert_eq!(missing, vec![field::ASSIGNEE_NAME, field::DUE_DATE, field::TITLE]);
    }

    #[test]
    fn blank_values_are_not_stored_and_newer_values_win() {
        let known = SlotValues::new().with(field::ASSIGNEE_NAME, "Sam Wilson").with(field::TITLE, "Report");
        let newer = SlotValues::new().with(field::TITLE, "Final report").with(field::DUE_DATE, "   ");

        let merged = known.overlaid_with(&newer);
        assert_eq!(merged.get(field::ASSIGNEE_NAME), Some("Sam Wilson"));
        assert_eq!(merged.get(field::TITLE), Some("Final report"));
        assert_eq!(merged.get(field::DUE_DATE), None);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn schemas_serialize_with_field_metadata() {
        let schemas = default_schemas().expect("default schemas are valid");

        let value = serde_json::to_value(&schemas[&Intent::AssignTask]).expect("serialize");

        let fields = value["fields"].as_array().expect("fields array");
        let title = fields.iter().find(|field| field["name"] == "title").expect("title field");
        assert_eq!(title["derive"]["ShortTitle"]["from"], "description");
        assert!(fields.iter().any(|field| field["name"] == "due_date" && field["gating"] == true));
    }
}
