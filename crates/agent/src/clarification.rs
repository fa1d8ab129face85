use risepal_core::dialogue::{Intent, SlotSchema, SlotValues};

/// Slot values that satisfied every required field of their schema. Only
/// [`assess`] can build one, so handlers never see an incomplete mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompleteSlots {
    intent: Intent,
    values: SlotValues,
}

impl CompleteSlots {
    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name)
    }

    /// A field the schema requires. Returns an empty string for names outside
    /// the schema.
    pub fn text(&self, name: &str) -> &str {
        self.values.get(name).unwrap_or("")
    }

    pub fn values(&self) -> &SlotValues {
        &self.values
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Clarification {
    Complete(CompleteSlots),
    Incomplete { missing: Vec<&'static str>, question: String, known: SlotValues },
}

pub fn assess(schema: &SlotSchema, values: SlotValues) -> Clarification {
    let missing = schema.missing(&values);
    if missing.is_empty() {
        return Clarification::Complete(CompleteSlots { intent: schema.intent(), values });
    }

    // A derived field is filled as soon as its sources are, so asking for the
    // sources is enough.
    let asked = missing
        .iter()
        .filter(|spec| match spec.derive {
            Some(derivation) => {
                derivation.sources().iter().all(|source| values.get(source).is_some())
            }
            None => true,
        })
        .collect::<Vec<_>>();
    let asked = if asked.is_empty() { missing.iter().collect() } else { asked };

    let labels = asked.iter().map(|spec| spec.label).collect::<Vec<_>>();
    let question = format!(
        "I still need {} to {}. Please provide the missing detail{}.",
        join_labels(&labels),
        action_phrase(schema.intent()),
        if labels.len() == 1 { "" } else { "s" },
    );

    Clarification::Incomplete {
        missing: asked.iter().map(|spec| spec.name).collect(),
        question,
        known: values,
    }
}

fn action_phrase(intent: Intent) -> &'static str {
    match intent {
        Intent::AssignTask => "assign this task",
        Intent::SubmitUpdate => "record your update",
        Intent::RetrieveUpdates => "look up the update",
        Intent::AddComment => "add the comment",
        Intent::CreateUser => "create the user",
        Intent::Other => "help",
    }
}

fn join_labels(labels: &[&str]) -> String {
    match labels {
        [] => String::new(),
        [only] => (*only).to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use risepal_core::dialogue::slots::{default_schemas, field};
    use risepal_core::dialogue::{Intent, SlotValues};

    use super::{assess, Clarification};

    #[test]
    fn complete_values_are_forwarded() {
        let schemas = default_schemas().expect("schemas");
        let values = SlotValues::new().with(field::COMMENT, "Great work");

        match assess(&schemas[&Intent::AddComment], values) {
            Clarification::Complete(slots) => {
                assert_eq!(slots.intent(), Intent::AddComment);
                assert_eq!(slots.text(field::COMMENT), "Great work");
            }
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn question_names_exactly_the_missing_fields() {
        let schemas = default_schemas().expect("schemas");
        let values = SlotValues::new().with(field::ASSIGNEE_NAME, "Sam Wilson");

        match assess(&schemas[&Intent::AssignTask], values) {
            Clarification::Incomplete { missing, question, known } => {
                assert_eq!(missing, vec![field::DESCRIPTION, field::DUE_DATE]);
                assert_eq!(
                    question,
                    "I still need a short task description and a due date (e.g. 2025-07-20) \
                     to assign this task. Please provide the missing details."
                );
                assert_eq!(known.get(field::ASSIGNEE_NAME), Some("Sam Wilson"));
            }
            other => panic!("expected incomplete, got {other:?}"),
        }
    }

    #[test]
    fn submit_update_without_work_done_asks_for_it_alone() {
        let schemas = default_schemas().expect("schemas");
        let values = SlotValues::new().with(field::DATE, "2025-07-10");

        match assess(&schemas[&Intent::SubmitUpdate], values) {
            Clarification::Incomplete { missing, question, .. } => {
                assert_eq!(missing, vec![field::WORK_DONE]);
                assert!(question.ends_with("Please provide the missing detail."));
            }
            other => panic!("expected incomplete, got {other:?}"),
        }
    }
}
