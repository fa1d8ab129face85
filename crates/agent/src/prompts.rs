//! Prompt builders for every completion call the assistant makes.
//!
//! Each prompt opens with a `TASK:` marker line so that completion output can be
//! attributed in logs and scripted in tests.

use chrono::NaiveDate;
use risepal_core::dialogue::{Intent, SlotSchema, SlotValues};
use risepal_core::domain::chat::ChatMessage;
use risepal_core::domain::daily_update::DailyUpdate;

pub const CLASSIFY_MARKER: &str = "TASK: classify_intent";
pub const EXTRACT_MARKER: &str = "TASK: extract_fields";
pub const TITLE_MARKER: &str = "TASK: derive_title";
pub const SUMMARY_MARKER: &str = "TASK: summarize_conversation";
pub const UPDATE_SUMMARY_MARKER: &str = "TASK: summarize_update";
pub const HELP_MARKER: &str = "TASK: help_reply";

pub fn classification(message: &str, summary: &str, allowed: &[Intent]) -> String {
    let labels = allowed
        .iter()
        .map(|intent| format!("- {}: {}", intent.as_str(), intent.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{CLASSIFY_MARKER}\n\
         You route messages for a workplace assistant. Pick exactly one label for the latest \
         message.\n\n\
         Allowed labels:\n{labels}\n\n\
         Conversation summary:\n{summary}\n\n\
         Latest message:\n{message}\n\n\
         Answer with the label only.",
        summary = or_none(summary),
    )
}

pub fn extraction(
    schema: &SlotSchema,
    message: &str,
    summary: &str,
    known: &SlotValues,
    today: NaiveDate,
) -> String {
    let fields = schema
        .fields()
        .iter()
        .map(|spec| {
            if spec.hint.is_empty() {
                format!("- {}", spec.name)
            } else {
                format!("- {}: {}", spec.name, spec.hint)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    let known = if known.is_empty() {
        "none".to_string()
    } else {
        known.iter().map(|(name, value)| format!("{name}: {value}")).collect::<Vec<_>>().join("\n")
    };

    format!(
        "{EXTRACT_MARKER} intent={intent}\n\
         Extract the fields below from the latest message. Today is {today}.\n\
         Reply with one `name: value` line per field. Write `unknown` when the user did not \
         say it. Never invent names or dates.\n\n\
         Fields:\n{fields}\n\n\
         Already known:\n{known}\n\n\
         Conversation summary:\n{summary}\n\n\
         Latest message:\n{message}",
        intent = schema.intent().as_str(),
        today = today.format("%Y-%m-%d (%A)"),
        summary = or_none(summary),
    )
}

pub fn title(source: &str, max_words: usize) -> String {
    format!(
        "{TITLE_MARKER}\n\
         Write a title of at most {max_words} words for the text below. Answer with the title \
         only, no quotes.\n\n{source}"
    )
}

/// Structured summary in the `Intent / Provided / Missing` shape.
pub fn memory_summary(history: &[ChatMessage], message: &str) -> String {
    let transcript = history
        .iter()
        .map(|entry| format!("{}: {}", entry.sender.label(), entry.message))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{SUMMARY_MARKER}\n\
         Summarise what the user is trying to get done so far. Use exactly this format:\n\
         Intent: <what the user wants>\n\
         Provided: <details already given, comma separated>\n\
         Missing: <details still needed, or none>\n\n\
         Recent conversation:\n{transcript}\n\
         User: {message}",
        transcript = or_none(&transcript),
    )
}

pub fn update_summary(employee: &str, update: &DailyUpdate) -> String {
    format!(
        "{UPDATE_SUMMARY_MARKER}\n\
         Summarise this daily update from {employee} in one or two sentences for their \
         manager.\n\n\
         Title: {title}\n\
         Work done: {work_done}",
        title = update.title,
        work_done = update.work_done,
    )
}

pub fn help(message: &str, name: &str, allowed: &[Intent]) -> String {
    let abilities = allowed
        .iter()
        .filter(|intent| **intent != Intent::Other)
        .map(|intent| format!("- {}", intent.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{HELP_MARKER}\n\
         You are RisePal, a workplace assistant talking to {name}. Reply briefly and \
         politely. Only offer what this user can do:\n{abilities}\n\n\
         Message:\n{message}",
        abilities = or_none(&abilities),
    )
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "none"
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use risepal_core::dialogue::slots::{default_schemas, field};
    use risepal_core::dialogue::{Intent, SlotValues};

    use super::{classification, extraction, EXTRACT_MARKER};

    #[test]
    fn classification_lists_only_allowed_labels() {
        let prompt = classification("hi", "", &[Intent::SubmitUpdate, Intent::Other]);
        assert!(prompt.contains("- submit_update"));
        assert!(!prompt.contains("assign_task"));
        assert!(prompt.contains("Conversation summary:\nnone"));
    }

    #[test]
    fn extraction_prompt_embeds_known_fields_and_today() {
        let schemas = default_schemas().expect("schemas");
        let known = SlotValues::new().with(field::ASSIGNEE_NAME, "Sam Wilson");
        let today = NaiveDate::from_ymd_opt(2025, 7, 10).expect("date");

        let prompt =
            extraction(&schemas[&Intent::AssignTask], "due Friday", "", &known, today);

        assert!(prompt.starts_with(EXTRACT_MARKER));
        assert!(prompt.contains("intent=assign_task"));
        assert!(prompt.contains("assignee_name: Sam Wilson"));
        assert!(prompt.contains("2025-07-10 (Thursday)"));
        assert!(prompt.contains("- due_date:"));
    }
}
