use std::sync::Arc;

use chrono::NaiveDate;
use risepal_core::dialogue::dates::resolve_date;
use risepal_core::dialogue::slots::{Derivation, SlotDefault, SlotKind, SlotSpec};
use risepal_core::dialogue::{SlotSchema, SlotValues};
use risepal_core::domain::user::{canonical_name, Role};
use risepal_core::errors::TurnError;

use crate::llm::LlmClient;
use crate::prompts;

const PLACEHOLDERS: &[&str] = &["unknown", "none", "n/a", "na", "''", "\"\"", "-", "null", "nil"];

/// What the extractor sees of the current turn.
#[derive(Clone, Copy, Debug)]
pub struct ExtractionInput<'a> {
    pub message: &'a str,
    pub summary: &'a str,
    pub known: &'a SlotValues,
    pub today: NaiveDate,
}

/// One schema-driven extractor shared by every intent.
pub struct SlotExtractor {
    llm: Arc<dyn LlmClient>,
    email_domain: String,
}

impl SlotExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, email_domain: impl Into<String>) -> Self {
        Self { llm, email_domain: email_domain.into() }
    }

    /// Runs one extraction call and returns the known values overlaid with what
    /// this turn contributed, normalised, defaulted and derived.
    pub async fn extract(
        &self,
        schema: &SlotSchema,
        input: ExtractionInput<'_>,
    ) -> Result<SlotValues, TurnError> {
        if schema.is_empty() {
            return Ok(input.known.clone());
        }

        let prompt =
            prompts::extraction(schema, input.message, input.summary, input.known, input.today);
        let raw = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|error| TurnError::ExtractionFailure { reason: error.to_string() })?;

        let extracted = parse_fields(schema, &raw, input.today)?;
        let mut values = input.known.overlaid_with(&extracted);

        for spec in schema.fields() {
            if values.get(spec.name).is_none() && spec.default == Some(SlotDefault::Today) {
                values.set(spec.name, input.today.format("%Y-%m-%d").to_string());
            }
        }

        for spec in schema.fields() {
            if values.get(spec.name).is_some() {
                continue;
            }
            let derived = match spec.derive {
                Some(Derivation::ShortTitle { from, max_words }) => match values.get(from) {
                    Some(source) => Some(self.derive_title(source, max_words).await),
                    None => None,
                },
                Some(Derivation::EmailFromNames { first, last }) => {
                    match (values.get(first), values.get(last)) {
                        (Some(first), Some(last)) => {
                            Some(derive_email(first, last, &self.email_domain))
                        }
                        _ => None,
                    }
                }
                None => None,
            };
            if let Some(value) = derived {
                values.set(spec.name, value);
            }
        }

        Ok(values)
    }

    async fn derive_title(&self, source: &str, max_words: usize) -> String {
        match self.llm.complete(&prompts::title(source, max_words)).await {
            Ok(raw) => {
                let title = clean_title(&raw, max_words);
                if title.is_empty() {
                    first_words(source, max_words)
                } else {
                    title
                }
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "dialogue.extract.title_fallback",
                    error = %error,
                    "title derivation failed, using leading words"
                );
                first_words(source, max_words)
            }
        }
    }
}

/// Reads `name: value` lines. Unknown names and junk lines are skipped; a reply
/// without a single recognised line is an extraction failure.
fn parse_fields(schema: &SlotSchema, raw: &str, today: NaiveDate) -> Result<SlotValues, TurnError> {
    let mut recognised = 0usize;
    let mut values = SlotValues::new();

    for line in raw.lines() {
        let line = line.trim().trim_start_matches(['-', '*']).trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = normalize_key(key);
        let Some(spec) = schema.field(&key) else {
            continue;
        };
        recognised += 1;

        let value = strip_quotes(value);
        if is_placeholder(value) {
            continue;
        }
        match normalize_value(spec, value, today) {
            Some(normalized) => values.set(spec.name, normalized),
            None => tracing::debug!(
                event_name = "dialogue.extract.value_dropped",
                field = spec.name,
                value,
                "extracted value failed normalisation"
            ),
        }
    }

    if recognised == 0 {
        return Err(TurnError::ExtractionFailure {
            reason: "no recognisable field lines in completion output".to_string(),
        });
    }
    Ok(values)
}

fn normalize_key(key: &str) -> String {
    key.trim()
        .trim_matches(|ch: char| ch == '`' || ch == '"' || ch == '\'' || ch == '*')
        .trim()
        .to_ascii_lowercase()
        .replace([' ', '-'], "_")
}

fn strip_quotes(value: &str) -> &str {
    let value = value.trim();
    if value.len() >= 2 {
        for quote in ['"', '\'', '`'] {
            if value.starts_with(quote) && value.ends_with(quote) {
                return value[1..value.len() - 1].trim();
            }
        }
    }
    value
}

fn is_placeholder(value: &str) -> bool {
    value.is_empty() || PLACEHOLDERS.contains(&value.to_ascii_lowercase().as_str())
}

fn normalize_value(spec: &SlotSpec, value: &str, today: NaiveDate) -> Option<String> {
    match spec.kind {
        SlotKind::Text => Some(value.to_string()),
        SlotKind::PersonName => {
            let name = canonical_name(value);
            (!name.is_empty()).then_some(name)
        }
        SlotKind::Date => resolve_date(value, today).map(|date| date.format("%Y-%m-%d").to_string()),
        SlotKind::Role => value.parse::<Role>().ok().map(|role| role.as_str().to_string()),
        SlotKind::Email => {
            let email = value.to_ascii_lowercase();
            let valid = email.contains('@') && !email.chars().any(char::is_whitespace);
            valid.then_some(email)
        }
        SlotKind::Url => {
            let lowered = value.to_ascii_lowercase();
            let valid = lowered.starts_with("http://") || lowered.starts_with("https://");
            valid.then(|| value.to_string())
        }
    }
}

fn clean_title(raw: &str, max_words: usize) -> String {
    let line = raw.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or("");
    let line = line
        .strip_prefix("Title:")
        .or_else(|| line.strip_prefix("title:"))
        .unwrap_or(line);
    first_words(strip_quotes(line), max_words)
}

fn first_words(source: &str, max_words: usize) -> String {
    source
        .split_whitespace()
        .take(max_words.max(1))
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(|ch: char| ch.is_ascii_punctuation())
        .to_string()
}

fn derive_email(first: &str, last: &str, domain: &str) -> String {
    let part = |name: &str| {
        name.chars()
            .filter(|ch| ch.is_alphanumeric() || *ch == '-')
            .flat_map(char::to_lowercase)
            .collect::<String>()
    };
    format!("{}.{}@{}", part(first), part(last), domain.trim().trim_start_matches('@'))
}
