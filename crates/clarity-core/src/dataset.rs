//! Cleaning of counseling-conversation datasets before import.
//!
//! Records are JSON objects (a JSON array or one object per line). Each one
//! yields at most one (user, therapist) pair; both sides are anonymised and
//! normalised, and pairs with an unusable side are dropped.

use regex::Regex;
use serde_json::Value;

use crate::error::Result;

const USER_COLUMNS: &[&str] = &["Context", "input", "question", "user_input", "client_message"];
const THERAPIST_COLUMNS: &[&str] = &["Response", "output", "answer", "therapist_response", "counselor_response"];
/// Minimum length of a free-text field used when no known column exists.
const FALLBACK_FIELD_CHARS: usize = 20;
const MIN_CHARS: usize = 10;
const MAX_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanConversation {
    pub conversation_id: String,
    pub user_message: String,
    pub therapist_response: String,
}

/// Parses a JSON array of records, or JSON lines when the input is not an
/// array. Blank lines are skipped.
pub fn parse_records(raw: &str) -> Result<Vec<Value>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| Ok(serde_json::from_str(l)?))
        .collect()
}

/// Picks the user and therapist text of `record`.
pub fn extract_pair(record: &Value) -> Option<(String, String)> {
    let obj = record.as_object()?;
    let pick = |cols: &[&str]| {
        cols.iter()
            .find_map(|c| obj.get(*c).and_then(Value::as_str))
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };
    let mut user = pick(USER_COLUMNS);
    let mut therapist = pick(THERAPIST_COLUMNS);

    if user.is_none() || therapist.is_none() {
        let texts: Vec<&str> = obj
            .values()
            .filter_map(Value::as_str)
            .filter(|s| s.chars().count() > FALLBACK_FIELD_CHARS)
            .collect();
        if texts.len() >= 2 {
            user = user.or_else(|| Some(texts[0].to_string()));
            therapist = therapist.or_else(|| Some(texts[1].to_string()));
        }
    }
    Some((user?, therapist?))
}

pub struct DatasetCleaner {
    email: Regex,
    phone: Regex,
    address: Regex,
    name: Regex,
    whitespace: Regex,
    disallowed: Regex,
}

impl DatasetCleaner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            email: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")?,
            phone: Regex::new(r"\b\d{3}-\d{3}-\d{4}\b")?,
            address: Regex::new(r"\b\d{1,5}\s+\w+\s+(?:Street|St|Avenue|Ave|Road|Rd|Drive|Dr)\b")?,
            name: Regex::new(r"\b[A-Z][a-z]+ [A-Z][a-z]+\b")?,
            whitespace: Regex::new(r"\s+")?,
            disallowed: Regex::new(r#"[^\w\s.,!?;:'"\[\]-]"#)?,
        })
    }

    /// Anonymises and normalises `text`; `None` when the result is shorter
    /// than 10 or longer than 2000 characters.
    pub fn clean(&self, text: &str) -> Option<String> {
        let text = self.email.replace_all(text, "[EMAIL]");
        let text = self.phone.replace_all(&text, "[PHONE]");
        let text = self.address.replace_all(&text, "[ADDRESS]");
        let text = self.name.replace_all(&text, "[NAME]");
        let text = self.whitespace.replace_all(&text, " ");
        let text = self.disallowed.replace_all(text.trim(), "");
        let len = text.chars().count();
        (MIN_CHARS..=MAX_CHARS).contains(&len).then(|| text.into_owned())
    }

    /// Extracts and cleans every usable pair. Ids are `conv_{index}` by
    /// position in `records`.
    pub fn preprocess(&self, records: &[Value]) -> Vec<CleanConversation> {
        let mut out = Vec::new();
        let mut skipped = 0usize;
        for (idx, record) in records.iter().enumerate() {
            let cleaned = extract_pair(record).and_then(|(user, therapist)| {
                Some((self.clean(&user)?, self.clean(&therapist)?))
            });
            match cleaned {
                Some((user_message, therapist_response))
                    if user_message.chars().count() > MIN_CHARS
                        && therapist_response.chars().count() > MIN_CHARS =>
                {
                    out.push(CleanConversation {
                        conversation_id: format!("conv_{idx}"),
                        user_message,
                        therapist_response,
                    })
                }
                _ => skipped += 1,
            }
        }
        tracing::info!(kept = out.len(), skipped, "preprocessed dataset records");
        out
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn cleaner() -> DatasetCleaner {
        DatasetCleaner::new().unwrap()
    }

    #[test]
    fn anonymises_identifiers() {
        let out = cleaner()
            .clean("Call me at 555-123-4567 or mail jane.doe@example.com, I live at 42 Baker Street with John Smith.")
            .unwrap();
        assert_eq!(
            out,
            "Call me at [PHONE] or mail [EMAIL], I live at [ADDRESS] with [NAME]."
        );
    }

    #[test]
    fn collapses_whitespace_and_strips_symbols() {
        let out = cleaner().clean("  I feel   #awful\n\ttoday :( ").unwrap();
        assert_eq!(out, "I feel awful today :");
    }

    #[test]
    fn rejects_too_short_and_too_long() {
        assert!(cleaner().clean("ok thanks").is_none());
        assert!(cleaner().clean(&"a".repeat(2001)).is_none());
    }

    #[test]
    fn extracts_known_columns() {
        let rec = json!({"Context": "I can't sleep at night", "Response": "Let's look at your routine."});
        let (u, t) = extract_pair(&rec).unwrap();
        assert_eq!(u, "I can't sleep at night");
        assert_eq!(t, "Let's look at your routine.");

        let rec = json!({"input": "question text", "output": "answer text"});
        assert_eq!(extract_pair(&rec).unwrap().0, "question text");
    }

    #[test]
    fn falls_back_to_long_text_fields() {
        let rec = json!({
            "a_prompt": "I have been feeling lonely since the move",
            "b_reply": "Moving is a big change, loneliness is common.",
            "id": 7
        });
        let (u, t) = extract_pair(&rec).unwrap();
        assert!(u.starts_with("I have been"));
        assert!(t.starts_with("Moving"));
        assert!(extract_pair(&json!({"Context": "only one side"})).is_none());
    }

    #[test]
    fn parses_array_and_json_lines() {
        let array = parse_records(r#"[{"input":"a"},{"input":"b"}]"#).unwrap();
        assert_eq!(array.len(), 2);
        let lines = parse_records("{\"input\":\"a\"}\n\n{\"input\":\"b\"}\n").unwrap();
        assert_eq!(lines.len(), 2);
        assert!(parse_records("{not json").is_err());
    }

    #[test]
    fn preprocess_keeps_valid_pairs_with_positional_ids() {
        let records = vec![
            json!({"Context": "short", "Response": "Too short on one side."}),
            json!({"Context": "My partner and I argue every day.", "Response": "That sounds exhausting for both of you."}),
        ];
        let out = cleaner().preprocess(&records);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].conversation_id, "conv_1");
    }
}
