//! Reply shape sent to the model and the parser for what comes back.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::model::OutputRecord;

/// JSON schema the model's reply must follow.
pub fn phrase_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "phrases": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "phrase": { "type": "string" },
                        "pinyin": { "type": "string" },
                        "translation": { "type": "string" },
                        "context": { "type": "string" }
                    },
                    "required": ["phrase", "pinyin", "translation", "context"]
                }
            }
        },
        "required": ["phrases"]
    })
}

#[derive(Debug, Deserialize)]
struct PhraseBatch {
    #[serde(default)]
    phrases: Vec<Phrase>,
}

#[derive(Debug, Deserialize)]
struct Phrase {
    phrase: String,
    #[serde(default)]
    pinyin: String,
    #[serde(default)]
    translation: String,
    #[serde(default)]
    context: String,
}

/// Turn the model's reply text into records for `key`.
///
/// An empty or `null` reply yields no records. Text that is not the
/// expected JSON is an error, so the item is retried on the next run.
/// Phrases with blank text are dropped.
pub fn parse_phrases(key: &str, reply: &str) -> Result<Vec<OutputRecord>, serde_json::Error> {
    let reply = reply.trim();
    if reply.is_empty() || reply == "null" {
        return Ok(Vec::new());
    }

    let batch: PhraseBatch = serde_json::from_str(reply).inspect_err(|e| {
        debug!(key, error = %e, "unparseable model reply");
    })?;

    Ok(batch
        .phrases
        .into_iter()
        .filter(|p| !p.phrase.trim().is_empty())
        .map(|p| OutputRecord {
            key: key.to_string(),
            phrase: p.phrase,
            pinyin: p.pinyin,
            translation: p.translation,
            context: p.context,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_all_phrase_fields() {
        let schema = phrase_schema();
        let required = &schema["properties"]["phrases"]["items"]["required"];
        assert_eq!(required.as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn reply_order_is_preserved() {
        let reply = r#"{"phrases":[
            {"phrase":"一起去","pinyin":"yì qǐ qù","translation":"go together","context":"plans"},
            {"phrase":"一点点","pinyin":"yì diǎn diǎn","translation":"a little","context":"ordering tea"}
        ]}"#;
        let records = parse_phrases("一", reply).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].phrase, "一起去");
        assert_eq!(records[1].phrase, "一点点");
        assert!(records.iter().all(|r| r.key == "一"));
    }

    #[test]
    fn empty_and_null_yield_nothing() {
        assert!(parse_phrases("一", "").unwrap().is_empty());
        assert!(parse_phrases("一", " null ").unwrap().is_empty());
        assert!(parse_phrases("一", "{}").unwrap().is_empty());
    }

    #[test]
    fn truncated_or_prose_reply_is_an_error() {
        assert!(parse_phrases("一", "{\"phrases\": [").is_err());
        assert!(parse_phrases("一", r#"{"phrases": [ {"phrase": "truncated"#).is_err());
        assert!(parse_phrases("一", "sorry, I cannot do that").is_err());
    }

    #[test]
    fn missing_context_defaults_to_empty() {
        let records =
            parse_phrases("一", r#"{"phrases":[{"phrase":"一个人","pinyin":"yí gè rén"}]}"#)
                .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].context, "");
    }
}
