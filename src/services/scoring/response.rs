//! Parsing of scorer replies. Models tend to wrap the requested JSON object
//! in prose or code fences, so the object is located by brace matching.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ParseError {
    #[error("no JSON object found")]
    NoObject,
    #[error("unbalanced JSON object")]
    Unbalanced,
    #[error("invalid JSON: {0}")]
    Invalid(String),
    #[error("missing or non-numeric score")]
    MissingScore,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScoredReply {
    pub(crate) score_100: f64,
    pub(crate) review: String,
}

/// Returns the first balanced `{...}` span of `raw` parsed as an object.
pub(crate) fn extract_json(raw: &str) -> Result<Map<String, Value>, ParseError> {
    let start = raw.find('{').ok_or(ParseError::NoObject)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + offset + ch.len_utf8());
                    break;
                }
            }
            _ => {}
        }
    }

    let end = end.ok_or(ParseError::Unbalanced)?;
    let candidate = strip_trailing_commas(&raw[start..end]);
    match serde_json::from_str::<Value>(&candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ParseError::NoObject),
        Err(err) => Err(ParseError::Invalid(err.to_string())),
    }
}

/// Drops commas directly followed by a closing bracket, outside strings.
fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (index, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        }
        if ch == ',' {
            let next = chars[index + 1..].iter().find(|candidate| !candidate.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Accepts `87`, `87.5`, `"87"` or `"87/100"`; the result is clamped to 0..=100.
pub(crate) fn normalize_score(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let numerator = text.split('/').next().unwrap_or_default().trim();
            numerator.parse::<f64>().ok()
        }
        _ => None,
    }?;
    parsed.is_finite().then(|| parsed.clamp(0.0, 100.0))
}

/// Interprets a scorer body: either a chat-completion wrapper whose message
/// content holds the object, or the object itself (possibly inside prose).
pub(crate) fn parse_reply(body: &str) -> Result<ScoredReply, ParseError> {
    let content = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());

    let object = extract_json(&content)?;
    let score_100 = object.get("score").and_then(normalize_score).ok_or(ParseError::MissingScore)?;
    let review = object
        .get("review")
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .unwrap_or_default();
    Ok(ScoredReply { score_100, review })
}

/// Keeps at most `limit` sentences.
pub(crate) fn truncate_sentences(text: &str, limit: usize) -> String {
    let mut count = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((index, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?') {
            let boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if boundary {
                count += 1;
                if count == limit {
                    return text[..index + ch.len_utf8()].trim().to_string();
                }
            }
        }
    }
    text.trim().to_string()
}
