use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// The structured record a completed turn is expected to carry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DecisionPayload {
    pub message: String,
    pub relevancy: i64,
}

/// Matches a fenced code block, optionally tagged `json`, holding an
/// object. Best-effort: the upstream model may or may not wrap its
/// answer in a fence.
static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced block pattern is valid")
});

/// Pull the candidate payload text out of a turn: the inner content of
/// the first fenced block when present, otherwise the whole text.
fn extract_candidate(turn_text: &str) -> &str {
    match FENCED_JSON.captures(turn_text) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(turn_text),
        None => turn_text,
    }
}

/// Parse a completed turn into a decision payload. Errors cover both
/// unparsable JSON and schema violations (missing fields, wrong types,
/// empty message); callers treat every error as "no decision".
pub fn parse_decision(turn_text: &str) -> Result<DecisionPayload, String> {
    let candidate = extract_candidate(turn_text).trim();
    let payload: DecisionPayload =
        serde_json::from_str(candidate).map_err(|e| format!("invalid payload JSON: {}", e))?;
    if payload.message.is_empty() {
        return Err("payload has an empty message".to_string());
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_wins_over_surrounding_prose() {
        let turn = "Here you go:\n```json\n{\"message\":\"hi\",\"relevancy\":85}\n```\nanything else?";
        let payload = parse_decision(turn).unwrap();
        assert_eq!(payload.message, "hi");
        assert_eq!(payload.relevancy, 85);
    }

    #[test]
    fn untagged_fence_is_accepted() {
        let turn = "```\n{\"message\":\"yo\",\"relevancy\":90}\n```";
        assert_eq!(parse_decision(turn).unwrap().message, "yo");
    }

    #[test]
    fn bare_json_without_fence_parses() {
        let turn = r#"{"message":"plain","relevancy":99}"#;
        assert_eq!(parse_decision(turn).unwrap().relevancy, 99);
    }

    #[test]
    fn missing_fields_are_rejected() {
        assert!(parse_decision(r#"{"message":"hi"}"#).is_err());
        assert!(parse_decision(r#"{"relevancy":85}"#).is_err());
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(parse_decision(r#"{"message":"hi","relevancy":"high"}"#).is_err());
        assert!(parse_decision(r#"{"message":5,"relevancy":85}"#).is_err());
    }

    #[test]
    fn empty_message_is_rejected() {
        assert!(parse_decision(r#"{"message":"","relevancy":85}"#).is_err());
    }

    #[test]
    fn non_json_turn_is_rejected_not_fatal() {
        assert!(parse_decision("I have nothing to say about this.").is_err());
    }
}
