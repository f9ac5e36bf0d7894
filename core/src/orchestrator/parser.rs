//! Response text post-processing
//!
//! Models wrap private reasoning in `<thought>` tags and may end a reply
//! with a `<suggestions>` block holding a JSON array of follow-up prompts.
//! Only the first thought block is peeled; suggestions are only honored as
//! a trailing block.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref THOUGHT_RE: Regex =
        Regex::new(r"(?s)<thought>(.*?)</thought>").expect("valid thought regex");
    static ref SUGGESTIONS_RE: Regex =
        Regex::new(r"(?s)<suggestions>\s*(\[.*?\])\s*</suggestions>\s*$")
            .expect("valid suggestions regex");
}

/// Split the first `<thought>` block out of a response.
pub fn parse_thought(text: &str) -> (Option<String>, String) {
    let Some(captures) = THOUGHT_RE.captures(text) else {
        return (None, text.to_string());
    };
    let whole = captures.get(0).expect("capture 0");
    let thought = captures[1].trim().to_string();
    let mut rest = String::with_capacity(text.len() - whole.len());
    rest.push_str(&text[..whole.start()]);
    rest.push_str(&text[whole.end()..]);
    let thought = if thought.is_empty() { None } else { Some(thought) };
    (thought, rest.trim().to_string())
}

/// Split a trailing `<suggestions>` JSON block out of a response.
pub fn parse_suggestions(text: &str) -> (Vec<String>, String) {
    let Some(captures) = SUGGESTIONS_RE.captures(text) else {
        return (Vec::new(), text.to_string());
    };
    let whole = captures.get(0).expect("capture 0");
    let suggestions: Vec<String> = serde_json::from_str(&captures[1]).unwrap_or_default();
    (suggestions, text[..whole.start()].trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thought_is_peeled() {
        let (thought, rest) = parse_thought("<thought>check the cache first</thought>Here you go.");
        assert_eq!(thought.as_deref(), Some("check the cache first"));
        assert_eq!(rest, "Here you go.");
    }

    #[test]
    fn test_only_first_thought_is_peeled() {
        let (thought, rest) =
            parse_thought("<thought>one</thought>a<thought>two</thought>b");
        assert_eq!(thought.as_deref(), Some("one"));
        assert_eq!(rest, "a<thought>two</thought>b");
    }

    #[test]
    fn test_no_thought_passes_through() {
        let (thought, rest) = parse_thought("plain answer");
        assert!(thought.is_none());
        assert_eq!(rest, "plain answer");
    }

    #[test]
    fn test_trailing_suggestions_are_parsed() {
        let text = "Done.\n<suggestions>[\"try again\", \"show logs\"]</suggestions>";
        let (suggestions, rest) = parse_suggestions(text);
        assert_eq!(suggestions, vec!["try again", "show logs"]);
        assert_eq!(rest, "Done.");
    }

    #[test]
    fn test_mid_text_suggestions_are_ignored() {
        let text = "<suggestions>[\"x\"]</suggestions> and more text";
        let (suggestions, rest) = parse_suggestions(text);
        assert!(suggestions.is_empty());
        assert_eq!(rest, text);
    }

    #[test]
    fn test_malformed_suggestions_json_yields_none() {
        let text = "Done.\n<suggestions>[not json]</suggestions>";
        let (suggestions, rest) = parse_suggestions(text);
        assert!(suggestions.is_empty());
        assert_eq!(rest, "Done.");
    }
}
