//! Glob-style wildcard matching for domain patterns
//!
//! Patterns use `*` (any sequence) and `?` (single character), anchored at
//! both ends and matched case-insensitively, so `*.example.com` matches
//! `api.example.com` but not `example.com` or `example.com.evil.test`.

use regex::Regex;

/// Compile a wildcard pattern into an anchored, case-insensitive regex.
/// Invalid patterns (which regex::escape makes impossible in practice)
/// yield None and never match.
pub fn compile(pattern: &str) -> Option<Regex> {
    let escaped = regex::escape(pattern);
    let translated = escaped.replace("\\*", ".*").replace("\\?", ".");
    Regex::new(&format!("(?i)^{}$", translated)).ok()
}

/// Check whether `domain` matches any of the wildcard `patterns`.
pub fn matches_any(domain: &str, patterns: &[String]) -> bool {
    let domain = domain.to_lowercase();
    patterns
        .iter()
        .filter_map(|p| compile(p))
        .any(|re| re.is_match(&domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pats(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_subdomain_wildcard() {
        let patterns = pats(&["*.example.com"]);
        assert!(matches_any("api.example.com", &patterns));
        assert!(matches_any("a.b.example.com", &patterns));
        assert!(!matches_any("example.com", &patterns));
        assert!(!matches_any("example.com.evil.test", &patterns));
    }

    #[test]
    fn test_case_insensitive() {
        let patterns = pats(&["*.Example.COM"]);
        assert!(matches_any("API.example.com", &patterns));
    }

    #[test]
    fn test_question_mark() {
        let patterns = pats(&["host?.internal"]);
        assert!(matches_any("host1.internal", &patterns));
        assert!(!matches_any("host12.internal", &patterns));
    }

    #[test]
    fn test_exact_match_without_wildcards() {
        let patterns = pats(&["example.com"]);
        assert!(matches_any("example.com", &patterns));
        assert!(!matches_any("api.example.com", &patterns));
    }

    #[test]
    fn test_regex_metacharacters_escaped() {
        // The dot must not behave as a regex wildcard
        let patterns = pats(&["example.com"]);
        assert!(!matches_any("exampleXcom", &patterns));
    }
}
