//! Model-pattern matching grammar (`IsModelAllowed`).
//!
//! Patterns are POSIX-style globs (`globset`, the same crate several sibling
//! gateways in this corpus reach for). A pattern ending in `*` additionally
//! matches by literal prefix of the un-starred part — kept as a deliberate
//! redundancy so `openai/*`-style patterns behave unambiguously even if a
//! caller's model string contains characters the glob engine treats
//! specially.

use globset::Glob;

/// True iff `pattern` matches `model`, either as a glob or (when the
/// pattern ends in `*`) as a literal prefix match.
pub fn pattern_matches(pattern: &str, model: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        if model.starts_with(prefix) {
            return true;
        }
    }
    match Glob::new(pattern) {
        Ok(glob) => glob.compile_matcher().is_match(model),
        Err(_) => false,
    }
}

/// True iff `allowed_patterns` is empty, or any pattern matches `model`.
pub fn is_model_allowed(allowed_patterns: &[String], model: &str) -> bool {
    allowed_patterns.is_empty() || allowed_patterns.iter().any(|p| pattern_matches(p, model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patterns_allow_everything() {
        assert!(is_model_allowed(&[], "anything/goes"));
    }

    #[test]
    fn star_alone_matches_any_model() {
        assert!(is_model_allowed(&["*".to_string()], "openai/gpt-4o"));
    }

    #[test]
    fn prefixed_glob_admits_matching_provider() {
        let patterns = vec!["openai/*".to_string()];
        assert!(is_model_allowed(&patterns, "openai/gpt-4o"));
        assert!(!is_model_allowed(&patterns, "anthropic/claude-3-haiku-20240307"));
    }

    #[test]
    fn question_mark_matches_single_character() {
        assert!(pattern_matches("openai/gpt-4?", "openai/gpt-4o"));
        assert!(!pattern_matches("openai/gpt-4?", "openai/gpt-4oo"));
    }

    #[test]
    fn non_star_pattern_requires_exact_match() {
        assert!(pattern_matches("openai/gpt-4o", "openai/gpt-4o"));
        assert!(!pattern_matches("openai/gpt-4o", "openai/gpt-4o-mini"));
    }
}
