//! Regex dialect checks
//!
//! The declarative engine only runs RE2 expressions. `regex-syntax` follows
//! the same restrictions (no look-around, no backreferences), so a pattern it
//! parses is one the engine will accept.

use regex_syntax::ParserBuilder;

/// Decides whether a `regexFilter` can be handed to the engine.
pub trait RegexValidator: Send + Sync {
    /// `Err` carries a human readable reason.
    fn is_supported(&self, pattern: &str, case_sensitive: bool) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Re2RegexValidator;

impl RegexValidator for Re2RegexValidator {
    fn is_supported(&self, pattern: &str, case_sensitive: bool) -> Result<(), String> {
        ParserBuilder::new()
            .case_insensitive(!case_sensitive)
            .build()
            .parse(pattern)
            .map(drop)
            .map_err(|err| err.to_string())
    }
}
