//! # Field Formatters
//!
//! Map a logical field name (the Rust field identifier) onto the name used
//! in the stored hash.

use std::fmt;

/// Maps logical field names to wire field names.
pub trait FieldFormatter: Send + Sync + fmt::Debug {
    fn format(&self, logical: &str) -> String;
}

/// `snake_case` and `PascalCase` names become `camelCase`.
///
/// Underscores start a new word; the first character is always lowercased
/// and the rest of the name is kept as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct CamelCase;

impl FieldFormatter for CamelCase {
    fn format(&self, logical: &str) -> String {
        let mut out = String::with_capacity(logical.len());
        let mut upper_next = false;
        for ch in logical.chars() {
            if ch == '_' {
                upper_next = !out.is_empty();
                continue;
            }
            if out.is_empty() {
                out.extend(ch.to_lowercase());
            } else if upper_next {
                out.extend(ch.to_uppercase());
            } else {
                out.push(ch);
            }
            upper_next = false;
        }
        out
    }
}

/// Keeps logical names unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl FieldFormatter for Identity {
    fn format(&self, logical: &str) -> String {
        logical.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_from_snake_case() {
        assert_eq!(CamelCase.format("user_name"), "userName");
        assert_eq!(CamelCase.format("created_at_utc"), "createdAtUtc");
        assert_eq!(CamelCase.format("age"), "age");
    }

    #[test]
    fn camel_case_lowercases_first_char_only() {
        assert_eq!(CamelCase.format("Name"), "name");
        assert_eq!(CamelCase.format("UserID"), "userID");
        assert_eq!(CamelCase.format("alreadyCamel"), "alreadyCamel");
    }

    #[test]
    fn camel_case_ignores_leading_and_doubled_underscores() {
        assert_eq!(CamelCase.format("_private"), "private");
        assert_eq!(CamelCase.format("a__b"), "aB");
        assert_eq!(CamelCase.format("trailing_"), "trailing");
    }

    #[test]
    fn identity_keeps_names() {
        assert_eq!(Identity.format("user_name"), "user_name");
    }
}
