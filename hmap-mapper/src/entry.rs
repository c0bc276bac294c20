//! Typed result of one mapped operation.

/// Outcome of a single operation against one key.
///
/// `value` is `None` for the null sentinel: a read where every requested
/// field was absent. Fields that were requested but not found (or could not
/// be decoded) are listed in `missed_fields` by wire name.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: Option<T>,
    pub missed_fields: Vec<String>,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>, value: T) -> Self {
        CacheEntry {
            key: key.into(),
            value: Some(value),
            missed_fields: Vec::new(),
        }
    }

    /// Builds the null sentinel for `key`.
    pub fn null(key: impl Into<String>) -> Self {
        CacheEntry {
            key: key.into(),
            value: None,
            missed_fields: Vec::new(),
        }
    }

    pub fn with_missed_fields(mut self, missed_fields: Vec<String>) -> Self {
        self.missed_fields = missed_fields;
        self
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.value.is_some() && self.missed_fields.is_empty()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_entries_have_no_value() {
        let entry = CacheEntry::<i32>::null("user:1");
        assert!(entry.is_null());
        assert!(!entry.is_complete());
    }

    #[test]
    fn missed_fields_make_entries_partial() {
        let entry = CacheEntry::new("user:1", 3).with_missed_fields(vec!["age".into()]);
        assert!(!entry.is_null());
        assert!(!entry.is_complete());
        assert_eq!(entry.into_value(), Some(3));
    }
}
