//! Core string helpers shared by the value patterns.
//!
//! This module provides:
//! - `CachedValue` - an operand with pre-computed lowercase for case-insensitive equality
//! - `normalized_edit_distance` - Levenshtein distance scaled into `[0, 1]`

/// A string operand with pre-computed lowercase.
///
/// Avoids lowercasing the expected value on every match when a pattern is
/// configured case-insensitive.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    /// Original value (for case-sensitive matching)
    pub value: String,
    /// Pre-computed lowercase (for case-insensitive matching)
    pub lower: String,
}

impl CachedValue {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let lower = value.to_lowercase();
        Self { value, lower }
    }

    #[inline]
    pub fn equals(&self, value: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            value == self.value
        } else {
            value.to_lowercase() == self.lower
        }
    }

    /// Distance between this operand and `value`, 0 when equal.
    pub fn distance(&self, value: &str, case_sensitive: bool) -> f64 {
        if case_sensitive {
            normalized_edit_distance(&self.value, value)
        } else {
            normalized_edit_distance(&self.lower, &value.to_lowercase())
        }
    }
}

impl From<String> for CachedValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for CachedValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Levenshtein distance over chars, normalized by the longer input.
pub fn normalized_edit_distance(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }
    edit_distance(&a, &b) as f64 / longest as f64
}

fn edit_distance(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two-row dynamic programming table
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            let insertion = current[j] + 1;
            let deletion = previous[j + 1] + 1;
            current[j + 1] = substitution.min(insertion).min(deletion);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_value_new() {
        let cv = CachedValue::new("Hello World");
        assert_eq!(cv.value, "Hello World");
        assert_eq!(cv.lower, "hello world");
    }

    #[test]
    fn test_cached_value_equals() {
        let cv = CachedValue::new("Test");

        assert!(cv.equals("Test", true));
        assert!(!cv.equals("test", true));

        assert!(cv.equals("test", false));
        assert!(cv.equals("tEsT", false));
    }

    #[test]
    fn test_cached_value_distance_respects_case_mode() {
        let cv = CachedValue::new("ABC");
        assert_eq!(cv.distance("abc", false), 0.0);
        assert_eq!(cv.distance("abc", true), 1.0);
    }

    #[test]
    fn test_edit_distance_known_values() {
        assert_eq!(normalized_edit_distance("", ""), 0.0);
        assert_eq!(normalized_edit_distance("abc", ""), 1.0);
        assert_eq!(normalized_edit_distance("kitten", "sitting"), 3.0 / 7.0);
        assert_eq!(normalized_edit_distance("/status", "/status"), 0.0);
    }

    #[test]
    fn test_edit_distance_is_symmetric() {
        assert_eq!(
            normalized_edit_distance("/api/users", "/api/user"),
            normalized_edit_distance("/api/user", "/api/users")
        );
    }

    #[test]
    fn test_edit_distance_handles_multibyte() {
        assert_eq!(normalized_edit_distance("héllo", "hello"), 0.2);
    }
}
