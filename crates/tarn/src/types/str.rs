//! Indexing and slicing helpers for immutable strings.
//!
//! Strings are byte sequences interpreted as UTF-8; indexing and slicing work
//! in character positions.

use crate::{
    errors::{ErrKind, RunResult},
    types::{normalize_index, slice_bounds},
};

/// Returns the character at `index` (negative counts from the end).
pub(crate) fn char_at(s: &str, index: i64) -> RunResult<char> {
    let len = s.chars().count();
    let at = normalize_index(index, len).ok_or_else(|| ErrKind::index_out_of_bounds(index, len))?;
    s.chars()
        .nth(at)
        .ok_or_else(|| ErrKind::index_out_of_bounds(index, len))
}

/// Slices by character positions, half-open.
pub(crate) fn str_slice(s: &str, low: Option<i64>, high: Option<i64>) -> RunResult<String> {
    let len = s.chars().count();
    let (low, high) = slice_bounds(low, high, len)?;
    Ok(s.chars().skip(low).take(high - low).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_positions_not_bytes() {
        assert_eq!(char_at("héllo", 1).unwrap(), 'é');
        assert_eq!(char_at("héllo", -1).unwrap(), 'o');
        assert!(char_at("ab", 2).is_err());
    }

    #[test]
    fn slicing() {
        assert_eq!(str_slice("héllo", Some(1), Some(3)).unwrap(), "él");
        assert_eq!(str_slice("abc", None, None).unwrap(), "abc");
    }
}
