//! Built-in value variants and their helpers.

pub(crate) mod bytes;
pub(crate) mod decimal;
pub(crate) mod dict;
pub(crate) mod error;
pub(crate) mod func;
pub(crate) mod iter;
pub(crate) mod kv;
pub(crate) mod object_type;
pub(crate) mod reflect;
pub(crate) mod regexp;
pub(crate) mod str;

pub use decimal::Decimal;
pub(crate) use dict::{Dict, SyncDict};
pub(crate) use error::ErrorObj;
pub(crate) use func::{BoundMethod, Closure, HostFuncObj, MethodTable, Overload, TypeSet, TypeSig, TypeTag, Wrapped};
pub(crate) use iter::{IterOptions, ValueIter};
pub(crate) use kv::{KeyValue, KeyValueArray, NamedArgs};
pub(crate) use object_type::{Instance, ObjectType};
pub(crate) use reflect::Reflect;
pub use reflect::{HostCall, HostFunc, HostObject};
pub(crate) use regexp::Regexp;

use crate::errors::{ErrKind, RunError, RunResult};

/// Normalizes a possibly-negative index against `len`.
///
/// Negative indices count from the end. Out-of-range indices return `None`;
/// callers decide between an error and a nil result.
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len_i = len as i64;
    let adjusted = if index < 0 { index + len_i } else { index };
    if (0..len_i).contains(&adjusted) {
        Some(adjusted as usize)
    } else {
        None
    }
}

/// Resolves half-open slice bounds with `low <= high <= len`.
///
/// Negative bounds count from the end; absent bounds default to the ends.
pub(crate) fn slice_bounds(low: Option<i64>, high: Option<i64>, len: usize) -> RunResult<(usize, usize)> {
    let len_i = len as i64;
    let clamp = |raw: i64| -> RunResult<i64> {
        let adjusted = if raw < 0 { raw + len_i } else { raw };
        if (0..=len_i).contains(&adjusted) {
            Ok(adjusted)
        } else {
            Err(ErrKind::index_out_of_bounds(raw, len))
        }
    };
    let low = clamp(low.unwrap_or(0))?;
    let high = clamp(high.unwrap_or(len_i))?;
    if low > high {
        return Err(invalid_slice(low, high));
    }
    Ok((low as usize, high as usize))
}

fn invalid_slice(low: i64, high: i64) -> RunError {
    ErrKind::InvalidIndexError.err(format!("invalid slice bounds: {low} > {high}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_indices_count_from_the_end() {
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(-3, 3), Some(0));
        assert_eq!(normalize_index(-4, 3), None);
        assert_eq!(normalize_index(3, 3), None);
    }

    #[test]
    fn slice_bounds_are_half_open() {
        assert_eq!(slice_bounds(None, None, 4).unwrap(), (0, 4));
        assert_eq!(slice_bounds(Some(1), Some(3), 4).unwrap(), (1, 3));
        assert_eq!(slice_bounds(Some(-2), None, 4).unwrap(), (2, 4));
        assert!(slice_bounds(Some(3), Some(1), 4).is_err());
        assert!(slice_bounds(Some(0), Some(5), 4).is_err());
    }
}
