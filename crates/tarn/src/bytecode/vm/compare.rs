//! The comparison lattice.
//!
//! Equality is structural with numeric widening. Ordering is defined between
//! all numeric kinds (widening), strings (lexicographic), chars, bytes, and
//! arrays (elementwise); `nil` sorts strictly less than every non-nil value,
//! which is observable through `sort`.

use std::cmp::Ordering;

use super::Vm;
use crate::{
    bytecode::op::cmpop_from_code,
    errors::{ErrKind, RunError, RunResult},
    heap::{Heap, HeapData},
    types::decimal::Decimal,
    value::{Numeric, Value, as_numeric, eq_values, type_name},
};

impl Vm<'_> {
    pub(super) fn exec_compare(&mut self, tag: u8) -> RunResult<()> {
        let op = cmpop_from_code(tag).ok_or_else(|| RunError::internal("unknown comparison tag"))?;
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        use crate::ast::CmpOp;
        let result = match op {
            CmpOp::Eq => Value::Bool(eq_values(&self.heap, lhs, rhs)?),
            CmpOp::Ne => Value::Bool(!eq_values(&self.heap, lhs, rhs)?),
            ordering_op => {
                let Some(ordering) = compare_values(&self.heap, lhs, rhs)? else {
                    return Err(ErrKind::invalid_operator(
                        ordering_op.token(),
                        type_name(lhs, &self.heap),
                        type_name(rhs, &self.heap),
                    ));
                };
                let truth = match ordering_op {
                    CmpOp::Lt => ordering == Ordering::Less,
                    CmpOp::Le => ordering != Ordering::Greater,
                    CmpOp::Gt => ordering == Ordering::Greater,
                    CmpOp::Ge => ordering != Ordering::Less,
                    CmpOp::Eq | CmpOp::Ne => unreachable!("handled above"),
                };
                Value::Bool(truth)
            }
        };
        self.push(result);
        Ok(())
    }
}

/// Total-order comparison where one is defined; `None` means the operands
/// are not orderable (incomparable kinds, NaN).
pub(crate) fn compare_values(heap: &Heap, lhs: Value, rhs: Value) -> RunResult<Option<Ordering>> {
    match (lhs.is_nil(), rhs.is_nil()) {
        (true, true) => return Ok(Some(Ordering::Equal)),
        (true, false) => return Ok(Some(Ordering::Less)),
        (false, true) => return Ok(Some(Ordering::Greater)),
        (false, false) => {}
    }
    if let (Some(a), Some(b)) = (as_numeric(lhs, heap), as_numeric(rhs, heap)) {
        return Ok(numeric_cmp(&a, &b));
    }
    if let (Value::Bool(a), Value::Bool(b)) = (lhs, rhs) {
        return Ok(Some(a.cmp(&b)));
    }
    if let (Value::Ref(a), Value::Ref(b)) = (lhs, rhs) {
        match (heap.get(a), heap.get(b)) {
            (HeapData::Str(x), HeapData::Str(y)) => return Ok(Some(x.cmp(y))),
            (HeapData::Bytes(x), HeapData::Bytes(y)) => return Ok(Some(x.cmp(y))),
            (HeapData::Array(x), HeapData::Array(y)) => {
                let (x, y) = (x.clone(), y.clone());
                for (item_a, item_b) in x.iter().zip(&y) {
                    match compare_values(heap, *item_a, *item_b)? {
                        Some(Ordering::Equal) => {}
                        other => return Ok(other),
                    }
                }
                return Ok(Some(x.len().cmp(&y.len())));
            }
            _ => {}
        }
    }
    Ok(None)
}

fn numeric_cmp(lhs: &Numeric, rhs: &Numeric) -> Option<Ordering> {
    use Numeric::{Decimal as Dec, Float, Int, Uint};
    match (lhs, rhs) {
        (Int(a), Int(b)) => Some(a.cmp(b)),
        (Uint(a), Uint(b)) => Some(a.cmp(b)),
        (Float(a), Float(b)) => a.partial_cmp(b),
        (Dec(a), Dec(b)) => Some(a.cmp(b)),
        (Int(a), Uint(b)) => Some(cmp_int_uint(*a, *b)),
        (Uint(a), Int(b)) => Some(cmp_int_uint(*b, *a).reverse()),
        (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
        (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
        (Uint(a), Float(b)) => (*a as f64).partial_cmp(b),
        (Float(a), Uint(b)) => a.partial_cmp(&(*b as f64)),
        (Dec(a), Int(b)) => Some(a.cmp(&Decimal::from_i64(*b))),
        (Int(a), Dec(b)) => Some(Decimal::from_i64(*a).cmp(b)),
        (Dec(a), Uint(b)) => Some(a.cmp(&Decimal::from_u64(*b))),
        (Uint(a), Dec(b)) => Some(Decimal::from_u64(*a).cmp(b)),
        (Dec(a), Float(b)) => Decimal::from_f64(*b).map(|b| a.cmp(&b)),
        (Float(a), Dec(b)) => Decimal::from_f64(*a).map(|a| a.cmp(b)),
    }
}

fn cmp_int_uint(a: i64, b: u64) -> Ordering {
    if a < 0 {
        Ordering::Less
    } else {
        (a as u64).cmp(&b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;

    #[test]
    fn nil_sorts_below_everything() {
        let heap = Heap::new();
        assert_eq!(compare_values(&heap, Value::Nil, Value::Int(-5)).unwrap(), Some(Ordering::Less));
        assert_eq!(compare_values(&heap, Value::Int(0), Value::Nil).unwrap(), Some(Ordering::Greater));
        assert_eq!(compare_values(&heap, Value::Nil, Value::Nil).unwrap(), Some(Ordering::Equal));
    }

    #[test]
    fn numeric_widening_orders_across_kinds() {
        let heap = Heap::new();
        assert_eq!(
            compare_values(&heap, Value::Int(2), Value::Float(2.5)).unwrap(),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_values(&heap, Value::Int(-1), Value::Uint(0)).unwrap(),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_values(&heap, Value::Char('a'), Value::Int(97)).unwrap(),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn strings_compare_lexicographically() {
        let mut heap = Heap::new();
        let a = heap.alloc_str("apple");
        let b = heap.alloc_str("banana");
        assert_eq!(compare_values(&heap, a, b).unwrap(), Some(Ordering::Less));
    }

    #[test]
    fn incomparable_kinds_have_no_order() {
        let mut heap = Heap::new();
        let s = heap.alloc_str("x");
        assert_eq!(compare_values(&heap, s, Value::Int(1)).unwrap(), None);
    }
}
