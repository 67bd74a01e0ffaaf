//! Binary and unary operator evaluation.
//!
//! Dispatch is left-biased with the symmetric pairs handled for commutative
//! operators; numeric kinds widen (Bool coerces to 0/1 in arithmetic, Char
//! shifts by integers); strings concatenate with any right operand. When no
//! built-in rule applies and a well-known operator callable is registered
//! for the token, the operands dispatch through its method table, which is
//! how user code customizes operators.

use num_traits::ToPrimitive;

use super::Vm;
use crate::{
    ast::{BinOp, UnOp},
    bytecode::op::{binop_from_code, unop_from_code},
    errors::{ErrKind, RunError, RunResult},
    heap::HeapData,
    types::{Dict, KeyValue, KeyValueArray, decimal::Decimal},
    value::{Numeric, Value, is_falsy, to_display, type_name},
};

impl Vm<'_> {
    pub(super) fn exec_binary(&mut self, tag: u8) -> RunResult<()> {
        let op = binop_from_code(tag).ok_or_else(|| RunError::internal("unknown binary operator tag"))?;
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let value = self.eval_binary(op, lhs, rhs)?;
        self.push(value);
        Ok(())
    }

    pub(super) fn exec_unary(&mut self, tag: u8) -> RunResult<()> {
        let op = unop_from_code(tag).ok_or_else(|| RunError::internal("unknown unary operator tag"))?;
        let value = self.pop()?;
        let result = self.eval_unary(op, value)?;
        self.push(result);
        Ok(())
    }

    pub(crate) fn eval_binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> RunResult<Value> {
        // Char arithmetic keeps its kind against integer deltas.
        if let Some(value) = self.char_arithmetic(op, lhs, rhs)? {
            return Ok(value);
        }
        // String concatenation: string on the left takes any right operand;
        // a char on the left of a string is itself string-convertible.
        if op == BinOp::Add {
            if let Some(text) = self.heap.str_of(lhs).map(str::to_owned) {
                let rendered = to_display(&self.heap, rhs, false)?;
                return Ok(self.heap.alloc_str(format!("{text}{rendered}")));
            }
            if let (Value::Char(c), Some(text)) = (lhs, self.heap.str_of(rhs).map(str::to_owned)) {
                return Ok(self.heap.alloc_str(format!("{c}{text}")));
            }
            // A string on the right of a non-convertible left operand is a
            // type error, not an operator error.
            if self.heap.str_of(rhs).is_some() {
                return Err(ErrKind::type_error(format!(
                    "cannot concatenate '{}' and 'str'",
                    type_name(lhs, &self.heap)
                )));
            }
        }
        if let Some(value) = self.composite_binary(op, lhs, rhs)? {
            return Ok(value);
        }
        if let (Some(a), Some(b)) = (self.arith_view(lhs), self.arith_view(rhs)) {
            return self.numeric_binary(op, a, b);
        }
        // User-overloadable path: route through the operator callable.
        if let Some(callable) = self.operator_callable(op) {
            return self.call_value_nested(callable, vec![lhs, rhs], None);
        }
        Err(ErrKind::invalid_operator(
            op.token(),
            type_name(lhs, &self.heap),
            type_name(rhs, &self.heap),
        ))
    }

    pub(crate) fn eval_unary(&mut self, op: UnOp, value: Value) -> RunResult<Value> {
        match (op, value) {
            (UnOp::Not, v) => Ok(Value::Bool(is_falsy(v, &self.heap))),
            (UnOp::Neg, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
            (UnOp::Neg, Value::Uint(u)) => i64::try_from(u)
                .map(|i| Value::Int(-i))
                .map_err(|_| ErrKind::type_error("uint too large to negate")),
            (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnOp::Neg, Value::Bool(b)) => Ok(Value::Int(-i64::from(b))),
            (UnOp::Neg, Value::Ref(id)) => match self.heap.get(id) {
                HeapData::Decimal(d) => {
                    let negated = d.neg();
                    Ok(self.heap.alloc_value(HeapData::Decimal(negated)))
                }
                other => Err(ErrKind::InvalidOperatorError.err(format!("cannot negate '{}'", other.type_name()))),
            },
            (UnOp::BitNot, Value::Int(i)) => Ok(Value::Int(!i)),
            (UnOp::BitNot, Value::Uint(u)) => Ok(Value::Uint(!u)),
            (UnOp::BitNot, Value::Bool(b)) => Ok(Value::Int(!i64::from(b))),
            (op, v) => Err(ErrKind::InvalidOperatorError.err(format!(
                "unsupported operand for {}: '{}'",
                op.token(),
                type_name(v, &self.heap)
            ))),
        }
    }

    /// The well-known callable backing `op`, if user code registered one via
    /// the `binaryOperator` builtin.
    fn operator_callable(&self, op: BinOp) -> Option<Value> {
        self.operator_callables
            .get(&crate::bytecode::op::binop_code(op))
            .copied()
    }

    /// Returns (creating on first use) the operator callable for `op`.
    pub(crate) fn operator_callable_entry(&mut self, op: BinOp) -> Value {
        let tag = crate::bytecode::op::binop_code(op);
        if let Some(existing) = self.operator_callables.get(&tag) {
            return *existing;
        }
        let token = op.token();
        let base = crate::types::HostFunc::new(token, move |_call| {
            Err(crate::errors::RuntimeError::new(
                "TypeError",
                format!("no method matches operator {token}"),
            ))
        });
        let value = self.heap.alloc_value(HeapData::HostFunc(crate::types::HostFuncObj {
            func: base,
            methods: None,
        }));
        self.operator_callables.insert(tag, value);
        value
    }

    fn char_arithmetic(&mut self, op: BinOp, lhs: Value, rhs: Value) -> RunResult<Option<Value>> {
        let result = match (op, lhs, rhs) {
            (BinOp::Add, Value::Char(c), Value::Int(i)) | (BinOp::Add, Value::Int(i), Value::Char(c)) => {
                Some(shift_char(c, i)?)
            }
            (BinOp::Sub, Value::Char(c), Value::Int(i)) => Some(shift_char(c, -i)?),
            (BinOp::Sub, Value::Char(a), Value::Char(b)) => {
                Some(Value::Int(i64::from(u32::from(a)) - i64::from(u32::from(b))))
            }
            _ => None,
        };
        Ok(result)
    }

    /// Operator rules for composite operands; `None` falls through.
    fn composite_binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> RunResult<Option<Value>> {
        let Value::Ref(lid) = lhs else {
            return Ok(None);
        };
        match (op, self.heap.get(lid).clone()) {
            // Bytes concatenation.
            (BinOp::Add, HeapData::Bytes(mut a)) => {
                if let Value::Ref(rid) = rhs
                    && let HeapData::Bytes(b) = self.heap.get(rid)
                {
                    a.extend_from_slice(b);
                    return Ok(Some(self.heap.alloc_value(HeapData::Bytes(a))));
                }
                Ok(None)
            }
            // Array + appends an element, a sub-array, a dict's items, or a
            // KeyValueArray's pairs; always a new array.
            (BinOp::Add, HeapData::Array(mut items)) => {
                match rhs {
                    Value::Ref(rid) => match self.heap.get(rid).clone() {
                        HeapData::Array(other) => items.extend(other),
                        HeapData::Dict(dict) => {
                            for key in dict.sorted_keys() {
                                let value = dict.get(&key).unwrap_or(Value::Nil);
                                let key = self.heap.alloc_str(key);
                                let kv = self.heap.alloc_value(HeapData::KeyValue(KeyValue { key, value }));
                                items.push(kv);
                            }
                        }
                        HeapData::KeyValueArray(kva) => {
                            for pair in kva.pairs {
                                let kv = self.heap.alloc_value(HeapData::KeyValue(pair));
                                items.push(kv);
                            }
                        }
                        _ => items.push(rhs),
                    },
                    other => items.push(other),
                }
                Ok(Some(self.heap.alloc_array(items)))
            }
            // Dict merge and key removal.
            (BinOp::Add, HeapData::Dict(mut dict)) => match rhs {
                Value::Ref(rid) => match self.heap.get(rid).clone() {
                    HeapData::Dict(other) => {
                        for (key, value) in other.map {
                            dict.insert(key, value);
                        }
                        Ok(Some(self.heap.alloc_dict(dict)))
                    }
                    HeapData::KeyValueArray(kva) => {
                        for pair in kva.pairs {
                            let key = self.key_string(pair.key)?;
                            dict.insert(key, pair.value);
                        }
                        Ok(Some(self.heap.alloc_dict(dict)))
                    }
                    _ => Ok(None),
                },
                _ => Ok(None),
            },
            (BinOp::Sub, HeapData::Dict(mut dict)) => match rhs {
                Value::Ref(rid) => match self.heap.get(rid).clone() {
                    HeapData::Array(keys) => {
                        for key in keys {
                            let key = self.key_string(key)?;
                            dict.remove(&key);
                        }
                        Ok(Some(self.heap.alloc_dict(dict)))
                    }
                    HeapData::Dict(other) => {
                        for key in other.map.keys() {
                            dict.remove(key);
                        }
                        Ok(Some(self.heap.alloc_dict(dict)))
                    }
                    HeapData::KeyValueArray(kva) => {
                        for pair in kva.pairs {
                            let key = self.key_string(pair.key)?;
                            dict.remove(&key);
                        }
                        Ok(Some(self.heap.alloc_dict(dict)))
                    }
                    _ => Ok(None),
                },
                _ => Ok(None),
            },
            // KeyValueArray concatenation, also used by named-splat merging.
            (BinOp::Add, HeapData::KeyValueArray(mut kva)) => match rhs {
                Value::Ref(rid) => match self.heap.get(rid).clone() {
                    HeapData::KeyValueArray(other) => {
                        kva.pairs.extend(other.pairs);
                        Ok(Some(self.heap.alloc_value(HeapData::KeyValueArray(kva))))
                    }
                    HeapData::Dict(dict) => {
                        for key in dict.sorted_keys() {
                            let value = dict.get(&key).unwrap_or(Value::Nil);
                            let key = self.heap.alloc_str(key);
                            kva.push(key, value);
                        }
                        Ok(Some(self.heap.alloc_value(HeapData::KeyValueArray(kva))))
                    }
                    HeapData::KeyValue(pair) => {
                        kva.pairs.push(pair);
                        Ok(Some(self.heap.alloc_value(HeapData::KeyValueArray(kva))))
                    }
                    _ => Ok(None),
                },
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Numeric view for arithmetic: Bool coerces to 0/1 here (but not in
    /// equality).
    fn arith_view(&self, value: Value) -> Option<Numeric> {
        match value {
            Value::Bool(b) => Some(Numeric::Int(i64::from(b))),
            other => crate::value::as_numeric(other, &self.heap),
        }
    }

    fn numeric_binary(&mut self, op: BinOp, lhs: Numeric, rhs: Numeric) -> RunResult<Value> {
        use Numeric::{Decimal as Dec, Float, Int, Uint};
        // Widen to the stronger kind: decimal > float > uint > int.
        match (lhs, rhs) {
            (Dec(a), b) => {
                let b = to_decimal(b);
                self.decimal_binary(op, &a, &b)
            }
            (a, Dec(b)) => {
                let a = to_decimal(a);
                self.decimal_binary(op, &a, &b)
            }
            (Float(a), b) => float_binary(op, a, to_f64(&b)),
            (a, Float(b)) => float_binary(op, to_f64(&a), b),
            (Uint(a), b) => uint_binary(op, a, to_u64(&b)),
            (a, Uint(b)) => uint_binary(op, to_u64(&a), b),
            (Int(a), Int(b)) => int_binary(op, a, b),
        }
    }

    fn decimal_binary(&mut self, op: BinOp, a: &Decimal, b: &Decimal) -> RunResult<Value> {
        let result = match op {
            BinOp::Add => a.add(b),
            BinOp::Sub => a.sub(b),
            BinOp::Mul => a.mul(b),
            BinOp::Div => a
                .div(b)
                .ok_or_else(|| ErrKind::ZeroDivisionError.err("decimal division by zero"))?,
            BinOp::Rem => a
                .rem(b)
                .ok_or_else(|| ErrKind::ZeroDivisionError.err("decimal division by zero"))?,
            other => {
                return Err(ErrKind::InvalidOperatorError.err(format!(
                    "operator {} is not defined for decimals",
                    other.token()
                )));
            }
        };
        Ok(self.heap.alloc_value(HeapData::Decimal(result)))
    }
}

fn shift_char(c: char, delta: i64) -> RunResult<Value> {
    let shifted = i64::from(u32::from(c)) + delta;
    u32::try_from(shifted)
        .ok()
        .and_then(char::from_u32)
        .map(Value::Char)
        .ok_or_else(|| ErrKind::type_error("char arithmetic out of range"))
}

fn to_decimal(n: Numeric) -> Decimal {
    match n {
        Numeric::Int(i) => Decimal::from_i64(i),
        Numeric::Uint(u) => Decimal::from_u64(u),
        Numeric::Float(f) => Decimal::from_f64(f).unwrap_or_else(Decimal::zero),
        Numeric::Decimal(d) => d,
    }
}

fn to_f64(n: &Numeric) -> f64 {
    match n {
        Numeric::Int(i) => *i as f64,
        Numeric::Uint(u) => *u as f64,
        Numeric::Float(f) => *f,
        Numeric::Decimal(d) => d.to_f64(),
    }
}

fn to_u64(n: &Numeric) -> u64 {
    match n {
        Numeric::Int(i) => *i as u64,
        Numeric::Uint(u) => *u,
        Numeric::Float(f) => f.to_u64().unwrap_or(0),
        Numeric::Decimal(d) => d.to_i64().unwrap_or(0) as u64,
    }
}

fn int_binary(op: BinOp, a: i64, b: i64) -> RunResult<Value> {
    let value = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(ErrKind::ZeroDivisionError.err("integer division by zero"));
            }
            a.wrapping_div(b)
        }
        BinOp::Rem => {
            if b == 0 {
                return Err(ErrKind::ZeroDivisionError.err("integer division by zero"));
            }
            a.wrapping_rem(b)
        }
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl => shift_amount(b).map(|s| a.wrapping_shl(s))?,
        BinOp::Shr => shift_amount(b).map(|s| a.wrapping_shr(s))?,
    };
    Ok(Value::Int(value))
}

fn uint_binary(op: BinOp, a: u64, b: u64) -> RunResult<Value> {
    let value = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(ErrKind::ZeroDivisionError.err("integer division by zero"));
            }
            a / b
        }
        BinOp::Rem => {
            if b == 0 {
                return Err(ErrKind::ZeroDivisionError.err("integer division by zero"));
            }
            a % b
        }
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl => shift_amount(b as i64).map(|s| a.wrapping_shl(s))?,
        BinOp::Shr => shift_amount(b as i64).map(|s| a.wrapping_shr(s))?,
    };
    Ok(Value::Uint(value))
}

fn float_binary(op: BinOp, a: f64, b: f64) -> RunResult<Value> {
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
        other => {
            return Err(ErrKind::InvalidOperatorError.err(format!(
                "operator {} is not defined for floats",
                other.token()
            )));
        }
    };
    Ok(Value::Float(value))
}

fn shift_amount(amount: i64) -> RunResult<u32> {
    u32::try_from(amount).map_err(|_| ErrKind::InvalidOperatorError.err("negative shift amount"))
}
