//! Opcode definitions.
//!
//! Every opcode is one byte followed by 0-2 operands of fixed width. Branch
//! offsets are 2-byte relative values with 4-byte wide twins; the builder
//! picks the narrow encoding for backward jumps that fit and the wide one for
//! patched forward jumps. Offsets are relative to the address after the
//! operand.

use strum::{FromRepr, IntoStaticStr};

use crate::ast::{BinOp, CmpOp, UnOp};

/// One VM instruction tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    Pop,
    Dup,
    Swap,

    // Constants and primitives.
    /// u16: constant pool index.
    LoadConst,
    LoadNil,
    LoadTrue,
    LoadFalse,
    /// i8: small integer literal.
    LoadSmallInt,

    // Locals (operand-stack slots at the frame base).
    /// u8: slot.
    LoadLocal,
    /// u8: slot.
    StoreLocal,

    // Globals.
    /// u16: global table slot.
    LoadGlobal,
    /// u16: global table slot.
    StoreGlobal,

    /// u8 tag, u8 index: builtin registry entry.
    LoadBuiltin,

    // Cells: the frame's own cells and its captured free cells. All four
    // read/write indirectly through the heap cell.
    /// u8: own-cell index.
    LoadCell,
    /// u8: own-cell index.
    StoreCell,
    /// u8: free index.
    LoadFree,
    /// u8: free index.
    StoreFree,
    /// u8: own-cell index. Pushes the cell reference itself for capture.
    PushCellRef,
    /// u8: free index. Pushes the captured cell reference for re-capture.
    PushFreeRef,

    // Arithmetic, logic, comparison. The operand names the source token.
    /// u8: binary operator tag.
    BinaryOp,
    /// u8: unary operator tag.
    UnaryOp,
    /// u8: comparison operator tag.
    Compare,

    // Composite constructors.
    /// u16: element count.
    MakeArray,
    /// u16: pair count (stack holds key, value, ...).
    MakeDict,
    MakeKeyValue,
    /// u16: pair count.
    MakeKvArray,

    // Indexing and selection.
    IndexGet,
    IndexSet,
    /// u8 flags: bit0 = has low, bit1 = has high.
    Slice,
    /// u16: constant pool index of the member name.
    Selector,

    // Control flow.
    /// i16 relative offset.
    Jump,
    /// i32 relative offset.
    JumpW,
    /// i16: jump when the popped value is falsy.
    JumpIfFalse,
    /// i32 wide twin.
    JumpIfFalseW,
    /// i16: jump when the popped value is truthy.
    JumpIfTrue,
    /// i32 wide twin.
    JumpIfTrueW,
    /// i16: jump when the popped value is nil.
    JumpIfNil,
    /// i32 wide twin.
    JumpIfNilW,

    // Calls. Stack: callee, positionals..., then a KeyValueArray when the
    // named bit is set. argc counts positional operands before splat
    // expansion.
    /// u8 argc, u8 flags (bit0 = splat, bit1 = named args present).
    Call,
    /// u8 argc, u8 flags. Reuses the current frame.
    TailCall,
    Return,
    /// u8: pack the top n values into an array and return it.
    ReturnMulti,

    /// u16 function index, u8 free count. Pops the top N cell references.
    MakeClosure,
    /// Pops an overload closure and a base callable; appends the overload to
    /// the base's method table and pushes the base back.
    AddCallMethod,

    // Iteration.
    IterInit,
    /// i32: relative jump target when the iterator is exhausted (the
    /// iterator is popped on that path). Otherwise pushes key then value.
    IterNext,
    IterClose,

    // Errors.
    Throw,
    /// u32 catch offset, u32 finally offset (`u32::MAX` = absent).
    TryBegin,
    TryEnd,
    /// Rethrows the error the unwinder parked before entering the finally
    /// block, if any.
    FinallyEnd,
    /// u8 argc, u8 flags: like Call, but records the call on the frame's
    /// defer list instead of invoking it.
    Defer,

    // Modules and reserved identifiers.
    /// u16: module table index.
    Import,
    /// u8: 0 = __name__, 1 = __file__, 2 = __is_module__.
    LoadModInfo,
    /// u8: 0 = __args__, 1 = __named_args__, 2 = __callee__.
    LoadCallInfo,
}

impl Opcode {
    /// Mnemonic for tracing and disassembly.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }
}

// Operator tags are encoded as the operand byte of BinaryOp/UnaryOp/Compare.

pub(crate) fn binop_code(op: BinOp) -> u8 {
    match op {
        BinOp::Add => 0,
        BinOp::Sub => 1,
        BinOp::Mul => 2,
        BinOp::Div => 3,
        BinOp::Rem => 4,
        BinOp::BitAnd => 5,
        BinOp::BitOr => 6,
        BinOp::BitXor => 7,
        BinOp::Shl => 8,
        BinOp::Shr => 9,
    }
}

pub(crate) fn binop_from_code(code: u8) -> Option<BinOp> {
    Some(match code {
        0 => BinOp::Add,
        1 => BinOp::Sub,
        2 => BinOp::Mul,
        3 => BinOp::Div,
        4 => BinOp::Rem,
        5 => BinOp::BitAnd,
        6 => BinOp::BitOr,
        7 => BinOp::BitXor,
        8 => BinOp::Shl,
        9 => BinOp::Shr,
        _ => return None,
    })
}

pub(crate) fn cmpop_code(op: CmpOp) -> u8 {
    match op {
        CmpOp::Eq => 0,
        CmpOp::Ne => 1,
        CmpOp::Lt => 2,
        CmpOp::Le => 3,
        CmpOp::Gt => 4,
        CmpOp::Ge => 5,
    }
}

pub(crate) fn cmpop_from_code(code: u8) -> Option<CmpOp> {
    Some(match code {
        0 => CmpOp::Eq,
        1 => CmpOp::Ne,
        2 => CmpOp::Lt,
        3 => CmpOp::Le,
        4 => CmpOp::Gt,
        5 => CmpOp::Ge,
        _ => return None,
    })
}

pub(crate) fn unop_code(op: UnOp) -> u8 {
    match op {
        UnOp::Neg => 0,
        UnOp::Not => 1,
        UnOp::BitNot => 2,
    }
}

pub(crate) fn unop_from_code(code: u8) -> Option<UnOp> {
    Some(match code {
        0 => UnOp::Neg,
        1 => UnOp::Not,
        2 => UnOp::BitNot,
        _ => return None,
    })
}

/// Call-site flag: the last positional argument expands.
pub(crate) const CALL_FLAG_SPLAT: u8 = 0b01;
/// Call-site flag: a KeyValueArray of named arguments is on top.
pub(crate) const CALL_FLAG_NAMED: u8 = 0b10;

/// Slice flag: a low bound was pushed.
pub(crate) const SLICE_FLAG_LOW: u8 = 0b01;
/// Slice flag: a high bound was pushed.
pub(crate) const SLICE_FLAG_HIGH: u8 = 0b10;

/// Absent offset marker in TryBegin operands.
pub(crate) const NO_OFFSET: u32 = u32::MAX;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_bytes_round_trip() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_repr(byte) {
                assert_eq!(op as u8, byte);
            }
        }
        assert_eq!(Opcode::from_repr(Opcode::LoadConst as u8), Some(Opcode::LoadConst));
    }

    #[test]
    fn operator_tags_round_trip() {
        for op in [BinOp::Add, BinOp::Shr] {
            assert_eq!(binop_from_code(binop_code(op)), Some(op));
        }
        for op in [CmpOp::Eq, CmpOp::Ge] {
            assert_eq!(cmpop_from_code(cmpop_code(op)), Some(op));
        }
        for op in [UnOp::Neg, UnOp::BitNot] {
            assert_eq!(unop_from_code(unop_code(op)), Some(op));
        }
    }
}
