//! Builder for emitting bytecode during compilation.
//!
//! Handles operand encoding, constant-pool dedup, forward jumps with
//! patching, and source-location tracking. Forward jumps reserve the wide
//! encoding; backward jumps use the narrow one when the distance fits.

use ahash::AHashMap;

use super::{
    code::{Code, Constant, LocationEntry},
    op::Opcode,
};
use crate::ast::Pos;

/// Failures the builder can hit; the compiler maps them onto compile errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodeError {
    TooManyConstants,
    JumpOutOfRange,
}

impl std::fmt::Display for CodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyConstants => f.write_str("too many constants in one function"),
            Self::JumpOutOfRange => f.write_str("jump offset out of range"),
        }
    }
}

/// A reserved forward jump awaiting its target.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JumpSite {
    operand_at: usize,
}

/// A `TryBegin` awaiting its handler offsets.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TryBeginSite {
    operand_at: usize,
}

/// Structurally-deduplicated key for the constant pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Int(i64),
    Uint(u64),
    /// Bit pattern, so 0.0 and -0.0 stay distinct constants.
    Float(u64),
    Char(char),
    Str(String),
    Bytes(Vec<u8>),
    Decimal(String),
    Func(u32),
}

impl ConstKey {
    fn of(constant: &Constant) -> Self {
        match constant {
            Constant::Int(i) => Self::Int(*i),
            Constant::Uint(u) => Self::Uint(*u),
            Constant::Float(f) => Self::Float(f.to_bits()),
            Constant::Char(c) => Self::Char(*c),
            Constant::Str(s) => Self::Str(s.clone()),
            Constant::Bytes(b) => Self::Bytes(b.clone()),
            Constant::Decimal(d) => Self::Decimal(d.to_string()),
            Constant::Func(id) => Self::Func(id.0),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct CodeBuilder {
    bytecode: Vec<u8>,
    constants: Vec<Constant>,
    const_index: AHashMap<ConstKey, u16>,
    locations: Vec<LocationEntry>,
    current_pos: Option<Pos>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source position recorded for subsequently emitted
    /// instructions.
    pub fn set_pos(&mut self, pos: Pos) {
        self.current_pos = Some(pos);
    }

    pub fn offset(&self) -> usize {
        self.bytecode.len()
    }

    fn start_instruction(&mut self) {
        if let Some(pos) = self.current_pos {
            let record = match self.locations.last() {
                Some(last) => last.line != pos.line || last.column != pos.column,
                None => true,
            };
            if record {
                self.locations.push(LocationEntry {
                    offset: self.bytecode.len() as u32,
                    line: pos.line,
                    column: pos.column,
                });
            }
        }
    }

    pub fn emit(&mut self, op: Opcode) {
        self.start_instruction();
        self.bytecode.push(op as u8);
    }

    pub fn emit_u8(&mut self, op: Opcode, operand: u8) {
        self.emit(op);
        self.bytecode.push(operand);
    }

    pub fn emit_u8_u8(&mut self, op: Opcode, a: u8, b: u8) {
        self.emit(op);
        self.bytecode.push(a);
        self.bytecode.push(b);
    }

    pub fn emit_i8(&mut self, op: Opcode, operand: i8) {
        self.emit(op);
        self.bytecode.push(operand.to_le_bytes()[0]);
    }

    pub fn emit_u16(&mut self, op: Opcode, operand: u16) {
        self.emit(op);
        self.bytecode.extend_from_slice(&operand.to_le_bytes());
    }

    pub fn emit_u16_u8(&mut self, op: Opcode, a: u16, b: u8) {
        self.emit(op);
        self.bytecode.extend_from_slice(&a.to_le_bytes());
        self.bytecode.push(b);
    }

    /// Adds a constant, reusing any structurally identical entry.
    pub fn add_constant(&mut self, constant: Constant) -> Result<u16, CodeError> {
        let key = ConstKey::of(&constant);
        if let Some(&index) = self.const_index.get(&key) {
            return Ok(index);
        }
        let index = u16::try_from(self.constants.len()).map_err(|_| CodeError::TooManyConstants)?;
        self.constants.push(constant);
        self.const_index.insert(key, index);
        Ok(index)
    }

    /// The wide twin used for patched forward jumps.
    fn wide_of(op: Opcode) -> Opcode {
        match op {
            Opcode::Jump => Opcode::JumpW,
            Opcode::JumpIfFalse => Opcode::JumpIfFalseW,
            Opcode::JumpIfTrue => Opcode::JumpIfTrueW,
            Opcode::JumpIfNil => Opcode::JumpIfNilW,
            other => other,
        }
    }

    /// Emits a forward jump with a 4-byte placeholder; patch it once the
    /// target is known. `IterNext` is accepted here too (its operand is the
    /// exhaustion target).
    pub fn emit_jump(&mut self, op: Opcode) -> JumpSite {
        self.emit(Self::wide_of(op));
        let operand_at = self.bytecode.len();
        self.bytecode.extend_from_slice(&0i32.to_le_bytes());
        JumpSite { operand_at }
    }

    /// Points a reserved forward jump at the current offset.
    pub fn patch_jump(&mut self, site: JumpSite) -> Result<(), CodeError> {
        let from = site.operand_at + 4;
        let distance = self.bytecode.len() as i64 - from as i64;
        let offset = i32::try_from(distance).map_err(|_| CodeError::JumpOutOfRange)?;
        self.bytecode[site.operand_at..site.operand_at + 4].copy_from_slice(&offset.to_le_bytes());
        Ok(())
    }

    /// Emits a backward jump to `target`, choosing the narrow encoding when
    /// the distance fits.
    pub fn emit_loop(&mut self, op: Opcode, target: usize) -> Result<(), CodeError> {
        let narrow_from = self.bytecode.len() as i64 + 3;
        let narrow = target as i64 - narrow_from;
        if let Ok(offset) = i16::try_from(narrow) {
            self.emit(op);
            self.bytecode.extend_from_slice(&offset.to_le_bytes());
            return Ok(());
        }
        let wide_from = self.bytecode.len() as i64 + 5;
        let offset = i32::try_from(target as i64 - wide_from).map_err(|_| CodeError::JumpOutOfRange)?;
        self.emit(Self::wide_of(op));
        self.bytecode.extend_from_slice(&offset.to_le_bytes());
        Ok(())
    }

    /// Emits `TryBegin` with placeholder catch/finally offsets.
    pub fn emit_try_begin(&mut self) -> TryBeginSite {
        self.emit(Opcode::TryBegin);
        let operand_at = self.bytecode.len();
        self.bytecode.extend_from_slice(&crate::bytecode::op::NO_OFFSET.to_le_bytes());
        self.bytecode.extend_from_slice(&crate::bytecode::op::NO_OFFSET.to_le_bytes());
        TryBeginSite { operand_at }
    }

    /// Fills in the absolute catch and finally offsets of a `TryBegin`.
    pub fn patch_try_begin(&mut self, site: TryBeginSite, catch: Option<usize>, finally: Option<usize>) {
        let encode = |offset: Option<usize>| match offset {
            Some(at) => at as u32,
            None => crate::bytecode::op::NO_OFFSET,
        };
        self.bytecode[site.operand_at..site.operand_at + 4].copy_from_slice(&encode(catch).to_le_bytes());
        self.bytecode[site.operand_at + 4..site.operand_at + 8].copy_from_slice(&encode(finally).to_le_bytes());
    }

    pub fn build(self) -> Code {
        Code {
            bytecode: self.bytecode,
            constants: self.constants,
            locations: self.locations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_deduplicate_structurally() {
        let mut builder = CodeBuilder::new();
        let a = builder.add_constant(Constant::Str("x".to_owned())).unwrap();
        let b = builder.add_constant(Constant::Str("x".to_owned())).unwrap();
        let c = builder.add_constant(Constant::Int(1)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(builder.build().constants.len(), 2);
    }

    #[test]
    fn forward_jumps_patch_to_the_current_offset() {
        let mut builder = CodeBuilder::new();
        let site = builder.emit_jump(Opcode::JumpIfFalse);
        builder.emit(Opcode::LoadNil);
        builder.emit(Opcode::Pop);
        builder.patch_jump(site).unwrap();
        let code = builder.build();
        // Wide twin emitted, offset skips the two one-byte instructions.
        assert_eq!(code.bytecode[0], Opcode::JumpIfFalseW as u8);
        assert_eq!(i32::from_le_bytes(code.bytecode[1..5].try_into().unwrap()), 2);
    }

    #[test]
    fn backward_jumps_use_the_narrow_encoding_when_close() {
        let mut builder = CodeBuilder::new();
        let target = builder.offset();
        builder.emit(Opcode::Nop);
        builder.emit_loop(Opcode::Jump, target).unwrap();
        let code = builder.build();
        assert_eq!(code.bytecode[1], Opcode::Jump as u8);
        assert_eq!(i16::from_le_bytes(code.bytecode[2..4].try_into().unwrap()), -4);
    }

    #[test]
    fn locations_record_one_entry_per_position() {
        let mut builder = CodeBuilder::new();
        builder.set_pos(Pos::new(1, 0));
        builder.emit(Opcode::LoadNil);
        builder.emit(Opcode::Pop);
        builder.set_pos(Pos::new(2, 2));
        builder.emit(Opcode::LoadTrue);
        let code = builder.build();
        assert_eq!(code.locations.len(), 2);
        assert_eq!(code.location_at(2), Some(Pos::new(2, 2)));
    }
}
