//! Ahead-of-time instruction decoding over a whole code region.
//!
//! The hot-path dispatcher in [`crate::context`] reads operands directly off
//! its own [`crate::reader::Reader`] one opcode at a time; this module shares
//! the same opcode→operand-shape knowledge (via [`decode_operand`]) so that
//! external tooling can walk an entire code region without driving the VM.

use crate::error::ReaderError;
use crate::opcode::Opcode;
use crate::reader::Reader;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    InitStack { arg_count: u8, local_count: u8 },
    Addr(u32),
    SyscallId(u16),
    I8(i8),
    I16(i16),
    I32(i32),
    F32(f32),
    Str(String),
    GlobalId(u16),
    LocalId(i8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub address: u32,
    pub opcode: Opcode,
    pub operand: Operand,
}

/// Reads the operand payload for `opcode` from `reader`, which must be
/// positioned immediately after the opcode byte itself.
pub fn decode_operand(opcode: Opcode, reader: &mut Reader) -> Result<Operand, ReaderError> {
    use Opcode::*;
    Ok(match opcode {
        Nop | PushNil | PushTrue | PushTop | PushReturn | Ret | RetV | Neg | Add | Sub | Mul
        | Div | Mod | BitTest | And | Or | SetEq | SetNe | SetGt | SetLe | SetLt | SetGe => {
            Operand::None
        }
        InitStack => Operand::InitStack {
            arg_count: reader.read_u8()?,
            local_count: reader.read_u8()?,
        },
        Call | Jmp | Jz => Operand::Addr(reader.read_u32()?),
        Syscall => Operand::SyscallId(reader.read_u16()?),
        PushI8 => Operand::I8(reader.read_i8()?),
        PushI16 => Operand::I16(reader.read_i16()?),
        PushI32 => Operand::I32(reader.read_i32()?),
        PushF32 => Operand::F32(reader.read_f32()?),
        PushString => Operand::Str(reader.read_string()?),
        PushGlobal | PopGlobal | PushGlobalTable | PopGlobalTable => {
            Operand::GlobalId(reader.read_u16()?)
        }
        PushLocal | PopLocal | PushLocalTable | PopLocalTable => {
            Operand::LocalId(reader.read_i8()?)
        }
    })
}

/// One decoded instruction, or `None` once `end` has been reached. Unknown
/// opcode bytes yield `Operand::None` and advance one byte, tolerating
/// garbage the way ahead-of-time listings must.
fn decode_one(reader: &mut Reader, end: usize) -> Option<Result<Instruction, ReaderError>> {
    if reader.position() >= end {
        return None;
    }
    let address = reader.position() as u32;
    let raw = match reader.read_u8() {
        Ok(b) => b,
        Err(e) => return Some(Err(e)),
    };
    match Opcode::try_from(raw) {
        Ok(opcode) => match decode_operand(opcode, reader) {
            Ok(operand) => Some(Ok(Instruction {
                address,
                opcode,
                operand,
            })),
            Err(e) => Some(Err(e)),
        },
        Err(_) => Some(Ok(Instruction {
            address,
            opcode: Opcode::Nop,
            operand: Operand::None,
        })),
    }
}

/// Iterates `(address, opcode, operand)` tuples over `[4, metadata_offset)`,
/// the code region, for disassembly-style tooling.
pub struct InstructionStream<'a> {
    reader: &'a mut Reader,
    end: usize,
}

impl<'a> InstructionStream<'a> {
    pub fn new(reader: &'a mut Reader, end: usize) -> Self {
        Self { reader, end }
    }
}

impl<'a> Iterator for InstructionStream<'a> {
    type Item = Result<Instruction, ReaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        decode_one(self.reader, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hcb_nls::{Decoder, Encoding};
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_a_small_program() {
        // InitStack 0 0 ; PushI32 7 ; Add(invalid here, just checking shape) ; Ret
        let mut bytes = vec![Opcode::InitStack as u8, 0, 0];
        bytes.push(Opcode::PushI32 as u8);
        bytes.extend_from_slice(&7i32.to_le_bytes());
        bytes.push(Opcode::Ret as u8);
        let end = bytes.len();
        let mut reader = Reader::new(bytes, Decoder::new(Encoding::Utf8));
        let stream = InstructionStream::new(&mut reader, end);
        let decoded: Vec<_> = stream.map(|r| r.unwrap()).collect();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].opcode, Opcode::InitStack);
        assert_eq!(
            decoded[0].operand,
            Operand::InitStack {
                arg_count: 0,
                local_count: 0
            }
        );
        assert_eq!(decoded[1].opcode, Opcode::PushI32);
        assert_eq!(decoded[1].operand, Operand::I32(7));
        assert_eq!(decoded[2].opcode, Opcode::Ret);
    }

    #[test]
    fn unknown_opcode_tolerated_by_stream() {
        let bytes = vec![250u8];
        let end = bytes.len();
        let mut reader = Reader::new(bytes, Decoder::new(Encoding::Utf8));
        let stream = InstructionStream::new(&mut reader, end);
        let decoded: Vec<_> = stream.map(|r| r.unwrap()).collect();
        assert_eq!(decoded.len(), 1);
    }
}
