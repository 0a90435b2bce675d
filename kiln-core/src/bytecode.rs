//! Bytecode model for the kiln stack machine.
//!
//! The stream is a flat byte sequence: each instruction is one opcode byte
//! followed by its operand bytes. Multi-byte operands are big-endian. Slot
//! indices, jump targets and builtin ids are 2-byte operands; immediates are
//! 1, 2, 4 or 8 bytes depending on the push width.
//!
//! Type-specialized families are addressed as base opcode + offset, with the
//! offset taken from an explicit width table (`StorageClass`, `ArithClass`)
//! rather than computed from the type on the fly.

use core::fmt;

use crate::error::CoreError;
use crate::types::{TypeInfo, TypeKind};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    PushB = 0x01,
    PushW = 0x02,
    PushDW = 0x03,
    PushQW = 0x04,

    LoadB = 0x10,
    LoadW = 0x11,
    LoadDW = 0x12,
    LoadQW = 0x13,
    LoadF32 = 0x14,
    LoadF64 = 0x15,

    StoreB = 0x20,
    StoreW = 0x21,
    StoreDW = 0x22,
    StoreQW = 0x23,
    StoreF32 = 0x24,
    StoreF64 = 0x25,

    DropB = 0x30,
    DropW = 0x31,
    DropDW = 0x32,
    DropQW = 0x33,
    DropF32 = 0x34,
    DropF64 = 0x35,

    AddDW = 0x40,
    AddQW = 0x41,
    AddF32 = 0x42,
    AddF64 = 0x43,
    SubDW = 0x44,
    SubQW = 0x45,
    SubF32 = 0x46,
    SubF64 = 0x47,
    MulDW = 0x48,
    MulQW = 0x49,
    MulF32 = 0x4A,
    MulF64 = 0x4B,
    DivDW = 0x4C,
    DivQW = 0x4D,
    DivF32 = 0x4E,
    DivF64 = 0x4F,

    /// Pop a 32-bit condition; jump to the absolute target when it is zero.
    JmpF = 0x50,
    /// Call a host builtin by id; arguments are already on the stack.
    Call = 0x51,
}

const ALL_OPCODES: &[Opcode] = &[
    Opcode::PushB,
    Opcode::PushW,
    Opcode::PushDW,
    Opcode::PushQW,
    Opcode::LoadB,
    Opcode::LoadW,
    Opcode::LoadDW,
    Opcode::LoadQW,
    Opcode::LoadF32,
    Opcode::LoadF64,
    Opcode::StoreB,
    Opcode::StoreW,
    Opcode::StoreDW,
    Opcode::StoreQW,
    Opcode::StoreF32,
    Opcode::StoreF64,
    Opcode::DropB,
    Opcode::DropW,
    Opcode::DropDW,
    Opcode::DropQW,
    Opcode::DropF32,
    Opcode::DropF64,
    Opcode::AddDW,
    Opcode::AddQW,
    Opcode::AddF32,
    Opcode::AddF64,
    Opcode::SubDW,
    Opcode::SubQW,
    Opcode::SubF32,
    Opcode::SubF64,
    Opcode::MulDW,
    Opcode::MulQW,
    Opcode::MulF32,
    Opcode::MulF64,
    Opcode::DivDW,
    Opcode::DivQW,
    Opcode::DivF32,
    Opcode::DivF64,
    Opcode::JmpF,
    Opcode::Call,
];

/// How an instruction's operand bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Immediate(usize),
    Slot,
    Target,
    Builtin,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        ALL_OPCODES.iter().copied().find(|op| *op as u8 == byte)
    }

    pub fn operand(self) -> OperandKind {
        use Opcode::*;
        match self {
            PushB => OperandKind::Immediate(1),
            PushW => OperandKind::Immediate(2),
            PushDW => OperandKind::Immediate(4),
            PushQW => OperandKind::Immediate(8),
            LoadB | LoadW | LoadDW | LoadQW | LoadF32 | LoadF64 | StoreB | StoreW | StoreDW
            | StoreQW | StoreF32 | StoreF64 => OperandKind::Slot,
            JmpF => OperandKind::Target,
            Call => OperandKind::Builtin,
            _ => OperandKind::None,
        }
    }

    /// Number of operand bytes following the opcode.
    pub fn operand_len(self) -> usize {
        match self.operand() {
            OperandKind::None => 0,
            OperandKind::Immediate(width) => width,
            OperandKind::Slot | OperandKind::Target | OperandKind::Builtin => 2,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            PushB => "PUSHB",
            PushW => "PUSHW",
            PushDW => "PUSHDW",
            PushQW => "PUSHQW",
            LoadB => "LOADB",
            LoadW => "LOADW",
            LoadDW => "LOADDW",
            LoadQW => "LOADQW",
            LoadF32 => "LOADF32",
            LoadF64 => "LOADF64",
            StoreB => "STOREB",
            StoreW => "STOREW",
            StoreDW => "STOREDW",
            StoreQW => "STOREQW",
            StoreF32 => "STOREF32",
            StoreF64 => "STOREF64",
            DropB => "DROPB",
            DropW => "DROPW",
            DropDW => "DROPDW",
            DropQW => "DROPQW",
            DropF32 => "DROPF32",
            DropF64 => "DROPF64",
            AddDW => "ADDDW",
            AddQW => "ADDQW",
            AddF32 => "ADDF32",
            AddF64 => "ADDF64",
            SubDW => "SUBDW",
            SubQW => "SUBQW",
            SubF32 => "SUBF32",
            SubF64 => "SUBF64",
            MulDW => "MULDW",
            MulQW => "MULQW",
            MulF32 => "MULF32",
            MulF64 => "MULF64",
            DivDW => "DIVDW",
            DivQW => "DIVQW",
            DivF32 => "DIVF32",
            DivF64 => "DIVF64",
            JmpF => "JMPF",
            Call => "CALL",
        }
    }

    /// `base + offset` within a type-specialized family.
    fn offset_from(base: Opcode, offset: u8) -> Result<Opcode, CoreError> {
        let byte = base as u8 + offset;
        Opcode::from_byte(byte).ok_or_else(|| {
            CoreError::internal(
                None,
                format!("opcode {} + {offset} does not exist", base.mnemonic()),
            )
        })
    }
}

/// Width class for load/store/drop families.
///
/// Booleans are 32-bit words and share the 32-bit integer class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Byte,
    Word,
    DWord,
    QWord,
    F32,
    F64,
}

impl StorageClass {
    pub fn of(ty: &TypeInfo) -> Option<StorageClass> {
        match (ty.kind, ty.bits) {
            (TypeKind::Integer | TypeKind::UnsignedInteger, 8) => Some(StorageClass::Byte),
            (TypeKind::Integer | TypeKind::UnsignedInteger, 16) => Some(StorageClass::Word),
            (TypeKind::Integer | TypeKind::UnsignedInteger, 32) => Some(StorageClass::DWord),
            (TypeKind::Integer | TypeKind::UnsignedInteger, 64) => Some(StorageClass::QWord),
            (TypeKind::Float, 32) => Some(StorageClass::F32),
            (TypeKind::Float, 64) => Some(StorageClass::F64),
            (TypeKind::Boolean, 32) => Some(StorageClass::DWord),
            _ => None,
        }
    }

    fn offset(self) -> u8 {
        match self {
            StorageClass::Byte => 0,
            StorageClass::Word => 1,
            StorageClass::DWord => 2,
            StorageClass::QWord => 3,
            StorageClass::F32 => 4,
            StorageClass::F64 => 5,
        }
    }

    pub fn load(self) -> Result<Opcode, CoreError> {
        Opcode::offset_from(Opcode::LoadB, self.offset())
    }

    pub fn store(self) -> Result<Opcode, CoreError> {
        Opcode::offset_from(Opcode::StoreB, self.offset())
    }

    pub fn drop_op(self) -> Result<Opcode, CoreError> {
        Opcode::offset_from(Opcode::DropB, self.offset())
    }
}

/// Operand class for the binary arithmetic families.
///
/// Booleans use the 32-bit integer form, which is the family's base opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithClass {
    I32,
    I64,
    F32,
    F64,
}

impl ArithClass {
    pub fn of(ty: &TypeInfo) -> Option<ArithClass> {
        match (ty.kind, ty.bits) {
            (TypeKind::Integer | TypeKind::UnsignedInteger, 32) => Some(ArithClass::I32),
            (TypeKind::Integer | TypeKind::UnsignedInteger, 64) => Some(ArithClass::I64),
            (TypeKind::Float, 32) => Some(ArithClass::F32),
            (TypeKind::Float, 64) => Some(ArithClass::F64),
            (TypeKind::Boolean, _) => Some(ArithClass::I32),
            _ => None,
        }
    }

    fn offset(self) -> u8 {
        match self {
            ArithClass::I32 => 0,
            ArithClass::I64 => 1,
            ArithClass::F32 => 2,
            ArithClass::F64 => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn opcode(self, class: ArithClass) -> Result<Opcode, CoreError> {
        let base = match self {
            ArithOp::Add => Opcode::AddDW,
            ArithOp::Sub => Opcode::SubDW,
            ArithOp::Mul => Opcode::MulDW,
            ArithOp::Div => Opcode::DivDW,
        };
        Opcode::offset_from(base, class.offset())
    }
}

/// Magic bytes at the start of a bytecode container.
pub const CONTAINER_MAGIC: &[u8; 4] = b"KILN";
pub const CONTAINER_VERSION: u8 = 1;
const CONTAINER_HEADER_LEN: usize = 4 + 1 + 4;

/// Append-only instruction stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bytecode {
    bytes: Vec<u8>,
}

impl Bytecode {
    pub fn new() -> Self {
        Bytecode { bytes: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Bytecode {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn extend(&mut self, other: &Bytecode) {
        self.bytes.extend_from_slice(&other.bytes);
    }

    pub fn push_byte(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn push_word(&mut self, word: u16) {
        self.push_byte((word >> 8) as u8);
        self.push_byte(word as u8);
    }

    pub fn push_dword(&mut self, dword: u32) {
        self.push_word((dword >> 16) as u16);
        self.push_word(dword as u16);
    }

    pub fn push_qword(&mut self, qword: u64) {
        self.push_dword((qword >> 32) as u32);
        self.push_dword(qword as u32);
    }

    pub fn emit(&mut self, op: Opcode) {
        self.push_byte(op as u8);
    }

    /// Overwrite a previously written 2-byte operand.
    pub fn patch_word(&mut self, at: usize, word: u16) -> Result<(), CoreError> {
        let Some(target) = self.bytes.get_mut(at..at + 2) else {
            return Err(CoreError::internal(
                None,
                format!("patch offset {at} is outside the bytecode"),
            ));
        };
        target.copy_from_slice(&word.to_be_bytes());
        Ok(())
    }

    /// The stream wrapped in a `KILN` header: magic, version, payload length.
    pub fn to_container(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CONTAINER_HEADER_LEN + self.bytes.len());
        out.extend_from_slice(CONTAINER_MAGIC);
        out.push(CONTAINER_VERSION);
        out.extend_from_slice(&(self.bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.bytes);
        out
    }

    pub fn from_container(data: &[u8]) -> Result<Bytecode, CoreError> {
        let malformed = |message: &str| CoreError::internal(None, format!("bad container: {message}"));
        if data.len() < CONTAINER_HEADER_LEN || &data[..4] != CONTAINER_MAGIC {
            return Err(malformed("missing KILN header"));
        }
        if data[4] != CONTAINER_VERSION {
            return Err(malformed(&format!("unsupported version {}", data[4])));
        }
        let declared = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) as usize;
        let payload = &data[CONTAINER_HEADER_LEN..];
        if payload.len() != declared {
            return Err(malformed(&format!(
                "length field says {declared} bytes, found {}",
                payload.len()
            )));
        }
        Ok(Bytecode {
            bytes: payload.to_vec(),
        })
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: Opcode,
    /// Operand bytes zero-extended to 64 bits; zero when there is none.
    pub operand: u64,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}  {}", self.offset, self.opcode.mnemonic())?;
        match self.opcode.operand() {
            OperandKind::None => Ok(()),
            OperandKind::Immediate(8) if self.opcode == Opcode::PushQW => {
                write!(f, " {}", self.operand as i64)
            }
            OperandKind::Immediate(_) => write!(f, " {}", self.operand),
            OperandKind::Slot => write!(f, " slot {}", self.operand),
            OperandKind::Target => write!(f, " -> {:04x}", self.operand),
            OperandKind::Builtin => write!(f, " builtin #{}", self.operand),
        }
    }
}

/// Decode a raw instruction stream.
pub fn disassemble(bytes: &[u8]) -> Result<Vec<Instruction>, CoreError> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let byte = bytes[offset];
        let opcode = Opcode::from_byte(byte).ok_or_else(|| {
            CoreError::internal(None, format!("unknown opcode 0x{byte:02x} at {offset:04x}"))
        })?;
        let width = opcode.operand_len();
        let Some(operand_bytes) = bytes.get(offset + 1..offset + 1 + width) else {
            return Err(CoreError::internal(
                None,
                format!("truncated {} at {offset:04x}", opcode.mnemonic()),
            ));
        };
        let operand = operand_bytes
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        out.push(Instruction {
            offset,
            opcode,
            operand,
        });
        offset += 1 + width;
    }
    Ok(out)
}
