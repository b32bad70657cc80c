/// Size of one instruction word in bytes.
pub const INSTRUCTION_BYTES: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// `0x00`: no effect.
    Nop,
    /// `0x01`: `rd = rn + rm` (wrapping).
    Add,
    /// `0x02`: `rd = rn - rm` (wrapping).
    Sub,
    /// Any other opcode byte. Logged and skipped.
    Unknown(u8),
}

impl Opcode {
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Opcode::Nop,
            0x01 => Opcode::Add,
            0x02 => Opcode::Sub,
            other => Opcode::Unknown(other),
        }
    }

    pub const fn to_byte(self) -> u8 {
        match self {
            Opcode::Nop => 0x00,
            Opcode::Add => 0x01,
            Opcode::Sub => 0x02,
            Opcode::Unknown(byte) => byte,
        }
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Unknown(_) => "???",
        }
    }
}

/// A decoded instruction word.
///
/// Bit layout of the 32-bit word (fetched little-endian from guest memory):
///
/// ```text
///  31      24 23      16 15       8 7        0
/// +----------+----------+----------+----------+
/// |  opcode  |    rd    |    rn    |    rm    |
/// +----------+----------+----------+----------+
/// ```
///
/// Register fields are raw bytes; indices `>= 32` turn the instruction into a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    pub rd: u8,
    pub rn: u8,
    pub rm: u8,
}

impl Instruction {
    pub const fn new(opcode: Opcode, rd: u8, rn: u8, rm: u8) -> Self {
        Self { opcode, rd, rn, rm }
    }

    pub const fn nop() -> Self {
        Self::new(Opcode::Nop, 0, 0, 0)
    }

    pub const fn add(rd: u8, rn: u8, rm: u8) -> Self {
        Self::new(Opcode::Add, rd, rn, rm)
    }

    pub const fn sub(rd: u8, rn: u8, rm: u8) -> Self {
        Self::new(Opcode::Sub, rd, rn, rm)
    }

    pub const fn decode(word: u32) -> Self {
        Self {
            opcode: Opcode::from_byte((word >> 24) as u8),
            rd: (word >> 16) as u8,
            rn: (word >> 8) as u8,
            rm: word as u8,
        }
    }

    pub const fn encode(self) -> u32 {
        ((self.opcode.to_byte() as u32) << 24)
            | ((self.rd as u32) << 16)
            | ((self.rn as u32) << 8)
            | self.rm as u32
    }

    /// Guest-memory byte representation (little-endian word).
    pub const fn to_bytes(self) -> [u8; 4] {
        self.encode().to_le_bytes()
    }
}

impl core::fmt::Display for Instruction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.opcode {
            Opcode::Nop => f.write_str("nop"),
            Opcode::Unknown(byte) => write!(f, ".word 0x{:08x} ; opcode 0x{byte:02x}", self.encode()),
            op => write!(f, "{} r{}, r{}, r{}", op.mnemonic(), self.rd, self.rn, self.rm),
        }
    }
}

/// Lays out `program` as consecutive instruction words starting at offset 0.
pub fn assemble(program: &[Instruction]) -> Vec<u8> {
    program.iter().flat_map(|insn| insn.to_bytes()).collect()
}
