use serde::{Deserialize, Serialize};

use crate::decode::{Instruction, Opcode, INSTRUCTION_BYTES};
use crate::{CpuError, CpuResult};

pub const NUM_REGISTERS: usize = 32;

/// Architectural CPU state.
///
/// Only the engine's execute step mutates this while the engine is running; hosts get copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    pub registers: [u64; NUM_REGISTERS],
    pub pc: u64,
    pub sp: u64,
    pub flags: u64,
}

impl Default for CpuState {
    fn default() -> Self {
        Self {
            registers: [0; NUM_REGISTERS],
            pc: 0,
            sp: 0,
            flags: 0,
        }
    }
}

impl CpuState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn register(&self, index: usize) -> Option<u64> {
        self.registers.get(index).copied()
    }

    /// Applies `insn` to the register file. Does not touch `pc`.
    ///
    /// Out-of-range register indices make ADD/SUB a silent no-op. Unknown opcodes leave the state
    /// untouched and are reported as [`CpuError::UnknownOpcode`].
    pub fn execute(&mut self, insn: Instruction) -> CpuResult<()> {
        let op: fn(u64, u64) -> u64 = match insn.opcode {
            Opcode::Nop => return Ok(()),
            Opcode::Add => u64::wrapping_add,
            Opcode::Sub => u64::wrapping_sub,
            Opcode::Unknown(opcode) => {
                return Err(CpuError::UnknownOpcode {
                    opcode,
                    pc: self.pc,
                })
            }
        };

        let (rd, rn, rm) = (insn.rd as usize, insn.rn as usize, insn.rm as usize);
        if rd < NUM_REGISTERS && rn < NUM_REGISTERS && rm < NUM_REGISTERS {
            self.registers[rd] = op(self.registers[rn], self.registers[rm]);
        }
        Ok(())
    }

    pub(crate) fn advance(&mut self) {
        self.pc = self.pc.wrapping_add(INSTRUCTION_BYTES);
    }
}
