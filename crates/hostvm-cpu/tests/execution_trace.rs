use hostvm_cpu::{assemble, CpuConfig, CpuEngine, Instruction, Opcode, RunExit, NUM_REGISTERS};
use hostvm_mem::MemoryBacking;
use proptest::prelude::*;

/// Straight-line reference model of the instruction set.
fn reference_run(regs: &mut [u64; NUM_REGISTERS], program: &[Instruction]) {
    for insn in program {
        let (rd, rn, rm) = (insn.rd as usize, insn.rn as usize, insn.rm as usize);
        if rd >= NUM_REGISTERS || rn >= NUM_REGISTERS || rm >= NUM_REGISTERS {
            continue;
        }
        match insn.opcode {
            Opcode::Add => regs[rd] = regs[rn].wrapping_add(regs[rm]),
            Opcode::Sub => regs[rd] = regs[rn].wrapping_sub(regs[rm]),
            Opcode::Nop | Opcode::Unknown(_) => {}
        }
    }
}

fn arb_insn() -> impl Strategy<Value = Instruction> {
    // Mostly in-range registers, with occasional out-of-range fields and unknown opcodes.
    let reg = prop_oneof![8 => 0u8..32, 1 => 32u8..=255];
    (any::<u8>(), reg.clone(), reg.clone(), reg).prop_map(|(op, rd, rn, rm)| {
        let opcode = match op % 8 {
            0 => Opcode::Nop,
            1..=3 => Opcode::Add,
            4..=6 => Opcode::Sub,
            _ => Opcode::from_byte(op | 0x80),
        };
        Instruction::new(opcode, rd, rn, rm)
    })
}

proptest! {
    #[test]
    fn engine_matches_reference_model(
        seed in proptest::array::uniform32(any::<u64>()),
        program in proptest::collection::vec(arb_insn(), 1..128),
    ) {
        let code = assemble(&program);
        let mut cpu = CpuEngine::with_config(&CpuConfig {
            memory_size: 4096,
            memory_backing: MemoryBacking::Dense,
            workers: 1,
        }).unwrap();
        cpu.load_program(&code).unwrap();
        for (idx, value) in seed.iter().enumerate() {
            cpu.set_register(idx, *value).unwrap();
        }

        let exit = cpu.run_slice(program.len() as u64).unwrap();
        prop_assert_eq!(exit, RunExit::Completed { executed: program.len() as u64 });

        let mut expected = seed;
        reference_run(&mut expected, &program);
        let state = cpu.state().unwrap();
        prop_assert_eq!(state.registers, expected);
        prop_assert_eq!(state.pc, code.len() as u64);
        prop_assert_eq!(cpu.retired(), program.len() as u64);
    }
}

#[test]
fn run_slice_reports_fault_at_end_of_memory() {
    let code = assemble(&[Instruction::nop(), Instruction::nop()]);
    let mut cpu = CpuEngine::with_config(&CpuConfig {
        memory_size: code.len() as u64,
        memory_backing: MemoryBacking::Sparse,
        workers: 1,
    })
    .unwrap();
    cpu.load_program(&code).unwrap();

    match cpu.run_slice(10).unwrap() {
        RunExit::Faulted { executed, fault } => {
            assert_eq!(executed, 2);
            assert_eq!(
                fault,
                hostvm_cpu::CpuError::PcOutOfBounds { pc: 8, size: 8 }
            );
        }
        other => panic!("expected fault, got {other:?}"),
    }
    assert!(cpu.last_fault().is_some());
}
