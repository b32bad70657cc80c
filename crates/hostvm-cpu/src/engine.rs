use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use hostvm_mem::{MemoryBacking, MemoryBus};
use hostvm_types::EngineState;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::decode::{Instruction, INSTRUCTION_BYTES};
use crate::state::{CpuState, NUM_REGISTERS};
use crate::{CpuError, CpuResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    /// Guest memory size in bytes.
    pub memory_size: u64,
    pub memory_backing: MemoryBacking,
    /// Number of execution workers spawned by [`CpuEngine::start`].
    ///
    /// Workers share one lock per retired instruction, so more than one never increases
    /// throughput. Values below 1 are treated as 1.
    pub workers: usize,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            memory_size: 512 * 1024 * 1024,
            memory_backing: MemoryBacking::Sparse,
            workers: 1,
        }
    }
}

/// Why [`CpuEngine::run_slice`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunExit {
    /// The instruction budget was exhausted.
    Completed { executed: u64 },
    /// A fatal fault stopped the engine after `executed` instructions.
    Faulted { executed: u64, fault: CpuError },
}

impl RunExit {
    pub fn executed(&self) -> u64 {
        match self {
            RunExit::Completed { executed } | RunExit::Faulted { executed, .. } => *executed,
        }
    }
}

struct Machine {
    state: CpuState,
    mem: MemoryBus,
    retired: u64,
    last_fault: Option<CpuError>,
}

impl Machine {
    /// Fetch, decode, execute, advance. Unknown opcodes are logged and skipped.
    fn step(&mut self) -> CpuResult<Instruction> {
        let pc = self.state.pc;
        let size = self.mem.size();
        if pc
            .checked_add(INSTRUCTION_BYTES)
            .map_or(true, |end| end > size)
        {
            return Err(CpuError::PcOutOfBounds { pc, size });
        }

        let insn = Instruction::decode(self.mem.read_u32(pc)?);
        if let Err(err) = self.state.execute(insn) {
            warn!(pc, word = insn.encode(), "{err}; skipping");
        }
        self.state.advance();
        self.retired += 1;
        Ok(insn)
    }
}

struct Inner {
    lifecycle: EngineState,
    machine: Option<Machine>,
}

struct Shared {
    inner: Mutex<Inner>,
    run: AtomicBool,
}

fn lock(shared: &Shared) -> MutexGuard<'_, Inner> {
    // A panicking worker cannot leave `Inner` half-updated: every mutation is a plain field store.
    shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// CPU instruction engine.
///
/// Lifecycle: `Uninitialized -> Initialized -> Running <-> Stopped`. [`CpuEngine::cleanup`]
/// returns to `Uninitialized` from any state.
pub struct CpuEngine {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    worker_count: usize,
}

impl Default for CpuEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuEngine {
    /// Creates an uninitialised engine. Call [`CpuEngine::init`] before anything else.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    lifecycle: EngineState::Uninitialized,
                    machine: None,
                }),
                run: AtomicBool::new(false),
            }),
            workers: Vec::new(),
            worker_count: 1,
        }
    }

    pub fn with_config(config: &CpuConfig) -> CpuResult<Self> {
        let mut engine = Self::new();
        engine.init(config)?;
        Ok(engine)
    }

    /// Allocates guest memory and zeroes the CPU state.
    ///
    /// Re-initialising an engine tears the previous instance down first.
    pub fn init(&mut self, config: &CpuConfig) -> CpuResult<()> {
        self.cleanup();

        let mem = MemoryBus::new(config.memory_size, config.memory_backing)?;
        let mut inner = lock(&self.shared);
        inner.machine = Some(Machine {
            state: CpuState::default(),
            mem,
            retired: 0,
            last_fault: None,
        });
        inner.lifecycle = EngineState::Initialized;
        drop(inner);

        self.worker_count = config.workers.max(1);
        info!(
            memory_size = config.memory_size,
            backing = ?config.memory_backing,
            workers = self.worker_count,
            "cpu engine initialized"
        );
        Ok(())
    }

    pub fn lifecycle(&self) -> EngineState {
        lock(&self.shared).lifecycle
    }

    pub fn memory_size(&self) -> Option<u64> {
        lock(&self.shared).machine.as_ref().map(|m| m.mem.size())
    }

    /// Copies `program` to guest address 0 and points `pc` at it.
    pub fn load_program(&mut self, program: &[u8]) -> CpuResult<()> {
        let mut inner = lock(&self.shared);
        let lifecycle = inner.lifecycle;
        if lifecycle.is_running() {
            return Err(CpuError::InvalidState {
                state: lifecycle,
                op: "load a program",
            });
        }
        let machine = machine_mut(&mut inner, "load a program")?;

        let size = machine.mem.size();
        if program.len() as u64 > size {
            error!(len = program.len(), size, "program exceeds guest memory");
            return Err(CpuError::Capacity {
                len: program.len(),
                size,
            });
        }

        machine.mem.write_from(0, program)?;
        machine.state.pc = 0;
        machine.last_fault = None;
        info!(len = program.len(), "program loaded");
        Ok(())
    }

    /// Zeroes CPU state and guest memory.
    pub fn reset(&mut self) -> CpuResult<()> {
        self.reap_finished_workers();

        let mut inner = lock(&self.shared);
        let lifecycle = inner.lifecycle;
        if lifecycle.is_running() {
            return Err(CpuError::InvalidState {
                state: lifecycle,
                op: "reset",
            });
        }
        let machine = machine_mut(&mut inner, "reset")?;
        machine.state.reset();
        machine.mem.zero();
        machine.retired = 0;
        machine.last_fault = None;
        inner.lifecycle = EngineState::Initialized;
        info!("cpu state reset");
        Ok(())
    }

    /// Spawns the configured number of execution workers. No-op while already running.
    pub fn start(&mut self) -> CpuResult<()> {
        // Workers of a run that auto-stopped on a fault have exited but not been joined yet.
        self.reap_finished_workers();

        {
            let mut inner = lock(&self.shared);
            match inner.lifecycle {
                EngineState::Uninitialized => {
                    return Err(CpuError::InvalidState {
                        state: EngineState::Uninitialized,
                        op: "start",
                    })
                }
                EngineState::Running => {
                    debug!("cpu already running");
                    return Ok(());
                }
                EngineState::Initialized | EngineState::Stopped => {}
            }
            inner.lifecycle = EngineState::Running;
            self.shared.run.store(true, Ordering::Release);
        }

        for id in 0..self.worker_count {
            let shared = Arc::clone(&self.shared);
            let spawned = std::thread::Builder::new()
                .name(format!("hostvm-cpu-{id}"))
                .spawn(move || worker_loop(shared, id));
            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(err) => {
                    error!(worker = id, "failed to spawn cpu worker: {err}");
                    self.stop();
                    return Err(CpuError::Spawn(err.to_string()));
                }
            }
        }

        info!(workers = self.worker_count, "cpu started");
        Ok(())
    }

    /// Signals every worker to stop and joins them.
    ///
    /// Once this returns no worker touches the CPU state again.
    pub fn stop(&mut self) {
        self.shared.run.store(false, Ordering::Release);
        let joined = self.join_workers();

        let mut inner = lock(&self.shared);
        if inner.lifecycle.is_running() {
            inner.lifecycle = EngineState::Stopped;
        }
        if joined > 0 {
            info!(workers = joined, "cpu stopped");
        }
    }

    /// Stops the engine and releases guest memory. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        self.stop();
        let mut inner = lock(&self.shared);
        if inner.machine.take().is_some() {
            info!("cpu engine cleaned up");
        }
        inner.lifecycle = EngineState::Uninitialized;
    }

    /// Retires exactly one instruction. Only valid while not running.
    pub fn step(&mut self) -> CpuResult<Instruction> {
        self.reap_finished_workers();

        let mut inner = lock(&self.shared);
        let lifecycle = inner.lifecycle;
        if lifecycle.is_running() {
            return Err(CpuError::InvalidState {
                state: lifecycle,
                op: "single-step",
            });
        }
        let machine = machine_mut(&mut inner, "single-step")?;
        match machine.step() {
            Ok(insn) => Ok(insn),
            Err(fault) => {
                error!("{fault}");
                machine.last_fault = Some(fault.clone());
                inner.lifecycle = EngineState::Stopped;
                Err(fault)
            }
        }
    }

    /// Retires up to `max_instructions` on the calling thread. Only valid while not running.
    pub fn run_slice(&mut self, max_instructions: u64) -> CpuResult<RunExit> {
        self.reap_finished_workers();

        let mut inner = lock(&self.shared);
        let lifecycle = inner.lifecycle;
        if lifecycle.is_running() {
            return Err(CpuError::InvalidState {
                state: lifecycle,
                op: "run a slice",
            });
        }
        let machine = machine_mut(&mut inner, "run a slice")?;

        let mut executed = 0;
        while executed < max_instructions {
            if let Err(fault) = machine.step() {
                error!(executed, "{fault}");
                machine.last_fault = Some(fault.clone());
                inner.lifecycle = EngineState::Stopped;
                return Ok(RunExit::Faulted { executed, fault });
            }
            executed += 1;
        }
        Ok(RunExit::Completed { executed })
    }

    /// Snapshot of the architectural state.
    pub fn state(&self) -> Option<CpuState> {
        lock(&self.shared).machine.as_ref().map(|m| m.state)
    }

    /// Total instructions retired since the last init/reset.
    pub fn retired(&self) -> u64 {
        lock(&self.shared)
            .machine
            .as_ref()
            .map_or(0, |m| m.retired)
    }

    /// The fault that last stopped execution, cleared by `reset` and `load_program`.
    pub fn last_fault(&self) -> Option<CpuError> {
        lock(&self.shared)
            .machine
            .as_ref()
            .and_then(|m| m.last_fault.clone())
    }

    /// Sets a general-purpose register. Only valid while not running.
    pub fn set_register(&mut self, index: usize, value: u64) -> CpuResult<()> {
        let mut inner = lock(&self.shared);
        let lifecycle = inner.lifecycle;
        if lifecycle.is_running() {
            return Err(CpuError::InvalidState {
                state: lifecycle,
                op: "write a register",
            });
        }
        if index >= NUM_REGISTERS {
            return Err(CpuError::InvalidRegister { index });
        }
        machine_mut(&mut inner, "write a register")?.state.registers[index] = value;
        Ok(())
    }

    /// Copies `len` bytes of guest memory starting at `addr`.
    pub fn read_memory(&self, addr: u64, len: usize) -> CpuResult<Vec<u8>> {
        let inner = lock(&self.shared);
        let machine = inner.machine.as_ref().ok_or(CpuError::InvalidState {
            state: inner.lifecycle,
            op: "read memory",
        })?;
        let mut buf = vec![0u8; len];
        machine.mem.read_into(addr, &mut buf)?;
        Ok(buf)
    }

    fn join_workers(&mut self) -> usize {
        let count = self.workers.len();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("cpu worker panicked");
            }
        }
        count
    }

    fn reap_finished_workers(&mut self) {
        if !self.workers.is_empty() && !self.shared.run.load(Ordering::Acquire) {
            self.join_workers();
        }
    }
}

impl Drop for CpuEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn machine_mut<'a>(inner: &'a mut Inner, op: &'static str) -> CpuResult<&'a mut Machine> {
    let state = inner.lifecycle;
    inner
        .machine
        .as_mut()
        .ok_or(CpuError::InvalidState { state, op })
}

fn worker_loop(shared: Arc<Shared>, id: usize) {
    debug!(worker = id, "cpu worker started");

    while shared.run.load(Ordering::Acquire) {
        let mut inner = lock(&shared);
        // Re-check under the lock: `stop` may have landed while this worker was waiting.
        if !shared.run.load(Ordering::Acquire) {
            break;
        }
        let Some(machine) = inner.machine.as_mut() else {
            break;
        };

        if let Err(fault) = machine.step() {
            error!(worker = id, retired = machine.retired, "{fault}; stopping cpu");
            machine.last_fault = Some(fault);
            inner.lifecycle = EngineState::Stopped;
            shared.run.store(false, Ordering::Release);
            break;
        }
    }

    debug!(worker = id, "cpu worker exited");
}
