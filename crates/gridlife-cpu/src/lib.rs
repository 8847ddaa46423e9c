//! The bytecode CPU that drives organisms.
//!
//! Each organism's behavior is a byte string executed by a tiny virtual
//! machine: an instruction pointer that wraps around the code, four 8-bit
//! registers, and the opcode table in [`ops`]. Every step discharges energy
//! from the organism, so a program's lifetime is bounded by what it manages
//! to eat. Any error (bad opcode, division by zero, an empty energy store)
//! ends the run, and the organism dies where it stands.

pub mod code;
pub mod ops;

pub use code::{Bytecode, RAND_LENGTH_MAX, RAND_LENGTH_MIN};
pub use ops::{compile, decompile, op_count, MUTATION_RATE};

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

use rand::RngCore;
use thiserror::Error;
use tracing::debug;

use gridlife_core::{Driver, Grid, Occupant, OrgError, Organism};

/// Total opcodes executed by every CPU in this process. Feeds the renderer
/// status line.
static STEPS: AtomicU64 = AtomicU64::new(0);

/// Opcodes executed process-wide since startup.
#[must_use]
pub fn step_count() -> u64 {
    STEPS.load(Ordering::Relaxed)
}

/// Errors that halt a CPU.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CpuError {
    /// The organism's energy store could not cover a required discharge.
    #[error(transparent)]
    Org(#[from] OrgError),
    /// The byte at the instruction pointer does not name an opcode.
    #[error("no opcode for byte {0:#04x}")]
    BadOp(u8),
    /// Div or Mod with a zero divisor.
    #[error("division by zero")]
    DivideByZero,
    /// A symbolic name with no table entry, from the compile boundary.
    #[error("unknown operation: {0}")]
    UnknownOp(String),
}

/// Mutable execution state: instruction pointer and registers.
#[derive(Debug, Default, Clone)]
pub struct CpuState {
    pub(crate) ip: usize,
    pub(crate) r: [u8; 4],
}

/// A bytecode interpreter bound to one program. The code is immutable for
/// the CPU's lifetime; mutation happens on the copy handed to a child.
#[derive(Debug)]
pub struct Cpu {
    code: Bytecode,
    state: Mutex<CpuState>,
    hash: OnceLock<u64>,
}

impl Cpu {
    /// A CPU around the given program, with zeroed state.
    #[must_use]
    pub fn with_code(code: Bytecode) -> Self {
        Self {
            code,
            state: Mutex::new(CpuState::default()),
            hash: OnceLock::new(),
        }
    }

    /// A CPU with explicit execution state, used when restoring saved
    /// worlds.
    #[must_use]
    pub fn with_state(code: Bytecode, ip: usize, registers: [u8; 4]) -> Self {
        Self {
            code,
            state: Mutex::new(CpuState { ip, r: registers }),
            hash: OnceLock::new(),
        }
    }

    /// A CPU running random bytecode.
    #[must_use]
    pub fn random(rng: &mut dyn RngCore) -> Self {
        Self::with_code(Bytecode::random(rng))
    }

    /// The program this CPU executes.
    #[must_use]
    pub fn code(&self) -> &Bytecode {
        &self.code
    }

    /// Snapshot of the instruction pointer and registers.
    #[must_use]
    pub fn state_snapshot(&self) -> (usize, [u8; 4]) {
        let state = self.state.lock().expect("cpu lock poisoned");
        (state.ip, state.r)
    }

    /// Executes one instruction: decode at the (wrapped) instruction
    /// pointer, discharge `1 + cost` from the organism, then run the op.
    pub fn step(&self, org: &Arc<Organism>) -> Result<(), CpuError> {
        let mut state = self.state.lock().expect("cpu lock poisoned");
        if self.code.is_empty() {
            return Err(CpuError::BadOp(0));
        }
        state.ip %= self.code.len();
        let byte = self.code.byte(state.ip);
        state.ip += 1;
        let op = ops::lookup(byte).ok_or(CpuError::BadOp(byte))?;

        org.discharge(1 + op.cost)?;
        op.execute(self, &mut state, org)?;
        STEPS.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Steps until an error, then kills the organism and reports why.
    pub fn run(&self, org: &Arc<Organism>) -> CpuError {
        loop {
            if let Err(err) = self.step(org) {
                debug!(target: "gridlife::cpu", %err, "driver halted");
                org.die();
                return err;
            }
        }
    }
}

impl Driver for Cpu {
    fn step(&self, org: &Arc<Organism>) -> Result<(), gridlife_core::DriverError> {
        Cpu::step(self, org).map_err(Into::into)
    }

    fn hash(&self) -> u64 {
        *self.hash.get_or_init(|| self.code.hash())
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Runs `cpu` against `org` on a dedicated task until the driver halts.
pub fn spawn_driver(cpu: Arc<Cpu>, org: Arc<Organism>) {
    thread::Builder::new()
        .name("organism".into())
        .spawn(move || {
            let _ = cpu.run(&org);
        })
        .expect("failed to spawn organism task");
}

/// Starts a driver task for every CPU-driven organism already in the grid.
/// Returns how many tasks were started.
pub fn start_all(grid: &Grid) -> usize {
    let mut points = Vec::new();
    grid.locations(&mut points);
    let mut started = 0;
    for point in points {
        if let Occupant::Organism(org) = point.value {
            if let Some(driver) = org.driver() {
                if let Ok(cpu) = driver.as_any_arc().downcast::<Cpu>() {
                    spawn_driver(cpu, org);
                    started += 1;
                }
            }
        }
    }
    started
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlife_core::{Energetic, Food, GridOptions, PutWhen};
    use rand::SeedableRng;

    fn life_grid(width: i32, height: i32) -> Grid {
        Grid::with_options(
            width,
            height,
            GridOptions {
                empty: Some(Arc::new(|occ: &Occupant| occ.is_food())),
                gate: None,
            },
        )
    }

    fn place_org(grid: &Grid, x: i32, y: i32, dir: u8, energy: i64) -> Arc<Organism> {
        let org = Organism::with_direction(dir);
        org.add(energy);
        let (_, loc) = grid.put(x, y, Occupant::Organism(Arc::clone(&org)), PutWhen::Always);
        assert!(loc.is_some());
        org
    }

    fn program(names: &[&str]) -> Cpu {
        Cpu::with_code(compile(names).expect("known opcodes"))
    }

    #[test]
    fn arithmetic_ops_normalize_to_eight_bits() {
        let grid = life_grid(3, 3);
        let org = place_org(&grid, 0, 0, 0, 1000);
        let cpu = program(&["Inc", "Shl0", "Shl1", "Dec", "Shr"]);

        cpu.step(&org).unwrap(); // r0 = 1
        cpu.step(&org).unwrap(); // r0 = 2
        cpu.step(&org).unwrap(); // r0 = 5
        cpu.step(&org).unwrap(); // r0 = 4
        cpu.step(&org).unwrap(); // r0 = 2
        assert_eq!(cpu.state_snapshot().1[0], 2);
    }

    #[test]
    fn registers_wrap_at_256() {
        let grid = life_grid(3, 3);
        let org = place_org(&grid, 0, 0, 0, 10_000);
        let cpu = program(&["Dec"]);
        cpu.step(&org).unwrap();
        assert_eq!(cpu.state_snapshot().1[0], 255);
    }

    #[test]
    fn swap_exchanges_registers() {
        let grid = life_grid(3, 3);
        let org = place_org(&grid, 0, 0, 0, 1000);
        let cpu = program(&["Inc", "SwapAB", "SwapAD"]);
        cpu.step(&org).unwrap();
        cpu.step(&org).unwrap();
        cpu.step(&org).unwrap();
        let (_, r) = cpu.state_snapshot();
        assert_eq!(r, [0, 0, 0, 1]);
    }

    #[test]
    fn division_by_zero_is_terminal() {
        let grid = life_grid(3, 3);
        let org = place_org(&grid, 0, 0, 0, 1000);
        let cpu = program(&["Div"]);
        assert_eq!(cpu.step(&org), Err(CpuError::DivideByZero));
    }

    #[test]
    fn conditional_skips_the_next_byte_when_false() {
        let grid = life_grid(3, 3);
        let org = place_org(&grid, 0, 0, 0, 1000);
        // r0 == r1 (both zero), so IfNe skips the Inc.
        let cpu = program(&["IfNe", "Inc", "Zero"]);
        cpu.step(&org).unwrap();
        let (ip, r) = cpu.state_snapshot();
        assert_eq!(ip, 2);
        assert_eq!(r[0], 0);
    }

    #[test]
    fn if_loop_counts_down_register_c() {
        let grid = life_grid(3, 3);
        let org = place_org(&grid, 0, 0, 0, 1000);
        let cpu = Cpu::with_state(compile(&["IfLoop"]).unwrap(), 0, [0, 0, 2, 0]);
        cpu.step(&org).unwrap();
        assert_eq!(cpu.state_snapshot().1[2], 1);
        cpu.step(&org).unwrap();
        assert_eq!(cpu.state_snapshot().1[2], 0);
        cpu.step(&org).unwrap();
        // Counter exhausted: the op now skips ahead instead.
        let (ip, r) = cpu.state_snapshot();
        assert_eq!(r[2], 0);
        assert_eq!(ip, 2);
    }

    #[test]
    fn jump_lands_on_the_next_matching_label() {
        let grid = life_grid(3, 3);
        let org = place_org(&grid, 0, 0, 0, 1000);
        let cpu = program(&["Jump2", "Inc", "L2", "Inc"]);
        cpu.step(&org).unwrap();
        // ip points at the L2 label, not the Inc before it.
        assert_eq!(cpu.state_snapshot().0, 2);
    }

    #[test]
    fn jump_without_a_label_resets_to_zero() {
        let grid = life_grid(3, 3);
        let org = place_org(&grid, 0, 0, 0, 1000);
        let cpu = program(&["Jump3", "Inc"]);
        cpu.step(&org).unwrap();
        assert_eq!(cpu.state_snapshot().0, 0);
    }

    #[test]
    fn bad_opcode_fails_before_any_discharge() {
        let grid = life_grid(3, 3);
        let org = place_org(&grid, 0, 0, 0, 1000);
        let cpu = Cpu::with_code(Bytecode::new(vec![200]));
        assert_eq!(cpu.step(&org), Err(CpuError::BadOp(200)));
        assert_eq!(org.energy(), 1000);
    }

    #[test]
    fn exact_cost_executes_then_starves_on_the_next_step() {
        let grid = life_grid(3, 3);
        let org = place_org(&grid, 0, 0, 0, 2);
        let cpu = program(&["XXX", "XXX"]);
        // XXX costs 1 + 1: the first step lands exactly on zero.
        cpu.step(&org).unwrap();
        assert_eq!(org.energy(), 0);
        assert_eq!(cpu.step(&org), Err(CpuError::Org(OrgError::NoEnergy)));
    }

    #[test]
    fn eat_op_requests_ten_times_register_a() {
        let grid = life_grid(3, 1);
        let org = place_org(&grid, 0, 0, 0, 1000);
        grid.put(1, 0, Occupant::Food(Food::new(100)), PutWhen::Always);
        let cpu = Cpu::with_state(compile(&["Eat"]).unwrap(), 0, [20, 0, 0, 0]);

        cpu.step(&org).unwrap();
        // 1000 - (1 + 5) - ceil(200 / 100) + 100 eaten.
        assert_eq!(org.energy(), 1092);
        assert!(grid.get(1, 0).is_none());
    }

    #[test]
    fn forward_op_tolerates_a_blocked_cell() {
        let grid = life_grid(2, 1);
        let org = place_org(&grid, 0, 0, 0, 1000);
        place_org(&grid, 1, 0, 0, 10);
        let cpu = program(&["Forward"]);
        cpu.step(&org).unwrap();
        assert!(grid
            .get(0, 0)
            .is_some_and(|loc| loc.value().is_organism()));
    }

    #[test]
    fn turn_ops_rotate_the_organism() {
        let grid = life_grid(3, 3);
        let org = place_org(&grid, 0, 0, 0, 1000);
        let cpu = program(&["Right", "Right", "Left"]);
        cpu.step(&org).unwrap();
        cpu.step(&org).unwrap();
        cpu.step(&org).unwrap();
        assert_eq!(org.direction(), 1);
    }

    #[test]
    fn divide_op_spawns_a_running_child() {
        let grid = life_grid(3, 1);
        let org = place_org(&grid, 0, 0, 0, 50_000);
        let cpu = program(&["Divide"]);
        cpu.step(&org).unwrap();
        // The cell ahead now holds the child (or its corpse if the starved
        // child has already died).
        assert!(grid.get(1, 0).is_some());
    }

    #[test]
    fn divide_op_against_a_blocked_cell_is_not_fatal() {
        let grid = life_grid(2, 1);
        let org = place_org(&grid, 0, 0, 0, 50_000);
        place_org(&grid, 1, 0, 0, 10);
        let cpu = program(&["Divide"]);
        assert_eq!(cpu.step(&org), Ok(()));
    }

    #[test]
    fn sense_op_clips_into_register_a() {
        let grid = life_grid(12, 1);
        let org = place_org(&grid, 0, 0, 0, 1000);
        grid.put(1, 0, Occupant::Food(Food::new(100_000)), PutWhen::Always);
        let cpu = program(&["Sense"]);
        cpu.step(&org).unwrap();
        assert_eq!(cpu.state_snapshot().1[0], 255);
    }

    #[test]
    fn sense_others_ignores_same_species() {
        let grid = life_grid(12, 1);
        let org = place_org(&grid, 0, 0, 0, 1000);
        let cpu = program(&["SenseOthers", "SenseOthers"]);

        let kin = place_org(&grid, 1, 0, 0, 5000);
        kin.set_driver(Arc::new(Cpu::with_code(cpu.code().clone())));
        cpu.step(&org).unwrap();
        assert_eq!(cpu.state_snapshot().1[0], 0);

        let stranger = place_org(&grid, 1, 0, 0, 5000);
        stranger.set_driver(Arc::new(program(&["XXX"])));
        cpu.step(&org).unwrap();
        assert_eq!(cpu.state_snapshot().1[0], 255);
    }

    #[test]
    fn run_ends_with_a_corpse() {
        let grid = life_grid(3, 3);
        let org = place_org(&grid, 1, 1, 0, 8);
        let cpu = program(&["XXX"]);
        let err = cpu.run(&org);
        assert_eq!(err, CpuError::Org(OrgError::NoEnergy));
        assert!(grid
            .get(1, 1)
            .is_some_and(|loc| loc.value().is_food()));
    }

    #[test]
    fn compile_round_trips_through_decompile() {
        let names = vec!["L1", "Sense", "IfNZ", "Eat", "Jump1", "Forward", "Divide"];
        let code = compile(&names).expect("compile");
        assert_eq!(decompile(&code).expect("decompile"), names);
    }

    #[test]
    fn mutated_code_still_round_trips() {
        let mut rng = rand::rngs::SmallRng::seed_from_u64(31337);
        let mut code = Bytecode::random(&mut rng);
        for _ in 0..16 {
            code.mutate(&mut rng);
        }
        let names = decompile(&code).expect("random code stays in range");
        assert_eq!(compile(&names).expect("compile"), code);
    }

    #[test]
    fn compile_rejects_unknown_names() {
        assert!(matches!(
            compile(&["Zero", "Frobnicate"]),
            Err(CpuError::UnknownOp(name)) if name == "Frobnicate"
        ));
    }

    #[test]
    fn decompile_rejects_out_of_range_bytes() {
        let code = Bytecode::new(vec![0, 255]);
        assert!(matches!(decompile(&code), Err(CpuError::UnknownOp(_))));
    }
}
