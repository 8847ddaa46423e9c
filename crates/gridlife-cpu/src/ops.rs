//! The opcode table.
//!
//! Byte values index straight into [`TABLE`], so the ordering here is part
//! of the persisted-genome format: reordering entries invalidates every
//! saved world and recorded census genome.

use std::sync::Arc;

use rand::Rng;

use gridlife_core::{Occupant, OrgError, Organism};

use crate::code::Bytecode;
use crate::{Cpu, CpuError, CpuState};

/// Probability that a child's code is mutated during a Divide op.
pub const MUTATION_RATE: f32 = 0.01;

type OpFn = fn(&Cpu, &mut CpuState, &Arc<Organism>) -> Result<(), CpuError>;

/// A single named instruction with its surcharge above the base step cost.
pub struct Op {
    pub name: &'static str,
    pub cost: i64,
    run: OpFn,
}

impl Op {
    pub(crate) fn execute(
        &self,
        cpu: &Cpu,
        state: &mut CpuState,
        org: &Arc<Organism>,
    ) -> Result<(), CpuError> {
        (self.run)(cpu, state, org)
    }
}

const fn op(name: &'static str, run: OpFn, cost: i64) -> Op {
    Op { name, cost, run }
}

/// The instruction set, indexed by byte value.
pub static TABLE: &[Op] = &[
    op("XXX", op_noop, 1),
    op("L1", op_noop, 1),
    op("L2", op_noop, 1),
    op("L3", op_noop, 1),
    op("L4", op_noop, 1),
    op("Jump1", op_jump1, 1),
    op("Jump2", op_jump2, 1),
    op("Jump3", op_jump3, 1),
    op("Jump4", op_jump4, 1),
    op("JumpR1", op_jump_r1, 1),
    op("JumpR2", op_jump_r2, 1),
    op("JumpR3", op_jump_r3, 1),
    op("JumpR4", op_jump_r4, 1),
    op("SwapAB", op_swap_ab, 1),
    op("SwapAC", op_swap_ac, 1),
    op("SwapAD", op_swap_ad, 1),
    op("Zero", op_zero, 1),
    op("Shl0", op_shl0, 1),
    op("Shl1", op_shl1, 1),
    op("Shr", op_shr, 1),
    op("Inc", op_inc, 1),
    op("Dec", op_dec, 1),
    op("Add", op_add, 1),
    op("Sub", op_sub, 1),
    op("Div", op_div, 1),
    op("Mul", op_mul, 1),
    op("And", op_and, 1),
    op("Or", op_or, 1),
    op("Xor", op_xor, 1),
    op("Mod", op_mod, 1),
    op("IfEq", op_if_eq, 1),
    op("IfNe", op_if_ne, 1),
    op("IfGt", op_if_gt, 1),
    op("IfLt", op_if_lt, 1),
    op("IfZ", op_if_z, 1),
    op("IfNZ", op_if_nz, 1),
    op("IfLoop", op_if_loop, 1),
    op("Jump", op_jump, 1),
    op("Eat", op_eat, 5),
    op("Left", op_left, 5),
    op("Right", op_right, 5),
    op("Forward", op_forward, 10),
    op("Divide", op_divide, 1),
    op("Sense", op_sense, 1),
    op("SenseOthers", op_sense_others, 1),
];

/// Number of defined opcodes.
#[must_use]
pub fn op_count() -> usize {
    TABLE.len()
}

/// Looks a byte up in the table.
#[must_use]
pub(crate) fn lookup(byte: u8) -> Option<&'static Op> {
    TABLE.get(byte as usize)
}

/// Converts symbolic instruction names into bytecode.
pub fn compile(names: &[&str]) -> Result<Bytecode, CpuError> {
    let mut bytes = Vec::with_capacity(names.len());
    for name in names {
        let byte = TABLE
            .iter()
            .position(|op| op.name == *name)
            .ok_or_else(|| CpuError::UnknownOp((*name).to_string()))?;
        bytes.push(byte as u8);
    }
    Ok(Bytecode::new(bytes))
}

/// Converts bytecode back into symbolic instruction names.
pub fn decompile(code: &Bytecode) -> Result<Vec<&'static str>, CpuError> {
    code.bytes()
        .iter()
        .map(|byte| {
            lookup(*byte)
                .map(|op| op.name)
                .ok_or_else(|| CpuError::UnknownOp(format!("{byte:#04x}")))
        })
        .collect()
}

fn op_noop(_cpu: &Cpu, _st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    Ok(())
}

fn jump_to_label(cpu: &Cpu, st: &mut CpuState, label: u8) {
    st.ip = cpu.code().find(label, st.ip);
}

fn jump_back_to_label(cpu: &Cpu, st: &mut CpuState, label: u8) {
    st.ip = cpu.code().find_backward(label, st.ip);
}

fn op_jump1(cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    jump_to_label(cpu, st, 1);
    Ok(())
}

fn op_jump2(cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    jump_to_label(cpu, st, 2);
    Ok(())
}

fn op_jump3(cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    jump_to_label(cpu, st, 3);
    Ok(())
}

fn op_jump4(cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    jump_to_label(cpu, st, 4);
    Ok(())
}

fn op_jump_r1(cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    jump_back_to_label(cpu, st, 1);
    Ok(())
}

fn op_jump_r2(cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    jump_back_to_label(cpu, st, 2);
    Ok(())
}

fn op_jump_r3(cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    jump_back_to_label(cpu, st, 3);
    Ok(())
}

fn op_jump_r4(cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    jump_back_to_label(cpu, st, 4);
    Ok(())
}

fn op_swap_ab(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r.swap(0, 1);
    Ok(())
}

fn op_swap_ac(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r.swap(0, 2);
    Ok(())
}

fn op_swap_ad(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r.swap(0, 3);
    Ok(())
}

fn op_zero(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r[0] = 0;
    Ok(())
}

fn op_shl0(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r[0] <<= 1;
    Ok(())
}

fn op_shl1(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r[0] = (st.r[0] << 1) | 1;
    Ok(())
}

fn op_shr(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r[0] >>= 1;
    Ok(())
}

fn op_inc(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r[0] = st.r[0].wrapping_add(1);
    Ok(())
}

fn op_dec(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r[0] = st.r[0].wrapping_sub(1);
    Ok(())
}

fn op_add(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r[0] = st.r[0].wrapping_add(st.r[1]);
    Ok(())
}

fn op_sub(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r[0] = st.r[0].wrapping_sub(st.r[1]);
    Ok(())
}

fn op_mul(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r[0] = st.r[0].wrapping_mul(st.r[1]);
    Ok(())
}

fn op_div(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    if st.r[1] == 0 {
        return Err(CpuError::DivideByZero);
    }
    st.r[0] /= st.r[1];
    Ok(())
}

fn op_mod(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    if st.r[1] == 0 {
        return Err(CpuError::DivideByZero);
    }
    st.r[0] %= st.r[1];
    Ok(())
}

fn op_and(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r[0] &= st.r[1];
    Ok(())
}

fn op_or(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r[0] |= st.r[1];
    Ok(())
}

fn op_xor(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r[0] ^= st.r[1];
    Ok(())
}

fn skip_unless(st: &mut CpuState, predicate: bool) {
    if !predicate {
        st.ip += 1;
    }
}

fn op_if_eq(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    skip_unless(st, st.r[0] == st.r[1]);
    Ok(())
}

fn op_if_ne(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    skip_unless(st, st.r[0] != st.r[1]);
    Ok(())
}

fn op_if_gt(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    skip_unless(st, st.r[0] > st.r[1]);
    Ok(())
}

fn op_if_lt(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    skip_unless(st, st.r[0] < st.r[1]);
    Ok(())
}

fn op_if_z(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    skip_unless(st, st.r[0] == 0);
    Ok(())
}

fn op_if_nz(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    skip_unless(st, st.r[0] != 0);
    Ok(())
}

fn op_if_loop(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    if st.r[2] > 0 {
        st.r[2] -= 1;
    } else {
        st.ip += 1;
    }
    Ok(())
}

fn op_jump(_cpu: &Cpu, st: &mut CpuState, _org: &Arc<Organism>) -> Result<(), CpuError> {
    st.ip = st.r[3] as usize;
    Ok(())
}

fn op_eat(_cpu: &Cpu, st: &mut CpuState, org: &Arc<Organism>) -> Result<(), CpuError> {
    org.eat(i64::from(st.r[0]) * 10)?;
    Ok(())
}

fn op_left(_cpu: &Cpu, _st: &mut CpuState, org: &Arc<Organism>) -> Result<(), CpuError> {
    org.left();
    Ok(())
}

fn op_right(_cpu: &Cpu, _st: &mut CpuState, org: &Arc<Organism>) -> Result<(), CpuError> {
    org.right();
    Ok(())
}

fn op_forward(_cpu: &Cpu, _st: &mut CpuState, org: &Arc<Organism>) -> Result<(), CpuError> {
    match org.forward() {
        Ok(()) | Err(OrgError::NotEmpty) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn op_divide(cpu: &Cpu, st: &mut CpuState, org: &Arc<Organism>) -> Result<(), CpuError> {
    org.discharge(cpu.code().len() as i64)?;
    let mut code = cpu.code().clone();
    let mut rng = rand::rng();
    if rng.random::<f32>() < MUTATION_RATE {
        code.mutate(&mut rng);
    }
    let child_cpu = Arc::new(Cpu::with_code(code));
    let driver: Arc<dyn gridlife_core::Driver> = Arc::clone(&child_cpu) as Arc<dyn gridlife_core::Driver>;
    match org.divide(driver, f64::from(st.r[0]) / 256.0) {
        Ok(child) => {
            crate::spawn_driver(child_cpu, child);
            Ok(())
        }
        Err(OrgError::NotEmpty) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn clip_to_register(value: f64) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

fn op_sense(_cpu: &Cpu, st: &mut CpuState, org: &Arc<Organism>) -> Result<(), CpuError> {
    st.r[0] = clip_to_register(org.sense(None));
    Ok(())
}

fn op_sense_others(cpu: &Cpu, st: &mut CpuState, org: &Arc<Organism>) -> Result<(), CpuError> {
    let own_hash = cpu.code().hash();
    let filter = |occupant: &Occupant| match occupant {
        Occupant::Organism(other) => match other.driver() {
            Some(driver) if driver.hash() == own_hash => 0.0,
            _ => 1.0,
        },
        _ => 1.0,
    };
    st.r[0] = clip_to_register(org.sense(Some(&filter)));
    Ok(())
}
