use std::collections::HashSet;

use crate::{
    ir::{CallKind, Instruction, Method, Operand, VarScope},
    symbol::Symbol,
};

use super::flow::FlowGraph;

pub type LiveSet = HashSet<Symbol>;

/// Per-instruction liveness, indexed like the method body.
///
/// `live_in(i) = use(i) ∪ (live_out(i) − def(i))` and `live_out(i)` is the
/// union of `live_in` over i's successors, iterated to the fixed point.
/// The receiver never appears in any set.
#[derive(Debug)]
pub struct Liveness {
    pub defs: Vec<LiveSet>,
    pub uses: Vec<LiveSet>,
    pub live_in: Vec<LiveSet>,
    pub live_out: Vec<LiveSet>,
}

pub fn analyze(method: &Method, flow: &FlowGraph) -> Liveness {
    let receiver = method
        .var_table
        .iter()
        .find(|(_, d)| d.scope == VarScope::Receiver)
        .map(|(name, _)| *name);

    let len = method.instructions.len();
    let mut defs = Vec::with_capacity(len);
    let mut uses = Vec::with_capacity(len);
    for instruction in &method.instructions {
        let mut def = LiveSet::new();
        instruction_def(instruction, &mut def);
        let mut used = LiveSet::new();
        instruction_uses(instruction, &mut used);
        if let Some(this) = receiver {
            def.remove(&this);
            used.remove(&this);
        }
        defs.push(def);
        uses.push(used);
    }

    let mut live_in: Vec<LiveSet> = vec![LiveSet::new(); len];
    let mut live_out: Vec<LiveSet> = vec![LiveSet::new(); len];

    let mut has_change = false;
    loop {
        for index in 0..len {
            let diff = &live_out[index] - &defs[index];
            let new_in: LiveSet = uses[index].union(&diff).copied().collect();
            has_change |= live_in[index] != new_in;

            let mut new_out = LiveSet::new();
            for &succ in flow.succ(index) {
                new_out = new_out.union(&live_in[succ]).copied().collect();
            }
            has_change |= live_out[index] != new_out;

            live_in[index] = new_in;
            live_out[index] = new_out;
        }

        if !has_change {
            break;
        }
        has_change = false;
    }

    Liveness {
        defs,
        uses,
        live_in,
        live_out,
    }
}

/// The assignment destination's base variable. Storing into an array element
/// also defines the base here; the element store still reads the reference,
/// which [`instruction_uses`] accounts for.
fn instruction_def(instruction: &Instruction, def: &mut LiveSet) {
    if let Instruction::Assign { dest, .. } = instruction {
        match dest {
            Operand::Var { name, .. } => {
                def.insert(*name);
            }
            Operand::ArrayElem { array, .. } => {
                def.insert(*array);
            }
            Operand::Const(_) => unreachable!("constant assignment destination"),
        }
    }
}

/// Every variable the instruction reads.
fn instruction_uses(instruction: &Instruction, uses: &mut LiveSet) {
    match instruction {
        Instruction::Assign { dest, rhs } => {
            if let Operand::ArrayElem { array, index, .. } = dest {
                uses.insert(*array);
                operand_uses(index, uses);
            }
            instruction_uses(rhs, uses);
        }
        Instruction::SingleOp(operand) => operand_uses(operand, uses),
        Instruction::BinaryOp { lhs, rhs, .. } => {
            operand_uses(lhs, uses);
            operand_uses(rhs, uses);
        }
        Instruction::UnaryOp { operand, .. } => operand_uses(operand, uses),
        Instruction::Call(call) => {
            match call.kind {
                // The target of a static call or a `new` names a class,
                // not a variable.
                CallKind::Virtual(_) | CallKind::Special(_) | CallKind::ArrayLength => {
                    operand_uses(&call.target, uses)
                }
                CallKind::Static(_) | CallKind::New => {}
            }
            for arg in &call.args {
                operand_uses(arg, uses);
            }
        }
        Instruction::Return(value) => {
            if let Some(value) = value {
                operand_uses(value, uses);
            }
        }
        Instruction::CondBranch { condition, .. } => instruction_uses(condition, uses),
        Instruction::Goto(_) => {}
        Instruction::GetField { object, .. } => operand_uses(object, uses),
        Instruction::PutField { object, value, .. } => {
            operand_uses(object, uses);
            operand_uses(value, uses);
        }
    }
}

fn operand_uses(operand: &Operand, uses: &mut LiveSet) {
    match operand {
        Operand::Var { name, .. } => {
            uses.insert(*name);
        }
        Operand::Const(_) => {}
        Operand::ArrayElem { array, index, .. } => {
            uses.insert(*array);
            operand_uses(index, uses);
        }
    }
}
