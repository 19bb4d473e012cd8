use std::collections::HashMap;

use crate::{
    ir::{Instruction, Method},
    symbol::Symbol,
};

/// Control flow over a method body, one node per instruction index.
///
/// Successor shape per instruction: `Return` has none, `Goto` has exactly
/// its target, `CondBranch` has its target plus the fall through, everything
/// else falls through to the next instruction.
#[derive(Debug)]
pub struct FlowGraph {
    succ: Vec<Vec<usize>>,
}

impl FlowGraph {
    pub fn build(method: &Method) -> Self {
        let mut targets: HashMap<Symbol, usize> = HashMap::new();
        for (&index, labels) in &method.labels {
            for &label in labels {
                let prev = targets.insert(label, index);
                assert!(prev.is_none(), "label {} attached twice", label);
            }
        }

        let len = method.instructions.len();
        let succ = method
            .instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| match instruction {
                Instruction::Return(_) => Vec::new(),
                Instruction::Goto(target) => vec![resolve(&targets, *target)],
                Instruction::CondBranch { target, .. } => {
                    let mut succ = vec![resolve(&targets, *target)];
                    if index + 1 < len {
                        succ.push(index + 1);
                    }
                    succ
                }
                _ => {
                    if index + 1 < len {
                        vec![index + 1]
                    } else {
                        Vec::new()
                    }
                }
            })
            .collect();

        FlowGraph { succ }
    }

    pub fn succ(&self, index: usize) -> &[usize] {
        &self.succ[index]
    }

    pub fn len(&self) -> usize {
        self.succ.len()
    }

    pub fn is_empty(&self) -> bool {
        self.succ.is_empty()
    }
}

fn resolve(targets: &HashMap<Symbol, usize>, label: Symbol) -> usize {
    *targets
        .get(&label)
        .unwrap_or_else(|| panic!("unresolved branch target {}", label))
}
