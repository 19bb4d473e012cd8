use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::symbol::Symbol;

use super::interference::InterferenceGraph;

pub type Coloring = HashMap<Symbol, u32>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("cannot allocate local variables into {bound} registers, at least {min} required")]
    Infeasible { bound: u32, min: u32 },
}

/// Colors the graph with slot numbers, skipping `reserved`.
///
/// Simplify runs on a working copy: any node with degree below the bound
/// moves to the stack, in name order. A stuck non-empty graph is infeasible
/// and the error carries the smallest bound that cannot get stuck, read off
/// the untouched graph. Select pops the stack and gives each node the
/// lowest slot not taken by a neighbor in the original graph and not
/// reserved. `bound` of `None` never fails and discovers a sufficient slot
/// count.
pub fn color(
    graph: &InterferenceGraph,
    reserved: &HashSet<u32>,
    bound: Option<u32>,
) -> Result<Coloring, AllocError> {
    let k = bound.map(|b| b as usize).unwrap_or(usize::MAX);

    let mut working = graph.clone();
    let mut select_stack: Vec<Symbol> = Vec::new();

    while !working.is_empty() {
        let removable = working
            .vars()
            .iter()
            .copied()
            .find(|&v| working.degree(v) < k);
        match removable {
            Some(var) => {
                select_stack.push(var);
                working.remove(var);
            }
            None => {
                let min = graph.max_degree() as u32 + 1;
                let bound = bound.expect("unbounded simplify cannot get stuck");
                return Err(AllocError::Infeasible { bound, min });
            }
        }
    }

    let mut coloring = Coloring::new();
    while let Some(var) = select_stack.pop() {
        let mut used = reserved.clone();
        for neighbor in graph.neighbors(var) {
            if let Some(&slot) = coloring.get(neighbor) {
                used.insert(slot);
            }
        }

        let mut slot = 0;
        while used.contains(&slot) {
            slot += 1;
        }
        coloring.insert(var, slot);
    }

    Ok(coloring)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{BinOp, Instruction, Method, MethodBuilder, Operand, Type},
        regalloc::{flow::FlowGraph, liveness},
    };

    fn var(name: &str) -> Operand {
        Operand::var(name, Type::Int)
    }

    fn sym(name: &str) -> Symbol {
        Symbol::new(name)
    }

    fn graph_of(method: &Method) -> InterferenceGraph {
        let flow = FlowGraph::build(method);
        let live = liveness::analyze(method, &flow);
        InterferenceGraph::build(method, &live)
    }

    // a and b live at the same time
    fn overlapping() -> InterferenceGraph {
        let mut b = MethodBuilder::new("overlap")
            .static_method()
            .local("a", Type::Int)
            .local("b", Type::Int)
            .local("c", Type::Int)
            .returns(Type::Int);
        b.push(Instruction::assign(
            var("a"),
            Instruction::SingleOp(Operand::int(0)),
        ));
        b.push(Instruction::assign(
            var("b"),
            Instruction::SingleOp(Operand::int(1)),
        ));
        b.push(Instruction::assign(
            var("c"),
            Instruction::BinaryOp {
                op: BinOp::Add,
                lhs: var("a"),
                rhs: var("b"),
            },
        ));
        b.push(Instruction::Return(Some(var("c"))));
        graph_of(&b.build())
    }

    // a, b, c each die before the next one is born
    fn disjoint() -> InterferenceGraph {
        let mut b = MethodBuilder::new("disjoint")
            .static_method()
            .local("a", Type::Int)
            .local("b", Type::Int)
            .local("c", Type::Int)
            .returns(Type::Int);
        b.push(Instruction::assign(
            var("a"),
            Instruction::SingleOp(Operand::int(1)),
        ));
        b.push(Instruction::assign(
            var("b"),
            Instruction::BinaryOp {
                op: BinOp::Add,
                lhs: var("a"),
                rhs: Operand::int(1),
            },
        ));
        b.push(Instruction::assign(
            var("c"),
            Instruction::BinaryOp {
                op: BinOp::Add,
                lhs: var("b"),
                rhs: Operand::int(1),
            },
        ));
        b.push(Instruction::Return(Some(var("c"))));
        graph_of(&b.build())
    }

    #[test]
    fn conflicting_pair_needs_two() {
        let graph = overlapping();

        let err = color(&graph, &HashSet::new(), Some(1)).unwrap_err();
        assert_eq!(err, AllocError::Infeasible { bound: 1, min: 2 });

        let coloring = color(&graph, &HashSet::new(), Some(2)).unwrap();
        assert_ne!(coloring[&sym("a")], coloring[&sym("b")]);
        assert!(coloring.values().all(|&slot| slot < 2));
    }

    #[test]
    fn disjoint_lifetimes_share_one_slot() {
        let graph = disjoint();

        let coloring = color(&graph, &HashSet::new(), Some(1)).unwrap();
        assert_eq!(coloring[&sym("a")], 0);
        assert_eq!(coloring[&sym("b")], 0);
        assert_eq!(coloring[&sym("c")], 0);
    }

    #[test]
    fn reserved_slots_are_skipped() {
        let graph = disjoint();

        let reserved = HashSet::from([0, 1]);
        let coloring = color(&graph, &reserved, None).unwrap();
        assert!(coloring.values().all(|&slot| slot == 2));
    }

    #[test]
    fn neighbors_never_share() {
        let graph = overlapping();

        let coloring = color(&graph, &HashSet::new(), None).unwrap();
        for &v in graph.vars() {
            for &n in graph.neighbors(v) {
                assert_ne!(coloring[&v], coloring[&n]);
            }
        }
    }

    #[test]
    fn deterministic_across_runs() {
        let graph = overlapping();

        let first = color(&graph, &HashSet::new(), Some(2)).unwrap();
        let second = color(&graph, &HashSet::new(), Some(2)).unwrap();
        assert_eq!(first, second);
    }
}
