use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use crate::{
    ir::{Method, VarScope},
    symbol::Symbol,
};

use super::liveness::Liveness;

/// Undirected conflict graph over a method's local variables.
///
/// Receiver and parameter slots are fixed, so only locals become nodes. Two
/// locals conflict when one is defined while the other is live out of the
/// same instruction. A dead definition still conflicts with everything live
/// across its instruction, which keeps the graph a safe over-approximation.
///
/// Nodes enumerate in name order, so every pass over the graph is
/// deterministic. Coloring clones a working copy to simplify destructively
/// while the original stays intact for the select phase.
#[derive(Debug, Clone)]
pub struct InterferenceGraph {
    vars: Vec<Symbol>,
    adjacency: HashMap<Symbol, HashSet<Symbol>>,
}

impl InterferenceGraph {
    pub fn build(method: &Method, liveness: &Liveness) -> Self {
        let locals: HashSet<Symbol> = method
            .var_table
            .iter()
            .filter(|(_, d)| d.scope == VarScope::Local)
            .map(|(name, _)| *name)
            .collect();

        let vars: Vec<Symbol> = locals.iter().copied().sorted_by_key(|s| s.name()).collect();
        let mut adjacency: HashMap<Symbol, HashSet<Symbol>> =
            vars.iter().map(|&v| (v, HashSet::new())).collect();

        for (def, out) in liveness.defs.iter().zip(&liveness.live_out) {
            let moment: Vec<Symbol> = def
                .union(out)
                .filter(|v| locals.contains(v))
                .copied()
                .collect();
            for (&a, &b) in moment.iter().tuple_combinations() {
                adjacency.get_mut(&a).expect("local node").insert(b);
                adjacency.get_mut(&b).expect("local node").insert(a);
            }
        }

        InterferenceGraph { vars, adjacency }
    }

    /// Node names in name order.
    pub fn vars(&self) -> &[Symbol] {
        &self.vars
    }

    pub fn neighbors(&self, var: Symbol) -> &HashSet<Symbol> {
        &self.adjacency[&var]
    }

    pub fn degree(&self, var: Symbol) -> usize {
        self.adjacency[&var].len()
    }

    pub fn max_degree(&self) -> usize {
        self.vars
            .iter()
            .map(|&v| self.degree(v))
            .max()
            .unwrap_or(0)
    }

    pub fn remove(&mut self, var: Symbol) {
        let neighbors = self.adjacency.remove(&var).expect("local node");
        for neighbor in neighbors {
            self.adjacency
                .get_mut(&neighbor)
                .expect("local node")
                .remove(&var);
        }
        self.vars.retain(|&v| v != var);
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{BinOp, Instruction, MethodBuilder, Operand, Type},
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

    #[test]
    fn overlapping_locals_conflict() {
        // a := 0; b := 1; c := a + b; return c
        let mut b = MethodBuilder::new("sum")
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
        let graph = graph_of(&b.build());

        assert_eq!(graph.vars(), &[sym("a"), sym("b"), sym("c")]);
        assert_eq!(graph.neighbors(sym("a")), &HashSet::from([sym("b")]));
        assert_eq!(graph.neighbors(sym("b")), &HashSet::from([sym("a")]));
        assert_eq!(graph.degree(sym("c")), 0);
    }

    #[test]
    fn dead_def_conflicts_with_live_out() {
        // a := 0; b := a + 1; return a   -- b is dead but still conflicts
        let mut b = MethodBuilder::new("dead")
            .static_method()
            .local("a", Type::Int)
            .local("b", Type::Int)
            .returns(Type::Int);
        b.push(Instruction::assign(
            var("a"),
            Instruction::SingleOp(Operand::int(0)),
        ));
        b.push(Instruction::assign(
            var("b"),
            Instruction::BinaryOp {
                op: BinOp::Add,
                lhs: var("a"),
                rhs: Operand::int(1),
            },
        ));
        b.push(Instruction::Return(Some(var("a"))));
        let graph = graph_of(&b.build());

        assert!(graph.neighbors(sym("a")).contains(&sym("b")));
    }

    #[test]
    fn parameters_are_not_nodes() {
        // t := p + 1; return t
        let mut b = MethodBuilder::new("incr")
            .static_method()
            .param("p", Type::Int)
            .local("t", Type::Int)
            .returns(Type::Int);
        b.push(Instruction::assign(
            var("t"),
            Instruction::BinaryOp {
                op: BinOp::Add,
                lhs: var("p"),
                rhs: Operand::int(1),
            },
        ));
        b.push(Instruction::Return(Some(var("t"))));
        let graph = graph_of(&b.build());

        assert_eq!(graph.vars(), &[sym("t")]);
    }

    #[test]
    fn remove_updates_degrees() {
        // build a triangle over a, b, c
        let mut b = MethodBuilder::new("tri")
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
            Instruction::SingleOp(Operand::int(2)),
        ));
        b.push(Instruction::assign(
            var("c"),
            Instruction::SingleOp(Operand::int(3)),
        ));
        b.push(Instruction::assign(
            var("a"),
            Instruction::BinaryOp {
                op: BinOp::Add,
                lhs: var("a"),
                rhs: var("b"),
            },
        ));
        b.push(Instruction::assign(
            var("a"),
            Instruction::BinaryOp {
                op: BinOp::Add,
                lhs: var("a"),
                rhs: var("c"),
            },
        ));
        b.push(Instruction::Return(Some(var("a"))));
        let mut graph = graph_of(&b.build());

        assert_eq!(graph.max_degree(), 2);
        graph.remove(sym("a"));
        assert_eq!(graph.vars(), &[sym("b"), sym("c")]);
        assert_eq!(graph.degree(sym("b")), 1);
        assert_eq!(graph.degree(sym("c")), 1);
    }
}
