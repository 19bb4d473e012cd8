pub mod color;
pub mod flow;
pub mod interference;
pub mod liveness;

use std::collections::HashSet;

use itertools::Itertools;
use log::{debug, trace};

pub use color::AllocError;

use crate::ir::{Method, VarScope};

use self::{color::Coloring, flow::FlowGraph, interference::InterferenceGraph};

/// Runs the allocation pipeline over one method and rewrites its local
/// slots in place. `bound` of `None` uses as few slots as the conflicts
/// allow; `Some(k)` enforces k and fails when the body cannot be colored.
///
/// Receiver and parameter slots are left untouched. On failure the table
/// is not modified at all.
pub fn allocate(method: &mut Method, bound: Option<u32>) -> Result<(), AllocError> {
    debug!("allocating registers for method {}", method.name);

    let flow = FlowGraph::build(method);
    let live = liveness::analyze(method, &flow);
    let graph = InterferenceGraph::build(method, &live);

    let reserved = reserved_slots(method);
    trace!(
        "method {}: {} conflict nodes, reserved slots {:?}",
        method.name,
        graph.vars().len(),
        reserved.iter().sorted().collect::<Vec<_>>()
    );

    let coloring = color::color(&graph, &reserved, bound)?;
    apply(method, &coloring);

    let slots = coloring.values().unique().count();
    debug!(
        "method {}: {} locals packed into {} slots",
        method.name,
        coloring.len(),
        slots
    );
    Ok(())
}

/// Slots already taken by the receiver and the parameters. Recomputed for
/// every method, the numbering restarts per method.
fn reserved_slots(method: &Method) -> HashSet<u32> {
    method
        .var_table
        .values()
        .filter(|d| matches!(d.scope, VarScope::Receiver | VarScope::Parameter))
        .map(|d| d.slot)
        .collect()
}

fn apply(method: &mut Method, coloring: &Coloring) {
    for (name, &slot) in coloring {
        let descriptor = method
            .var_table
            .get_mut(name)
            .expect("colored variable in the table");
        assert_eq!(descriptor.scope, VarScope::Local);
        descriptor.slot = slot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{BinOp, Instruction, MethodBuilder, Operand, Type},
        symbol::Symbol,
    };

    fn var(name: &str) -> Operand {
        Operand::var(name, Type::Int)
    }

    fn sym(name: &str) -> Symbol {
        Symbol::new(name)
    }

    // sum := a + b over params, then shifted into two disjoint temps
    fn method() -> Method {
        let mut b = MethodBuilder::new("calc")
            .receiver("Calc")
            .param("a", Type::Int)
            .param("b", Type::Int)
            .local("t1", Type::Int)
            .local("t2", Type::Int)
            .returns(Type::Int);
        b.push(Instruction::assign(
            var("t1"),
            Instruction::BinaryOp {
                op: BinOp::Add,
                lhs: var("a"),
                rhs: var("b"),
            },
        ));
        b.push(Instruction::assign(
            var("t2"),
            Instruction::BinaryOp {
                op: BinOp::Mul,
                lhs: var("t1"),
                rhs: Operand::int(2),
            },
        ));
        b.push(Instruction::Return(Some(var("t2"))));
        b.build()
    }

    #[test]
    fn locals_pack_after_parameters() {
        let mut method = method();
        allocate(&mut method, None).unwrap();

        // this=0, a=1, b=2 stay put; t1 and t2 never overlap
        assert_eq!(method.var_table[&sym("this")].slot, 0);
        assert_eq!(method.var_table[&sym("a")].slot, 1);
        assert_eq!(method.var_table[&sym("b")].slot, 2);
        assert_eq!(method.var_table[&sym("t1")].slot, 3);
        assert_eq!(method.var_table[&sym("t2")].slot, 3);
    }

    #[test]
    fn failure_leaves_table_untouched() {
        // t1 and t2 forced live together
        let mut b = MethodBuilder::new("clash")
            .static_method()
            .local("t1", Type::Int)
            .local("t2", Type::Int)
            .returns(Type::Int);
        b.push(Instruction::assign(
            var("t1"),
            Instruction::SingleOp(Operand::int(1)),
        ));
        b.push(Instruction::assign(
            var("t2"),
            Instruction::SingleOp(Operand::int(2)),
        ));
        b.push(Instruction::assign(
            var("t1"),
            Instruction::BinaryOp {
                op: BinOp::Add,
                lhs: var("t1"),
                rhs: var("t2"),
            },
        ));
        b.push(Instruction::Return(Some(var("t1"))));
        let mut method = b.build();

        let before = method.var_table.clone();
        let err = allocate(&mut method, Some(1)).unwrap_err();
        assert_eq!(err, AllocError::Infeasible { bound: 1, min: 2 });
        assert_eq!(method.var_table, before);
    }
}
