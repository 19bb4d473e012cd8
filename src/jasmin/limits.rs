use crate::ir::{CallKind, Instruction, Method, Operand, Type};

/// Safety floor for `.limit stack`, methods never declare less.
const STACK_FLOOR: u32 = 4;

/// Worst-case operand stack depth for the method body.
///
/// Each three-address instruction runs from a resident depth back to it,
/// except the two shapes that leave a value behind: assigning a fresh
/// object (the `dup` under the constructor call survives) and a call
/// statement whose result is never stored. The limit is the running
/// maximum of resident depth plus the instruction's own peak. Overcounting
/// a little is fine, declaring less than the true depth is not.
pub fn stack_limit(method: &Method) -> u32 {
    let mut max = 0;
    let mut resident = 0;
    for instruction in &method.instructions {
        let (peak, residue) = instruction_effect(instruction);
        max = max.max(resident + peak);
        resident += residue;
    }
    max.max(STACK_FLOOR)
}

/// One more than the highest slot in the variable table, at least 1.
pub fn locals_limit(method: &Method) -> u32 {
    method
        .var_table
        .values()
        .map(|d| d.slot)
        .max()
        .map_or(1, |max| max + 1)
}

/// (peak above the instruction's starting depth, values left behind)
fn instruction_effect(instruction: &Instruction) -> (u32, u32) {
    match instruction {
        Instruction::Assign { dest, rhs } => match dest {
            Operand::ArrayElem { index, .. } => {
                let (rhs_peak, _) = expression_effect(rhs);
                let peak = (1 + operand_peak(index)).max(2 + rhs_peak);
                (peak, 0)
            }
            _ => {
                let (rhs_peak, rhs_depth) = expression_effect(rhs);
                let residue = rhs_depth
                    .checked_sub(1)
                    .expect("value-less expression in assignment");
                (rhs_peak, residue)
            }
        },
        Instruction::Return(None) | Instruction::Goto(_) => (0, 0),
        Instruction::Return(Some(value)) => (operand_peak(value), 0),
        Instruction::CondBranch { condition, .. } => {
            let peak = match condition.as_ref() {
                Instruction::BinaryOp { lhs, rhs, .. } => {
                    operand_peak(lhs).max(1 + operand_peak(rhs))
                }
                Instruction::SingleOp(operand) => operand_peak(operand),
                Instruction::UnaryOp { operand, .. } => operand_peak(operand),
                _ => unreachable!("condition rejected during emission"),
            };
            (peak, 0)
        }
        Instruction::PutField { object, value, .. } => {
            (operand_peak(object).max(1 + operand_peak(value)), 0)
        }
        Instruction::Call(_)
        | Instruction::SingleOp(_)
        | Instruction::BinaryOp { .. }
        | Instruction::UnaryOp { .. }
        | Instruction::GetField { .. } => expression_effect(instruction),
    }
}

/// (peak, values on the stack once the expression is done)
fn expression_effect(expression: &Instruction) -> (u32, u32) {
    match expression {
        Instruction::SingleOp(operand) => (operand_peak(operand), 1),
        Instruction::BinaryOp { lhs, rhs, .. } => {
            (operand_peak(lhs).max(1 + operand_peak(rhs)), 1)
        }
        Instruction::UnaryOp { operand, .. } => (operand_peak(operand).max(1), 1),
        Instruction::GetField { object, .. } => (operand_peak(object).max(1), 1),
        Instruction::Call(call) => {
            let depth = match &call.ret {
                Type::Void => 0,
                _ => 1,
            };
            match call.kind {
                CallKind::Virtual(_) | CallKind::Special(_) => {
                    let peak = sequence_peak(std::iter::once(&call.target).chain(&call.args));
                    (peak, depth)
                }
                CallKind::Static(_) => (sequence_peak(call.args.iter()), depth),
                // new object is `new` plus `dup`, both stay until stored
                CallKind::New if !matches!(call.ret, Type::Array(_)) => (2, 2),
                CallKind::New => (sequence_peak(call.args.iter()).max(1), 1),
                CallKind::ArrayLength => (operand_peak(&call.target), 1),
            }
        }
        _ => unreachable!("statement in expression position"),
    }
}

/// Peak depth while loading `operands` left to right, each settling to one
/// stack value.
fn sequence_peak<'a>(operands: impl Iterator<Item = &'a Operand>) -> u32 {
    let mut depth = 0;
    let mut peak = 0;
    for operand in operands {
        peak = peak.max(depth + operand_peak(operand));
        depth += 1;
    }
    peak
}

fn operand_peak(operand: &Operand) -> u32 {
    match operand {
        Operand::Var { .. } | Operand::Const(_) => 1,
        Operand::ArrayElem { index, .. } => 1 + operand_peak(index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{BinOp, CallInstr, MethodBuilder, Type},
        symbol::Symbol,
    };

    fn var(name: &str) -> Operand {
        Operand::var(name, Type::Int)
    }

    #[test]
    fn empty_method_gets_the_floor() {
        let mut b = MethodBuilder::new("noop").static_method();
        b.push(Instruction::Return(None));
        let method = b.build();

        assert_eq!(stack_limit(&method), 4);
        assert_eq!(locals_limit(&method), 1);
    }

    #[test]
    fn locals_cover_the_highest_slot() {
        let mut b = MethodBuilder::new("three")
            .receiver("Simple")
            .param("a", Type::Int)
            .local("t", Type::Int)
            .returns(Type::Int);
        b.push(Instruction::assign(
            var("t"),
            Instruction::BinaryOp {
                op: BinOp::Add,
                lhs: var("a"),
                rhs: Operand::int(1),
            },
        ));
        b.push(Instruction::Return(Some(var("t"))));
        let method = b.build();

        // this=0, a=1, t=2
        assert_eq!(locals_limit(&method), 3);
    }

    #[test]
    fn wide_call_raises_the_stack_above_the_floor() {
        // receiver plus four arguments peaks at five
        let mut b = MethodBuilder::new("wide")
            .receiver("Simple")
            .param("a", Type::Int)
            .param("b", Type::Int)
            .param("c", Type::Int)
            .param("d", Type::Int);
        b.push(Instruction::Call(CallInstr {
            kind: CallKind::Virtual(Symbol::new("quad")),
            target: Operand::var("this", Type::Object(Symbol::new("Simple"))),
            args: vec![var("a"), var("b"), var("c"), var("d")],
            ret: Type::Void,
        }));
        b.push(Instruction::Return(None));
        let method = b.build();

        assert_eq!(stack_limit(&method), 5);
    }

    #[test]
    fn constructed_objects_stay_resident() {
        // t1 := new Simple; invokespecial t1; t2 := new Simple;
        // invokespecial t2; t1.use(t2); return
        let simple = || Type::Object(Symbol::new("Simple"));
        let new_simple = || {
            Instruction::Call(CallInstr {
                kind: CallKind::New,
                target: Operand::var("Simple", simple()),
                args: vec![],
                ret: simple(),
            })
        };
        let init = |name: &str| {
            Instruction::Call(CallInstr {
                kind: CallKind::Special(Symbol::new("<init>")),
                target: Operand::var(name, simple()),
                args: vec![],
                ret: Type::Void,
            })
        };

        let mut b = MethodBuilder::new("pair")
            .static_method()
            .local("t1", simple())
            .local("t2", simple());
        b.push(Instruction::assign(Operand::var("t1", simple()), new_simple()));
        b.push(init("t1"));
        b.push(Instruction::assign(Operand::var("t2", simple()), new_simple()));
        b.push(init("t2"));
        b.push(Instruction::Call(CallInstr {
            kind: CallKind::Virtual(Symbol::new("use")),
            target: Operand::var("t1", simple()),
            args: vec![Operand::var("t2", simple())],
            ret: Type::Void,
        }));
        b.push(Instruction::Return(None));
        let method = b.build();

        // two dup leftovers resident when the virtual call peaks two more
        assert_eq!(stack_limit(&method), 4);
    }

    #[test]
    fn array_store_depth() {
        // a[i] := b[c[j]] + 1
        let mut b = MethodBuilder::new("copy")
            .static_method()
            .param("a", Type::array_of(Type::Int))
            .param("b", Type::array_of(Type::Int))
            .param("c", Type::array_of(Type::Int))
            .param("i", Type::Int)
            .param("j", Type::Int);
        b.push(Instruction::assign(
            Operand::array_elem("a", var("i"), Type::Int),
            Instruction::BinaryOp {
                op: BinOp::Add,
                lhs: Operand::array_elem(
                    "b",
                    Operand::array_elem("c", var("j"), Type::Int),
                    Type::Int,
                ),
                rhs: Operand::int(1),
            },
        ));
        b.push(Instruction::Return(None));
        let method = b.build();

        // base and index resident while the nested load peaks three deep
        assert_eq!(stack_limit(&method), 5);
    }
}
