pub mod limits;

use std::collections::HashSet;
use std::io::{self, Write};

use log::debug;
use thiserror::Error;

use crate::{
    ir::{
        AccessModifier, BinOp, CallInstr, CallKind, ClassUnit, Descriptor, Instruction, Literal,
        Method, Operand, Type, UnOp,
    },
    report::Report,
    symbol::Symbol,
};

const TAB: &str = "   ";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("unsupported construct: {construct}")]
    Unsupported { construct: String },
}

impl EmitError {
    fn unsupported(construct: impl Into<String>) -> Self {
        EmitError::Unsupported {
            construct: construct.into(),
        }
    }
}

/// Writes the Jasmin text for `class`.
///
/// Constructors are replaced by the canned default constructor. Methods
/// named in `skip` produce no output, and a method that fails to lower is
/// reported and dropped the same way while its siblings continue.
pub fn emit<W: Write>(
    class: &ClassUnit,
    skip: &HashSet<Symbol>,
    reports: &mut Vec<Report>,
    w: &mut W,
) -> io::Result<()> {
    debug!("emitting class {}", class.name);

    let mut text = String::new();
    text.push_str(&format!(".class public {}\n", class.name));
    let super_name = match class.super_class {
        Some(name) => name.to_string(),
        None => "java/lang/Object".to_string(),
    };
    text.push_str(&format!(".super {}\n", super_name));
    text.push('\n');

    for field in &class.fields {
        text.push_str(&format!(
            ".field {}{} {}\n",
            modifier(field.access),
            field.name,
            jasmin_type(&field.ty)
        ));
    }
    if !class.fields.is_empty() {
        text.push('\n');
    }

    text.push_str(&default_constructor(&super_name));

    for method in &class.methods {
        if method.is_constructor || skip.contains(&method.name) {
            continue;
        }
        match emit_method(class, method) {
            Ok(code) => text.push_str(&code),
            Err(err) => reports.push(Report::error(format!("method {}: {}", method.name, err))),
        }
    }

    w.write_all(text.as_bytes())
}

/// Every class gets the same no-argument constructor chaining to its super
/// class, so upstream constructor bodies are never lowered.
fn default_constructor(super_name: &str) -> String {
    let mut code = String::new();
    code.push_str(".method public <init>()V\n");
    code.push_str("    .limit stack 1\n");
    code.push_str("    .limit locals 1\n");
    code.push_str("    aload_0\n");
    code.push_str(&format!("    invokespecial {}/<init>()V\n", super_name));
    code.push_str("    return\n");
    code.push_str(".end method\n\n");
    code
}

/// Lowers one method. The body is generated first so the limits only ever
/// describe code that actually assembled; attached labels print unindented,
/// instruction lines get one [`TAB`].
fn emit_method(class: &ClassUnit, method: &Method) -> Result<String, EmitError> {
    let mut emitter = MethodEmitter {
        class,
        method,
        labels: 0,
    };

    let mut body = String::new();
    for (index, instruction) in method.instructions.iter().enumerate() {
        if let Some(labels) = method.labels.get(&index) {
            for label in labels {
                body.push_str(&format!("{}:\n", label));
            }
        }
        let code = emitter.instruction(instruction)?;
        for line in code.lines() {
            body.push_str(TAB);
            body.push_str(line);
            body.push('\n');
        }
    }

    let mut modifier = modifier(method.access).to_string();
    if method.is_static {
        modifier.push_str("static ");
    }
    let params: String = method
        .params
        .iter()
        .map(|(_, ty)| jasmin_type(ty))
        .collect();

    let mut code = String::new();
    code.push_str(&format!(
        ".method {}{}({}){}\n",
        modifier,
        method.name,
        params,
        jasmin_type(&method.return_type)
    ));
    code.push_str(&format!(
        "{}.limit stack {}\n",
        TAB,
        limits::stack_limit(method)
    ));
    code.push_str(&format!(
        "{}.limit locals {}\n",
        TAB,
        limits::locals_limit(method)
    ));
    code.push_str(&body);
    code.push_str(".end method\n");
    Ok(code)
}

struct MethodEmitter<'a> {
    class: &'a ClassUnit,
    method: &'a Method,
    labels: u32,
}

impl MethodEmitter<'_> {
    /// Labels for lowered comparisons come off a per-method counter, so the
    /// same class always assembles to the same text.
    fn fresh_label(&mut self, prefix: &str) -> String {
        let n = self.labels;
        self.labels += 1;
        format!("{}_{}", prefix, n)
    }

    fn instruction(&mut self, instruction: &Instruction) -> Result<String, EmitError> {
        match instruction {
            Instruction::Assign { dest, rhs } => self.assign(dest, rhs),
            Instruction::SingleOp(operand) => Ok(self.operand(operand)),
            Instruction::BinaryOp { op, lhs, rhs } => Ok(self.binary_op(*op, lhs, rhs)),
            Instruction::UnaryOp { op, operand } => Ok(self.unary_op(*op, operand)),
            Instruction::Call(call) => Ok(self.call(call)),
            Instruction::Return(value) => Ok(self.ret(value.as_ref())),
            Instruction::CondBranch { condition, target } => self.cond_branch(condition, *target),
            Instruction::Goto(target) => Ok(format!("goto {}\n", target)),
            Instruction::GetField { object, field, ty } => Ok(self.get_field(object, *field, ty)),
            Instruction::PutField {
                object,
                field,
                value,
                ty,
            } => Ok(self.put_field(object, *field, value, ty)),
        }
    }

    /// Values on the right of an assignment or inside a branch condition.
    fn expression(&mut self, expression: &Instruction) -> Result<String, EmitError> {
        match expression {
            Instruction::SingleOp(operand) => Ok(self.operand(operand)),
            Instruction::BinaryOp { op, lhs, rhs } => Ok(self.binary_op(*op, lhs, rhs)),
            Instruction::UnaryOp { op, operand } => Ok(self.unary_op(*op, operand)),
            Instruction::GetField { object, field, ty } => Ok(self.get_field(object, *field, ty)),
            Instruction::Call(call) => {
                if call.ret == Type::Void {
                    return Err(EmitError::unsupported("assignment of a void call"));
                }
                Ok(self.call(call))
            }
            other => Err(EmitError::unsupported(format!(
                "{} in expression position",
                shape(other)
            ))),
        }
    }

    fn assign(&mut self, dest: &Operand, rhs: &Instruction) -> Result<String, EmitError> {
        if let Some((slot, amount)) = self.increment(dest, rhs) {
            return Ok(format!("iinc {} {}\n", slot, amount));
        }

        if let Operand::ArrayElem { array, index, ty } = dest {
            let mut code = self.load_var(*array);
            code.push_str(&self.operand(index));
            code.push_str(&self.expression(rhs)?);
            code.push_str(if ty.is_reference() {
                "aastore\n"
            } else {
                "iastore\n"
            });
            return Ok(code);
        }

        let mut code = self.expression(rhs)?;
        code.push_str(&self.store_var(dest));
        Ok(code)
    }

    /// `x := x + c` and `x := x - c` collapse to `iinc` when the amount
    /// fits the instruction's signed byte operand.
    fn increment(&self, dest: &Operand, rhs: &Instruction) -> Option<(u32, i32)> {
        let dest_name = match dest {
            Operand::Var { name, .. } => *name,
            _ => return None,
        };
        let (op, lhs, rhs) = match rhs {
            Instruction::BinaryOp { op, lhs, rhs } => (op, lhs, rhs),
            _ => return None,
        };
        let value = match rhs {
            Operand::Const(Literal::Int(value)) => *value,
            _ => return None,
        };
        match lhs {
            Operand::Var { name, .. } if *name == dest_name => {}
            _ => return None,
        }
        let amount = match op {
            BinOp::Add => value,
            BinOp::Sub => value.checked_neg()?,
            _ => return None,
        };
        if !(-128..=127).contains(&amount) {
            return None;
        }
        Some((self.descriptor(dest_name).slot, amount))
    }

    fn binary_op(&mut self, op: BinOp, lhs: &Operand, rhs: &Operand) -> String {
        if op.is_comparison() {
            return self.comparison(op, lhs, rhs);
        }

        let mnemonic = match op {
            BinOp::Add => "iadd",
            BinOp::Sub => "isub",
            BinOp::Mul => "imul",
            BinOp::Div => "idiv",
            BinOp::And => "iand",
            _ => unreachable!(),
        };
        let mut code = self.operand(lhs);
        code.push_str(&self.operand(rhs));
        code.push_str(mnemonic);
        code.push('\n');
        code
    }

    /// A comparison in value position materializes 0 or 1 through a branch
    /// pair over two fresh labels. Comparing less-than against literal zero
    /// needs only the left operand and `iflt`.
    fn comparison(&mut self, op: BinOp, lhs: &Operand, rhs: &Operand) -> String {
        let prefix = match op {
            BinOp::Lt => "LT",
            BinOp::Gt => "GT",
            BinOp::Le => "LE",
            BinOp::Ge => "GE",
            BinOp::Eq => "EQ",
            BinOp::Ne => "NE",
            _ => unreachable!(),
        };
        let true_label = self.fresh_label(&format!("{}_TRUE", prefix));
        let end_label = self.fresh_label(&format!("{}_END", prefix));

        let mut code = String::new();
        if op == BinOp::Lt && matches!(rhs, Operand::Const(Literal::Int(0))) {
            code.push_str(&self.operand(lhs));
            code.push_str(&format!("iflt {}\n", true_label));
        } else {
            code.push_str(&self.operand(lhs));
            code.push_str(&self.operand(rhs));
            code.push_str(&format!("{} {}\n", branch_mnemonic(op), true_label));
        }
        code.push_str("iconst_0\n");
        code.push_str(&format!("goto {}\n", end_label));
        code.push_str(&format!("{}:\n", true_label));
        code.push_str("iconst_1\n");
        code.push_str(&format!("{}:\n", end_label));
        code
    }

    fn unary_op(&mut self, op: UnOp, operand: &Operand) -> String {
        match op {
            UnOp::Not => {
                let true_label = self.fresh_label("NOT_TRUE");
                let end_label = self.fresh_label("NOT_END");

                let mut code = self.operand(operand);
                code.push_str(&format!("ifeq {}\n", true_label));
                code.push_str("iconst_0\n");
                code.push_str(&format!("goto {}\n", end_label));
                code.push_str(&format!("{}:\n", true_label));
                code.push_str("iconst_1\n");
                code.push_str(&format!("{}:\n", end_label));
                code
            }
        }
    }

    fn call(&self, call: &CallInstr) -> String {
        match &call.kind {
            CallKind::Virtual(name) => {
                let mut code = self.operand(&call.target);
                code.push_str(&self.load_args(&call.args));
                code.push_str(&format!(
                    "invokevirtual {}/{}{}\n",
                    self.operand_class(&call.target),
                    name,
                    method_descriptor(&call.args, &call.ret)
                ));
                code
            }
            CallKind::Special(name) => {
                let mut code = self.operand(&call.target);
                code.push_str(&self.load_args(&call.args));
                code.push_str(&format!(
                    "invokespecial {}/{}{}\n",
                    self.operand_class(&call.target),
                    name,
                    method_descriptor(&call.args, &call.ret)
                ));
                code
            }
            CallKind::Static(name) => {
                let class = match &call.target {
                    Operand::Var { name, .. } => name.to_string(),
                    _ => unreachable!("static call target"),
                };
                let mut code = self.load_args(&call.args);
                code.push_str(&format!(
                    "invokestatic {}/{}{}\n",
                    class,
                    name,
                    method_descriptor(&call.args, &call.ret)
                ));
                code
            }
            CallKind::New => match &call.ret {
                Type::Array(elem) => {
                    let mut code = self.load_args(&call.args);
                    match elem.as_ref() {
                        Type::Int => code.push_str("newarray int\n"),
                        Type::Boolean => code.push_str("newarray boolean\n"),
                        other => code.push_str(&format!("anewarray {}\n", class_name(other))),
                    }
                    code
                }
                other => format!("new {}\ndup\n", class_name(other)),
            },
            CallKind::ArrayLength => {
                let mut code = self.operand(&call.target);
                code.push_str("arraylength\n");
                code
            }
        }
    }

    fn ret(&self, value: Option<&Operand>) -> String {
        match value {
            None => "return\n".to_string(),
            Some(operand) => {
                let mut code = self.operand(operand);
                code.push_str(if operand.ty().is_reference() {
                    "areturn\n"
                } else {
                    "ireturn\n"
                });
                code
            }
        }
    }

    fn cond_branch(&mut self, condition: &Instruction, target: Symbol) -> Result<String, EmitError> {
        match condition {
            Instruction::BinaryOp { op, lhs, rhs } if op.is_comparison() => {
                let mut code = self.operand(lhs);
                code.push_str(&self.operand(rhs));
                code.push_str(&format!("{} {}\n", branch_mnemonic(*op), target));
                Ok(code)
            }
            Instruction::SingleOp(operand) => {
                let mut code = self.operand(operand);
                code.push_str(&format!("ifne {}\n", target));
                Ok(code)
            }
            Instruction::UnaryOp {
                op: UnOp::Not,
                operand,
            } => {
                let mut code = self.operand(operand);
                code.push_str(&format!("ifeq {}\n", target));
                Ok(code)
            }
            other => Err(EmitError::unsupported(format!(
                "{} as a branch condition",
                shape(other)
            ))),
        }
    }

    fn get_field(&self, object: &Operand, field: Symbol, ty: &Type) -> String {
        let mut code = self.operand(object);
        code.push_str(&format!(
            "getfield {}/{} {}\n",
            self.operand_class(object),
            field,
            jasmin_type(ty)
        ));
        code
    }

    fn put_field(&self, object: &Operand, field: Symbol, value: &Operand, ty: &Type) -> String {
        let mut code = self.operand(object);
        code.push_str(&self.operand(value));
        code.push_str(&format!(
            "putfield {}/{} {}\n",
            self.operand_class(object),
            field,
            jasmin_type(ty)
        ));
        code
    }

    fn operand(&self, operand: &Operand) -> String {
        match operand {
            Operand::Var { name, .. } => self.load_var(*name),
            Operand::Const(literal) => load_literal(*literal),
            Operand::ArrayElem { array, index, ty } => {
                let mut code = self.load_var(*array);
                code.push_str(&self.operand(index));
                code.push_str(if ty.is_reference() {
                    "aaload\n"
                } else {
                    "iaload\n"
                });
                code
            }
        }
    }

    fn load_args(&self, args: &[Operand]) -> String {
        args.iter().map(|arg| self.operand(arg)).collect()
    }

    fn load_var(&self, name: Symbol) -> String {
        let descriptor = self.descriptor(name);
        let prefix = if descriptor.ty.is_reference() { "a" } else { "i" };
        match descriptor.slot {
            slot @ 0..=3 => format!("{}load_{}\n", prefix, slot),
            slot => format!("{}load {}\n", prefix, slot),
        }
    }

    fn store_var(&self, dest: &Operand) -> String {
        let name = match dest {
            Operand::Var { name, .. } => *name,
            _ => unreachable!("store destination"),
        };
        let descriptor = self.descriptor(name);
        let prefix = if descriptor.ty.is_reference() { "a" } else { "i" };
        match descriptor.slot {
            slot @ 0..=3 => format!("{}store_{}\n", prefix, slot),
            slot => format!("{}store {}\n", prefix, slot),
        }
    }

    fn descriptor(&self, name: Symbol) -> &Descriptor {
        self.method
            .var_table
            .get(&name)
            .unwrap_or_else(|| panic!("variable {} missing from the table", name))
    }

    /// Owning class for a member access, read off the receiver's declared
    /// type. Falls back to the current class.
    fn operand_class(&self, operand: &Operand) -> String {
        match operand.ty() {
            Type::Object(name) => name.to_string(),
            Type::String => "java/lang/String".to_string(),
            _ => self.class.name.to_string(),
        }
    }
}

fn branch_mnemonic(op: BinOp) -> &'static str {
    match op {
        BinOp::Lt => "if_icmplt",
        BinOp::Gt => "if_icmpgt",
        BinOp::Le => "if_icmple",
        BinOp::Ge => "if_icmpge",
        BinOp::Eq => "if_icmpeq",
        BinOp::Ne => "if_icmpne",
        _ => unreachable!("not a comparison"),
    }
}

fn load_literal(literal: Literal) -> String {
    match literal {
        Literal::Int(value) => match value {
            -1 => "iconst_m1\n".to_string(),
            0..=5 => format!("iconst_{}\n", value),
            -128..=127 => format!("bipush {}\n", value),
            -32768..=32767 => format!("sipush {}\n", value),
            _ => format!("ldc {}\n", value),
        },
        Literal::Bool(value) => {
            if value {
                "iconst_1\n".to_string()
            } else {
                "iconst_0\n".to_string()
            }
        }
    }
}

fn jasmin_type(ty: &Type) -> String {
    match ty {
        Type::Int => "I".to_string(),
        Type::Boolean => "Z".to_string(),
        Type::Void => "V".to_string(),
        Type::String => "Ljava/lang/String;".to_string(),
        Type::Array(elem) => format!("[{}", jasmin_type(elem)),
        Type::Object(name) => format!("L{};", name),
    }
}

/// Bare internal name, for `new`, `anewarray` and member owners.
fn class_name(ty: &Type) -> String {
    match ty {
        Type::Object(name) => name.to_string(),
        Type::String => "java/lang/String".to_string(),
        other => unreachable!("no class for {:?}", other),
    }
}

fn method_descriptor(args: &[Operand], ret: &Type) -> String {
    let params: String = args.iter().map(|arg| jasmin_type(&arg.ty())).collect();
    format!("({}){}", params, jasmin_type(ret))
}

fn modifier(access: AccessModifier) -> &'static str {
    match access {
        AccessModifier::Public => "public ",
        AccessModifier::Private => "private ",
        AccessModifier::Default => "",
    }
}

fn shape(instruction: &Instruction) -> &'static str {
    match instruction {
        Instruction::Assign { .. } => "assignment",
        Instruction::SingleOp(_) => "operand",
        Instruction::BinaryOp { .. } => "binary operation",
        Instruction::UnaryOp { .. } => "unary operation",
        Instruction::Call(_) => "call",
        Instruction::Return(_) => "return",
        Instruction::CondBranch { .. } => "conditional branch",
        Instruction::Goto(_) => "goto",
        Instruction::GetField { .. } => "getfield",
        Instruction::PutField { .. } => "putfield",
    }
}
