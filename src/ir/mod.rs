mod builder;

pub use builder::MethodBuilder;

use std::collections::HashMap;

use strum::EnumIter;

use crate::symbol::Symbol;

/// One class worth of IR: the unit handed to the back end.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassUnit {
    pub name: Symbol,
    pub super_class: Option<Symbol>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
}

impl ClassUnit {
    pub fn new(name: impl Into<Symbol>) -> Self {
        Self {
            name: name.into(),
            super_class: None,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn with_super(mut self, name: impl Into<Symbol>) -> Self {
        self.super_class = Some(name.into());
        self
    }

    pub fn push_field(&mut self, access: AccessModifier, name: impl Into<Symbol>, ty: Type) {
        self.fields.push(Field {
            access,
            name: name.into(),
            ty,
        });
    }

    pub fn push_method(&mut self, method: Method) {
        self.methods.push(method);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub access: AccessModifier,
    pub name: Symbol,
    pub ty: Type,
}

/// A method body in three-address form.
///
/// `instructions` is the ordered body. `labels` maps an instruction index to
/// the labels attached in front of that instruction; branch targets resolve
/// through it. `var_table` maps every variable name appearing in the body to
/// its [`Descriptor`].
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: Symbol,
    pub access: AccessModifier,
    pub is_static: bool,
    pub is_constructor: bool,
    pub params: Vec<(Symbol, Type)>,
    pub return_type: Type,
    pub instructions: Vec<Instruction>,
    pub var_table: VarTable,
    pub labels: HashMap<usize, Vec<Symbol>>,
}

pub type VarTable = HashMap<Symbol, Descriptor>;

/// Where a variable lives and which JVM local slot it occupies.
///
/// Receiver and parameter slots are fixed by the calling convention and are
/// never reassigned. Local slots are the register allocator's to rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub scope: VarScope,
    pub slot: u32,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarScope {
    Receiver,
    Parameter,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessModifier {
    Public,
    Private,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Boolean,
    Void,
    String,
    Array(Box<Type>),
    Object(Symbol),
}

impl Type {
    pub fn array_of(elem: Type) -> Self {
        Type::Array(Box::new(elem))
    }

    /// Reference types load and store with the `a`-prefixed instructions,
    /// everything else in this language is computational-type int.
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::String | Type::Array(_) | Type::Object(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Assign {
        dest: Operand,
        rhs: Box<Instruction>,
    },
    SingleOp(Operand),
    BinaryOp {
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
    },
    UnaryOp {
        op: UnOp,
        operand: Operand,
    },
    Call(CallInstr),
    Return(Option<Operand>),
    CondBranch {
        condition: Box<Instruction>,
        target: Symbol,
    },
    Goto(Symbol),
    GetField {
        object: Operand,
        field: Symbol,
        ty: Type,
    },
    PutField {
        object: Operand,
        field: Symbol,
        value: Operand,
        ty: Type,
    },
}

impl Instruction {
    pub fn assign(dest: Operand, rhs: Instruction) -> Self {
        Instruction::Assign {
            dest,
            rhs: Box::new(rhs),
        }
    }

    pub fn cond_branch(condition: Instruction, target: impl Into<Symbol>) -> Self {
        Instruction::CondBranch {
            condition: Box::new(condition),
            target: target.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallInstr {
    pub kind: CallKind,
    /// Receiver object, class reference or array, depending on `kind`.
    pub target: Operand,
    pub args: Vec<Operand>,
    pub ret: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallKind {
    Virtual(Symbol),
    Special(Symbol),
    Static(Symbol),
    New,
    ArrayLength,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Var { name: Symbol, ty: Type },
    Const(Literal),
    ArrayElem {
        array: Symbol,
        index: Box<Operand>,
        ty: Type,
    },
}

impl Operand {
    pub fn var(name: impl Into<Symbol>, ty: Type) -> Self {
        Operand::Var {
            name: name.into(),
            ty,
        }
    }

    pub fn int(value: i32) -> Self {
        Operand::Const(Literal::Int(value))
    }

    pub fn bool(value: bool) -> Self {
        Operand::Const(Literal::Bool(value))
    }

    pub fn array_elem(array: impl Into<Symbol>, index: Operand, ty: Type) -> Self {
        Operand::ArrayElem {
            array: array.into(),
            index: Box::new(index),
            ty,
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            Operand::Var { ty, .. } => ty.clone(),
            Operand::Const(Literal::Int(_)) => Type::Int,
            Operand::Const(Literal::Bool(_)) => Type::Boolean,
            Operand::ArrayElem { ty, .. } => ty.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal {
    Int(i32),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    /// Comparisons lower to a branch pair, the rest to a single
    /// arithmetic or logical instruction.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
}
