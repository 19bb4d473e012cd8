use std::collections::HashMap;

use crate::{
    ir::{AccessModifier, Descriptor, Instruction, Method, Type, VarScope, VarTable},
    symbol::Symbol,
};

/// Assembles a [`Method`] in source order.
///
/// Slot numbering follows the JVM calling convention: the receiver of an
/// instance method takes slot 0, parameters the slots after it, declared
/// locals the slots after those. The register allocator may compact the
/// local slots later.
#[derive(Debug)]
pub struct MethodBuilder {
    name: Symbol,
    access: AccessModifier,
    is_static: bool,
    is_constructor: bool,
    receiver: Option<Symbol>,
    params: Vec<(Symbol, Type)>,
    locals: Vec<(Symbol, Type)>,
    return_type: Type,
    instructions: Vec<Instruction>,
    labels: HashMap<usize, Vec<Symbol>>,
    pending_labels: Vec<Symbol>,
}

impl MethodBuilder {
    pub fn new(name: impl Into<Symbol>) -> Self {
        Self {
            name: name.into(),
            access: AccessModifier::Public,
            is_static: false,
            is_constructor: false,
            receiver: None,
            params: Vec::new(),
            locals: Vec::new(),
            return_type: Type::Void,
            instructions: Vec::new(),
            labels: HashMap::new(),
            pending_labels: Vec::new(),
        }
    }

    pub fn access(mut self, access: AccessModifier) -> Self {
        self.access = access;
        self
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn constructor(mut self) -> Self {
        self.is_constructor = true;
        self
    }

    /// Declares the receiver class. Required for instance methods.
    pub fn receiver(mut self, class: impl Into<Symbol>) -> Self {
        self.receiver = Some(class.into());
        self
    }

    pub fn param(mut self, name: impl Into<Symbol>, ty: Type) -> Self {
        self.params.push((name.into(), ty));
        self
    }

    pub fn local(mut self, name: impl Into<Symbol>, ty: Type) -> Self {
        self.locals.push((name.into(), ty));
        self
    }

    pub fn returns(mut self, ty: Type) -> Self {
        self.return_type = ty;
        self
    }

    /// Attaches a label to the next pushed instruction.
    pub fn label(&mut self, name: impl Into<Symbol>) {
        self.pending_labels.push(name.into());
    }

    pub fn push(&mut self, instruction: Instruction) {
        if !self.pending_labels.is_empty() {
            self.labels
                .entry(self.instructions.len())
                .or_default()
                .append(&mut self.pending_labels);
        }
        self.instructions.push(instruction);
    }

    pub fn build(self) -> Method {
        assert!(
            self.pending_labels.is_empty(),
            "label without a following instruction"
        );

        let mut var_table = VarTable::new();
        let mut slot = 0u32;
        if !self.is_static {
            let class = self
                .receiver
                .expect("instance method without a receiver class");
            let prev = var_table.insert(
                Symbol::new("this"),
                Descriptor {
                    scope: VarScope::Receiver,
                    slot,
                    ty: Type::Object(class),
                },
            );
            assert!(prev.is_none());
            slot += 1;
        }
        for (name, ty) in &self.params {
            let prev = var_table.insert(
                *name,
                Descriptor {
                    scope: VarScope::Parameter,
                    slot,
                    ty: ty.clone(),
                },
            );
            assert!(prev.is_none(), "duplicate variable {}", name);
            slot += 1;
        }
        for (name, ty) in &self.locals {
            let prev = var_table.insert(
                *name,
                Descriptor {
                    scope: VarScope::Local,
                    slot,
                    ty: ty.clone(),
                },
            );
            assert!(prev.is_none(), "duplicate variable {}", name);
            slot += 1;
        }

        Method {
            name: self.name,
            access: self.access,
            is_static: self.is_static,
            is_constructor: self.is_constructor,
            params: self.params,
            return_type: self.return_type,
            instructions: self.instructions,
            var_table,
            labels: self.labels,
        }
    }
}
