pub mod ir;
pub mod jasmin;
pub mod regalloc;
pub mod report;
pub mod symbol;

use std::{
    collections::HashSet,
    io::{self, Write},
};

use log::{debug, warn};
use thiserror::Error;

use crate::{ir::ClassUnit, report::Report};

/// How the register allocator treats the local variable slots.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RegisterBound {
    /// Keep the slots the front end assigned.
    #[default]
    Disabled,
    /// Pack the locals into as few slots as the interference graph allows.
    Auto,
    /// Pack the locals, refusing methods that need more than this many slots.
    Max(u32),
}

/// The back end: configure once, then run over any number of classes.
#[derive(Debug, Default, Clone)]
pub struct Backend {
    registers: RegisterBound,
}

impl Backend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registers(mut self, registers: RegisterBound) -> Self {
        self.registers = registers;
        self
    }

    /// Allocates registers (when enabled) and writes the Jasmin text for
    /// `class` to `w`.
    ///
    /// Returns the diagnostics gathered along the way. A method that cannot
    /// be allocated or lowered is reported and left out of the output while
    /// the rest of the class goes through.
    pub fn compile<W: Write>(
        &self,
        class: &mut ClassUnit,
        w: &mut W,
    ) -> Result<Vec<Report>, Error> {
        debug!("compiling class {}", class.name);

        let mut reports = Vec::new();
        let mut failed = HashSet::new();

        if let Some(bound) = self.bound() {
            for method in &mut class.methods {
                if method.is_constructor {
                    continue;
                }
                if let Err(err) = regalloc::allocate(method, bound) {
                    warn!("register allocation failed for {}: {}", method.name, err);
                    reports.push(Report::error(format!("method {}: {}", method.name, err)));
                    failed.insert(method.name);
                }
            }
        }

        jasmin::emit(class, &failed, &mut reports, w)?;
        Ok(reports)
    }

    /// `None` when allocation is off, otherwise the slot bound to pass down.
    fn bound(&self) -> Option<Option<u32>> {
        match self.registers {
            RegisterBound::Disabled => None,
            RegisterBound::Auto => Some(None),
            RegisterBound::Max(n) => Some(Some(n)),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
}
