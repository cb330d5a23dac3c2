//! # Substitution Table
//!
//! A closed mapping from `(operation, argument types)` to a replacement.
//! Built once per target and read-only afterwards.
//!
//! Lookup is exact on the type signature: `sin(f32)` never matches an
//! entry for `sin(f64)`, and a signature with any other type simply has no
//! entry.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::{MathLibrary, Routine};
use crate::emit::FusedOp;
use crate::intrinsics::{ArithOp, MathOp};
use crate::ty::{FloatWidth, Type};

/// Identity of a substitutable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OpId {
    Math(MathOp),
    Arith(ArithOp),
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpId::Math(op) => write!(f, "{}", op.name()),
            OpId::Arith(op) => write!(f, "({})", op.symbol()),
        }
    }
}

/// What a matched call is replaced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replacement {
    /// A device library routine.
    Routine(Routine),
    /// A contracted arithmetic instruction from the emitter.
    Fused(FusedOp),
}

impl Replacement {
    /// Symbol of the replacement, for logs.
    pub fn symbol(&self) -> &'static str {
        match self {
            Replacement::Routine(r) => r.name,
            Replacement::Fused(op) => op.symbol(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SubstKey {
    op: OpId,
    signature: Vec<Type>,
}

/// The substitution table of one target.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionTable {
    entries: HashMap<SubstKey, Replacement>,
    library: Option<&'static str>,
}

impl SubstitutionTable {
    /// A table with no entries. Every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the table for a device library. Without a library the table
    /// is empty: both the math routines and the contracted arithmetic are
    /// device capabilities.
    pub fn build(library: Option<&dyn MathLibrary>) -> Self {
        let Some(library) = library else {
            return Self::empty();
        };

        let mut table = Self { entries: HashMap::new(), library: Some(library.name()) };
        for &op in MathOp::ALL {
            for width in FloatWidth::ALL {
                if let Some(routine) = library.routine(op, width) {
                    table.insert(OpId::Math(op), vec![width.ty()], Replacement::Routine(routine));
                }
            }
        }
        for fused in FusedOp::ALL {
            let ty = fused.width.ty();
            table.insert(OpId::Arith(fused.op), vec![ty.clone(), ty], Replacement::Fused(fused));
        }
        table
    }

    fn insert(&mut self, op: OpId, signature: Vec<Type>, replacement: Replacement) {
        self.entries.insert(SubstKey { op, signature }, replacement);
    }

    /// Find the replacement for `op` called with exactly `arg_types`.
    pub fn lookup(&self, op: OpId, arg_types: &[Type]) -> Option<&Replacement> {
        if self.entries.is_empty() || arg_types.iter().any(|t| t.float_width().is_none()) {
            return None;
        }
        self.entries.get(&SubstKey { op, signature: arg_types.to_vec() })
    }

    /// Name of the library the table was built from.
    pub fn library(&self) -> Option<&'static str> {
        self.library
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (OpId, &[Type], &Replacement)> {
        self.entries.iter().map(|(k, r)| (k.op, k.signature.as_slice(), r))
    }
}
