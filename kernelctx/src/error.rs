//! Error types.
//!
//! Specialization failures ([`RewriteError`]) are raised once, when a
//! wrapper is first specialized for an argument signature, and are cached
//! alongside successful specializations. Execution failures ([`ExecError`])
//! come from the interpreter.

use thiserror::Error;

use crate::mir::DefId;
use crate::ty::Type;

/// Why a body could not be extracted from a program item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionFailure {
    #[error("item is an opaque host function: {0}")]
    Opaque(String),

    #[error("item was declared but never defined")]
    Undefined,
}

/// A specialization could not be produced. The whole rewrite is aborted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    #[error("cannot extract a body for `{name}`: {reason}")]
    Extraction {
        def_id: DefId,
        name: String,
        reason: ExtractionFailure,
    },

    #[error("call to unknown item {0}")]
    UnknownItem(DefId),

    #[error("`{name}` takes {expected} arguments but {found} were supplied")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("type mismatch in `{name}`: expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: Type,
        found: Type,
    },

    #[error("type parameter T{param} of `{name}` is not determined by its arguments")]
    UnboundParam { name: String, param: u32 },

    #[error("specializing `{name}` nests more than {limit} instances deep")]
    InstanceDepth { name: String, limit: usize },

    #[error("cannot type the arguments of the call to `{callee}` in `{caller}`")]
    UntypedCall { caller: String, callee: String },

    #[error("rewritten body of `{name}` is malformed: {}", errors.join("; "))]
    Malformed { name: String, errors: Vec<String> },
}

/// Execution of a kernel failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error("call depth exceeded {limit}")]
    StackOverflow { limit: usize },

    #[error("`{callee}` takes {expected} arguments but {found} were supplied")]
    Arity {
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid operand of type {found} for `{op}`")]
    InvalidOperand { op: String, found: Type },

    #[error("read of uninitialized local _{0}")]
    Uninitialized(u32),

    #[error("call to unknown item {0}")]
    UnknownItem(DefId),

    #[error("`{0}` has no executable body")]
    NoBody(String),

    #[error("callee is not a function constant")]
    IndirectCall,

    #[error("reached unreachable code in `{0}`")]
    Unreachable(String),

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("type parameter T{0} is not bound in this frame")]
    UnboundParam(u32),
}

/// Any failure of a contextualized call.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
