//! # Kernel MIR
//!
//! A control-flow-graph intermediate representation of kernel functions.
//! Calls are block terminators with a typed callee constant, which is what
//! the rewriter intercepts.
//!
//! ## Module Structure
//!
//! - [`types`]: identifiers, statements, terminators, operands, constants
//! - [`body`]: function bodies and locals
//! - [`builder`]: incremental body construction
//! - [`visitor`]: immutable and mutable traversal
//! - [`validate`]: well-formedness checks
//! - `pretty`: `Display` implementations

pub mod body;
pub mod builder;
mod pretty;
pub mod types;
pub mod validate;
pub mod visitor;

pub use body::{LocalKind, MirBody, MirLocal};
pub use builder::BodyBuilder;
pub use types::{
    AggregateKind, BasicBlockData, BasicBlockId, BinOp, Constant, ConstantKind, DefId, FloatMode,
    InlineDirective, LocalId, Operand, Place, PlaceElem, Rvalue, Statement, StatementKind,
    SwitchTargets, Terminator, TerminatorKind, UnOp,
};
pub use validate::{validate_body, Phase};
pub use visitor::{walk_body, LocalUses, Location, MutVisitor, PlaceContext, Visitor};
