//! # kernelctx
//!
//! Contextual call substitution for numeric kernels.
//!
//! A kernel is written once against ordinary math and arithmetic. Wrapping
//! it with [`contextualize`] and a target tag produces a callable whose
//! calls, on first use per argument-type signature, are rewritten:
//!
//! - scalar math calls (`sin`, `exp`, `sqrt`, ...) go to the target's device
//!   math library when it has a routine of exactly the argument width
//! - float `+`, `-` and `*` become contracted instructions, which may skip
//!   intermediate rounding and fuse into multiply-adds
//! - calls into other program items are specialized the same way and
//!   inlined, unless the site or the callee says otherwise
//!
//! Everything else, including control flow and the introspection
//! intrinsics, is left exactly as written.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use kernelctx::intrinsics::{Intrinsic, MathOp};
//! use kernelctx::mir::{BodyBuilder, LocalId, Operand};
//! use kernelctx::{contextualize, Cpu, Program, Type, Value};
//!
//! // g(x) = sin(x), generic over the float width
//! let mut b = BodyBuilder::new(vec![Type::Param(0)], Type::Param(0));
//! let x = b.param(0);
//! b.call(Operand::intrinsic(Intrinsic::Math(MathOp::Sin)), vec![Operand::copy(x)], LocalId::RETURN);
//! b.ret();
//!
//! let mut program = Program::new();
//! program.add("g", b.finish());
//! let g = Arc::new(program).kernel("g").unwrap();
//!
//! let on_cpu = contextualize(Cpu, g);
//! assert_eq!(on_cpu.call(&[Value::F32(0.5)]).unwrap(), Value::F32(0.5f32.sin()));
//! ```
//!
//! ## Module Overview
//!
//! - [`mir`] - Kernel intermediate representation
//! - [`table`] - Substitution table keyed by operation and argument types
//! - [`emit`] - Contracted arithmetic instructions
//! - [`rewrite`] - The contextual rewriter
//! - [`context`] - Wrappers and the specialization cache
//! - [`interp`] - Reference interpreter
//! - [`target`] - Capability tags

#[cfg(feature = "accel")]
pub mod accel;
pub mod cache;
pub mod config;
pub mod context;
pub mod device;
pub mod emit;
pub mod error;
pub mod interp;
pub mod intrinsics;
pub mod mir;
pub mod program;
pub mod rewrite;
pub mod span;
pub mod table;
pub mod target;
pub mod ty;
pub mod value;

pub use config::RewriteConfig;
pub use context::{contextualize, Context, Contextualized};
pub use error::{Error, ExecError, RewriteError};
pub use program::{FnAttrs, Kernel, Program};
pub use rewrite::{RewriteStats, Specialization};
#[cfg(feature = "accel")]
pub use target::Accel;
pub use target::{Cpu, Target};
pub use ty::Type;
pub use value::Value;
