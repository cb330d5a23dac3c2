//! # Device Math Libraries
//!
//! A device math library is an opaque capability table: for a math
//! operation and a float width it either provides a [`Routine`] with the
//! same mathematical meaning, or nothing. The substitution table is built
//! from whatever a library provides.

use std::fmt;

use crate::error::ExecError;
use crate::intrinsics::MathOp;
use crate::ty::FloatWidth;
use crate::value::Value;

/// Typed entry point of a device routine.
#[derive(Clone, Copy)]
pub enum RoutineImpl {
    F32(fn(f32) -> f32),
    F64(fn(f64) -> f64),
    PredF32(fn(f32) -> bool),
    PredF64(fn(f64) -> bool),
}

impl RoutineImpl {
    /// Argument width of the routine.
    pub fn width(&self) -> FloatWidth {
        match self {
            RoutineImpl::F32(_) | RoutineImpl::PredF32(_) => FloatWidth::F32,
            RoutineImpl::F64(_) | RoutineImpl::PredF64(_) => FloatWidth::F64,
        }
    }
}

/// A replacement routine provided by a device math library.
#[derive(Clone, Copy)]
pub struct Routine {
    /// Symbol name in the device library.
    pub name: &'static str,
    pub imp: RoutineImpl,
}

impl Routine {
    pub const fn new(name: &'static str, imp: RoutineImpl) -> Self {
        Self { name, imp }
    }

    /// Invoke the routine on interpreter values. The argument must have the
    /// routine's exact width.
    pub fn call(&self, args: &[Value]) -> Result<Value, ExecError> {
        if args.len() != 1 {
            return Err(ExecError::Arity {
                callee: self.name.to_string(),
                expected: 1,
                found: args.len(),
            });
        }
        match (self.imp, &args[0]) {
            (RoutineImpl::F32(f), Value::F32(x)) => Ok(Value::F32(f(*x))),
            (RoutineImpl::F64(f), Value::F64(x)) => Ok(Value::F64(f(*x))),
            (RoutineImpl::PredF32(f), Value::F32(x)) => Ok(Value::Bool(f(*x))),
            (RoutineImpl::PredF64(f), Value::F64(x)) => Ok(Value::Bool(f(*x))),
            (_, other) => Err(ExecError::InvalidOperand {
                op: self.name.to_string(),
                found: other.ty(),
            }),
        }
    }
}

impl fmt::Debug for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Routine({})", self.name)
    }
}

impl PartialEq for Routine {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Routine {}

/// An accelerator math library.
pub trait MathLibrary: Send + Sync {
    /// Library name, for diagnostics.
    fn name(&self) -> &'static str;

    /// The routine implementing `op` at `width`, if the library has one.
    fn routine(&self, op: MathOp, width: FloatWidth) -> Option<Routine>;
}
