//! Runtime values passed to and returned from kernels.

use std::fmt;
use std::sync::Arc;

use crate::mir::DefId;
use crate::ty::{StructDef, Type};

/// A kernel value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Tuple(Vec<Value>),
    Struct(Arc<StructDef>, Vec<Value>),
    /// A type used as a value (argument of the introspection predicates).
    Type(Type),
    /// A reference to a program item.
    Fn(DefId),
}

impl Value {
    /// The concrete type of this value.
    pub fn ty(&self) -> Type {
        match self {
            Value::Unit => Type::Unit,
            Value::Bool(_) => Type::Bool,
            Value::I32(_) => Type::I32,
            Value::I64(_) => Type::I64,
            Value::F32(_) => Type::F32,
            Value::F64(_) => Type::F64,
            Value::Tuple(elems) => Type::Tuple(elems.iter().map(Value::ty).collect()),
            Value::Struct(def, _) => Type::Struct(Arc::clone(def)),
            Value::Type(_) => Type::Meta,
            Value::Fn(_) => Type::Fn,
        }
    }

    /// Compare two values bit for bit. Unlike `==`, NaNs with the same
    /// payload compare equal and `0.0` differs from `-0.0`.
    pub fn bit_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (Value::Tuple(a), Value::Tuple(b)) | (Value::Struct(_, a), Value::Struct(_, b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.bit_eq(y))
            }
            _ => self == other,
        }
    }

    /// The value as an `f32`, if it is one.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as an `f64`, if it is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a `bool`, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as an `i64`, widening `i32`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I32(v) => Some(i64::from(*v)),
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}i32", v),
            Value::I64(v) => write!(f, "{}i64", v),
            Value::F32(v) => write!(f, "{:?}f32", v),
            Value::F64(v) => write!(f, "{:?}f64", v),
            Value::Tuple(elems) | Value::Struct(_, elems) => {
                if let Value::Struct(def, _) = self {
                    write!(f, "{}", def.name)?;
                }
                write!(f, "(")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                write!(f, ")")
            }
            Value::Type(ty) => write!(f, "{}", ty),
            Value::Fn(def) => write!(f, "{}", def),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_types() {
        assert_eq!(Value::F32(1.0).ty(), Type::F32);
        assert_eq!(Value::Tuple(vec![Value::I32(1), Value::Bool(true)]).ty(), Type::Tuple(vec![Type::I32, Type::Bool]));
        assert_eq!(Value::Type(Type::F64).ty(), Type::Meta);
    }

    #[test]
    fn test_bit_eq_nan_and_signed_zero() {
        assert!(Value::F32(f32::NAN).bit_eq(&Value::F32(f32::NAN)));
        assert_ne!(Value::F32(f32::NAN), Value::F32(f32::NAN));
        assert!(!Value::F64(0.0).bit_eq(&Value::F64(-0.0)));
        assert!(!Value::F32(1.0).bit_eq(&Value::F64(1.0)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::F32(3.0).to_string(), "3.0f32");
        assert_eq!(Value::Tuple(vec![Value::I64(2), Value::Unit]).to_string(), "(2i64, ())");
    }
}
