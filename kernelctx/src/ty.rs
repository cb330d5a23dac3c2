//! # Kernel Types
//!
//! The type language of kernel bodies. Types are fully concrete after
//! specialization; before that a body may mention generic parameters
//! (`Type::Param`) that are bound from the argument types of a call.
//!
//! Type equality is structural and exact. There is no implicit widening or
//! narrowing anywhere in the crate: an `f32` is never an `f64`.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Floating-point widths that can be substituted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FloatWidth {
    F32,
    F64,
}

impl FloatWidth {
    /// Both supported widths, narrowest first.
    pub const ALL: [FloatWidth; 2] = [FloatWidth::F32, FloatWidth::F64];

    /// The corresponding scalar type.
    pub fn ty(self) -> Type {
        match self {
            FloatWidth::F32 => Type::F32,
            FloatWidth::F64 => Type::F64,
        }
    }

    /// Width in bits.
    pub fn bits(self) -> u32 {
        match self {
            FloatWidth::F32 => 32,
            FloatWidth::F64 => 64,
        }
    }
}

impl fmt::Display for FloatWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloatWidth::F32 => write!(f, "f32"),
            FloatWidth::F64 => write!(f, "f64"),
        }
    }
}

/// A user-defined record type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructDef {
    /// Type name, for display only.
    pub name: String,
    /// Field types in declaration order.
    pub fields: Vec<Type>,
    /// Whether instances may be mutated in place.
    pub mutable: bool,
}

impl StructDef {
    /// Create an immutable struct definition.
    pub fn new(name: impl Into<String>, fields: Vec<Type>) -> Arc<Self> {
        Arc::new(Self { name: name.into(), fields, mutable: false })
    }

    /// Create a mutable struct definition.
    pub fn new_mutable(name: impl Into<String>, fields: Vec<Type>) -> Arc<Self> {
        Arc::new(Self { name: name.into(), fields, mutable: true })
    }
}

/// A kernel type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Unit,
    Bool,
    I32,
    I64,
    F32,
    F64,
    /// Anonymous product type.
    Tuple(Vec<Type>),
    /// Named record type.
    Struct(Arc<StructDef>),
    /// Generic parameter, bound during specialization.
    Param(u32),
    /// The type of type values (`Value::Type`).
    Meta,
    /// The type of function references.
    Fn,
}

impl Type {
    /// The width if this is a supported float type.
    pub fn float_width(&self) -> Option<FloatWidth> {
        match self {
            Type::F32 => Some(FloatWidth::F32),
            Type::F64 => Some(FloatWidth::F64),
            _ => None,
        }
    }

    /// Check if this is a float type.
    pub fn is_float(&self) -> bool {
        self.float_width().is_some()
    }

    /// Check if this is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(self, Type::I32 | Type::I64)
    }

    /// Primitive scalar types (`bool`, integers, floats).
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Bool | Type::I32 | Type::I64 | Type::F32 | Type::F64)
    }

    /// A type whose values are plain immutable bits: primitives, unit, and
    /// immutable aggregates of bits types.
    pub fn is_bits(&self) -> bool {
        match self {
            Type::Unit => true,
            t if t.is_primitive() => true,
            Type::Tuple(elems) => elems.iter().all(Type::is_bits),
            Type::Struct(def) => !def.mutable && def.fields.iter().all(Type::is_bits),
            _ => false,
        }
    }

    /// Check if the type mentions any generic parameter.
    pub fn has_params(&self) -> bool {
        match self {
            Type::Param(_) => true,
            Type::Tuple(elems) => elems.iter().any(Type::has_params),
            Type::Struct(def) => def.fields.iter().any(Type::has_params),
            _ => false,
        }
    }

    /// Type of the `index`-th field of a tuple or struct.
    pub fn field(&self, index: u32) -> Option<&Type> {
        match self {
            Type::Tuple(elems) => elems.get(index as usize),
            Type::Struct(def) => def.fields.get(index as usize),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unit => write!(f, "()"),
            Type::Bool => write!(f, "bool"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::Tuple(elems) => {
                write!(f, "(")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                write!(f, ")")
            }
            Type::Struct(def) => write!(f, "{}", def.name),
            Type::Param(idx) => write!(f, "T{}", idx),
            Type::Meta => write!(f, "type"),
            Type::Fn => write!(f, "fn"),
        }
    }
}

/// Format a type signature as `(f32, f64)`.
pub fn display_signature(tys: &[Type]) -> String {
    let parts: Vec<String> = tys.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

/// A binding of generic parameters to concrete types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subst {
    bindings: BTreeMap<u32, Type>,
}

/// Why a parameter type could not be bound to an argument type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub expected: Type,
    pub found: Type,
}

impl Subst {
    /// An empty substitution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a bound parameter.
    pub fn get(&self, param: u32) -> Option<&Type> {
        self.bindings.get(&param)
    }

    /// Bind `param` to `ty`, failing if it is already bound to something else.
    fn bind(&mut self, param: u32, ty: &Type) -> Result<(), Mismatch> {
        match self.bindings.entry(param) {
            Entry::Occupied(bound) if bound.get() != ty => {
                Err(Mismatch { expected: bound.get().clone(), found: ty.clone() })
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(ty.clone());
                Ok(())
            }
        }
    }

    /// Match a declared (possibly generic) type against a concrete one.
    pub fn unify(&mut self, declared: &Type, actual: &Type) -> Result<(), Mismatch> {
        match (declared, actual) {
            (Type::Param(p), _) => self.bind(*p, actual),
            (Type::Tuple(ds), Type::Tuple(acts)) if ds.len() == acts.len() => {
                for (d, a) in ds.iter().zip(acts) {
                    self.unify(d, a)?;
                }
                Ok(())
            }
            _ if declared == actual => Ok(()),
            _ => Err(Mismatch { expected: declared.clone(), found: actual.clone() }),
        }
    }

    /// Replace bound parameters in `ty`. Returns the first unbound parameter
    /// on failure.
    pub fn apply(&self, ty: &Type) -> Result<Type, u32> {
        match ty {
            Type::Param(p) => self.get(*p).cloned().ok_or(*p),
            Type::Tuple(elems) => {
                let elems = elems.iter().map(|e| self.apply(e)).collect::<Result<_, _>>()?;
                Ok(Type::Tuple(elems))
            }
            Type::Struct(def) if ty.has_params() => {
                let fields = def.fields.iter().map(|e| self.apply(e)).collect::<Result<_, _>>()?;
                Ok(Type::Struct(Arc::new(StructDef {
                    name: def.name.clone(),
                    fields,
                    mutable: def.mutable,
                })))
            }
            _ => Ok(ty.clone()),
        }
    }
}
