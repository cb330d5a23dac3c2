//! # Built-in Operations
//!
//! Operations a kernel can call without defining them: the scalar math
//! library, arithmetic operators in callable form, and a handful of
//! reflection utilities. Each intrinsic has a host implementation used by
//! the interpreter whenever the call has not been substituted.
//!
//! The math operation list is written once, in [`math_ops!`], and every
//! property of [`MathOp`] (name, arity class, host semantics) is generated
//! from it.

use serde::{Deserialize, Serialize};

use crate::error::ExecError;
use crate::interp::eval_binop;
use crate::mir::{BinOp, FloatMode};
use crate::table::OpId;
use crate::value::Value;

macro_rules! math_ops {
    (
        unary { $( $u:ident => $uname:literal, $umethod:ident; )* }
        predicate { $( $p:ident => $pname:literal, $pmethod:ident; )* }
    ) => {
        /// A named unary math operation over floats.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum MathOp {
            $( $u, )*
            $( $p, )*
        }

        impl MathOp {
            /// Every math operation, value-producing ones first.
            pub const ALL: &'static [MathOp] = &[$( MathOp::$u, )* $( MathOp::$p, )*];

            /// The source-level name of the operation.
            pub fn name(self) -> &'static str {
                match self {
                    $( MathOp::$u => $uname, )*
                    $( MathOp::$p => $pname, )*
                }
            }

            /// Look an operation up by its source-level name.
            pub fn from_name(name: &str) -> Option<MathOp> {
                match name {
                    $( $uname => Some(MathOp::$u), )*
                    $( $pname => Some(MathOp::$p), )*
                    _ => None,
                }
            }

            /// Classification predicates return `bool` instead of a float.
            pub fn is_predicate(self) -> bool {
                match self {
                    $( MathOp::$u => false, )*
                    $( MathOp::$p => true, )*
                }
            }

            /// Host semantics on an `f32` argument.
            pub fn host_f32(self, x: f32) -> Value {
                match self {
                    $( MathOp::$u => Value::F32(x.$umethod()), )*
                    $( MathOp::$p => Value::Bool(x.$pmethod()), )*
                }
            }

            /// Host semantics on an `f64` argument.
            pub fn host_f64(self, x: f64) -> Value {
                match self {
                    $( MathOp::$u => Value::F64(x.$umethod()), )*
                    $( MathOp::$p => Value::Bool(x.$pmethod()), )*
                }
            }
        }
    };
}

math_ops! {
    unary {
        Sin => "sin", sin;
        Cos => "cos", cos;
        Tan => "tan", tan;
        Asin => "asin", asin;
        Acos => "acos", acos;
        Atan => "atan", atan;
        Sinh => "sinh", sinh;
        Cosh => "cosh", cosh;
        Tanh => "tanh", tanh;
        Asinh => "asinh", asinh;
        Acosh => "acosh", acosh;
        Atanh => "atanh", atanh;
        Exp => "exp", exp;
        Exp2 => "exp2", exp2;
        Expm1 => "expm1", exp_m1;
        Log => "log", ln;
        Log2 => "log2", log2;
        Log10 => "log10", log10;
        Log1p => "log1p", ln_1p;
        Floor => "floor", floor;
        Ceil => "ceil", ceil;
        Trunc => "trunc", trunc;
        Round => "round", round_ties_even;
        Abs => "abs", abs;
        Sqrt => "sqrt", sqrt;
        Cbrt => "cbrt", cbrt;
    }
    predicate {
        IsNan => "isnan", is_nan;
        IsInf => "isinf", is_infinite;
        IsFinite => "isfinite", is_finite;
    }
}

impl MathOp {
    /// Apply the host implementation to a value.
    pub fn eval_host(self, arg: &Value) -> Result<Value, ExecError> {
        match arg {
            Value::F32(x) => Ok(self.host_f32(*x)),
            Value::F64(x) => Ok(self.host_f64(*x)),
            other => Err(ExecError::InvalidOperand {
                op: self.name().to_string(),
                found: other.ty(),
            }),
        }
    }
}

/// Arithmetic operators that have contracted replacements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
}

impl ArithOp {
    pub const ALL: [ArithOp; 3] = [ArithOp::Add, ArithOp::Sub, ArithOp::Mul];

    /// Operator spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
        }
    }

    /// The IR binary operation.
    pub fn to_binop(self) -> BinOp {
        match self {
            ArithOp::Add => BinOp::Add,
            ArithOp::Sub => BinOp::Sub,
            ArithOp::Mul => BinOp::Mul,
        }
    }

    /// The operator for an IR binary operation, if it has one.
    pub fn from_binop(op: BinOp) -> Option<ArithOp> {
        match op {
            BinOp::Add => Some(ArithOp::Add),
            BinOp::Sub => Some(ArithOp::Sub),
            BinOp::Mul => Some(ArithOp::Mul),
            _ => None,
        }
    }
}

/// A built-in callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intrinsic {
    /// Scalar math library.
    Math(MathOp),
    /// `+`, `-`, `*` in callable form.
    Arith(ArithOp),
    /// Keyword-function resolution. Returns its argument.
    KwFunc,
    /// Whether a value is immutable.
    IsImmutable,
    /// Whether a type is a struct type.
    IsStructType,
    /// Whether a type is a primitive scalar.
    IsPrimitiveType,
    /// Whether a type is plain bits.
    IsBitsType,
    /// Whether a value's type is plain bits.
    IsBitsValue,
    /// Alignment of a type on the accelerator.
    #[cfg(feature = "accel")]
    TargetAlignment,
    /// Current interpreter call depth.
    FrameDepth,
}

impl Intrinsic {
    /// Intrinsics the rewriter must never substitute, wrap or re-route,
    /// whatever the substitution table says.
    pub const PASSTHROUGH: &'static [Intrinsic] = &[
        Intrinsic::KwFunc,
        Intrinsic::IsImmutable,
        Intrinsic::IsStructType,
        Intrinsic::IsPrimitiveType,
        Intrinsic::IsBitsType,
        Intrinsic::IsBitsValue,
        #[cfg(feature = "accel")]
        Intrinsic::TargetAlignment,
    ];

    /// Check membership in [`Intrinsic::PASSTHROUGH`].
    pub fn is_passthrough(self) -> bool {
        Self::PASSTHROUGH.contains(&self)
    }

    /// The substitution-table identity of this intrinsic, if it has one.
    pub fn op_id(self) -> Option<OpId> {
        match self {
            Intrinsic::Math(op) => Some(OpId::Math(op)),
            Intrinsic::Arith(op) => Some(OpId::Arith(op)),
            _ => None,
        }
    }

    /// Source-level name.
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::Math(op) => op.name(),
            Intrinsic::Arith(op) => op.symbol(),
            Intrinsic::KwFunc => "kwfunc",
            Intrinsic::IsImmutable => "is_immutable",
            Intrinsic::IsStructType => "is_struct_type",
            Intrinsic::IsPrimitiveType => "is_primitive_type",
            Intrinsic::IsBitsType => "is_bits_type",
            Intrinsic::IsBitsValue => "is_bits_value",
            #[cfg(feature = "accel")]
            Intrinsic::TargetAlignment => "target_alignment",
            Intrinsic::FrameDepth => "frame_depth",
        }
    }

    /// Number of arguments.
    pub fn arity(self) -> usize {
        match self {
            Intrinsic::Arith(_) => 2,
            Intrinsic::FrameDepth => 0,
            _ => 1,
        }
    }

    /// Evaluate with host semantics. `frame_depth` is the depth of the
    /// calling frame.
    pub fn eval_host(self, args: &[Value], frame_depth: usize) -> Result<Value, ExecError> {
        if args.len() != self.arity() {
            return Err(ExecError::Arity {
                callee: self.name().to_string(),
                expected: self.arity(),
                found: args.len(),
            });
        }
        match self {
            Intrinsic::Math(op) => op.eval_host(&args[0]),
            Intrinsic::Arith(op) => eval_binop(op.to_binop(), FloatMode::Strict, &args[0], &args[1]),
            Intrinsic::KwFunc => Ok(args[0].clone()),
            Intrinsic::IsImmutable => Ok(Value::Bool(match &args[0] {
                Value::Struct(def, _) => !def.mutable,
                _ => true,
            })),
            Intrinsic::IsStructType => self.type_arg(&args[0]).map(|ty| Value::Bool(matches!(ty, crate::ty::Type::Struct(_)))),
            Intrinsic::IsPrimitiveType => self.type_arg(&args[0]).map(|ty| Value::Bool(ty.is_primitive())),
            Intrinsic::IsBitsType => self.type_arg(&args[0]).map(|ty| Value::Bool(ty.is_bits())),
            Intrinsic::IsBitsValue => Ok(Value::Bool(args[0].ty().is_bits())),
            #[cfg(feature = "accel")]
            Intrinsic::TargetAlignment => {
                self.type_arg(&args[0]).map(|ty| Value::I64(crate::accel::alignment_of(ty) as i64))
            }
            Intrinsic::FrameDepth => Ok(Value::I64(frame_depth as i64)),
        }
    }

    fn type_arg(self, arg: &Value) -> Result<&crate::ty::Type, ExecError> {
        match arg {
            Value::Type(ty) => Ok(ty),
            other => Err(ExecError::InvalidOperand {
                op: self.name().to_string(),
                found: other.ty(),
            }),
        }
    }
}
