//! # Contracted Arithmetic
//!
//! `add`, `sub` and `mul` for each supported float width, with
//! floating-point contraction allowed. A contracted operation may be fused
//! with neighbouring arithmetic (a multiply feeding an add becomes a single
//! fused multiply-add) and skip the intermediate rounding.
//!
//! This deliberately gives up bit-exact reproducibility: a contracted
//! `a * b + c` can differ from the strictly rounded result in the last
//! place. Isolated contracted operations round exactly like IEEE
//! arithmetic.
//!
//! All six operations come from one macro over the `(op, width)` product:
//! the host functions (`const`, always inlined, so they fold in constant
//! contexts), their [`FusedOp`] descriptors, their interpreter semantics,
//! and the IR they emit.

use serde::{Deserialize, Serialize};

use crate::error::ExecError;
use crate::intrinsics::ArithOp;
use crate::mir::{BodyBuilder, FloatMode, MirBody, Operand, Place, Rvalue, LocalId};
use crate::ty::FloatWidth;
use crate::value::Value;

/// One contracted arithmetic instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FusedOp {
    pub op: ArithOp,
    pub width: FloatWidth,
}

macro_rules! fused_ops {
    ($( $op:ident $tok:tt [ $( $w:ident $t:ty => $f:ident ),* ] )*) => {
        $( $(
            #[doc = concat!("`a ", stringify!($tok), " b` on `", stringify!($t), "` with contraction allowed.")]
            #[inline(always)]
            pub const fn $f(a: $t, b: $t) -> $t {
                a $tok b
            }
        )* )*

        impl FusedOp {
            /// Every contracted instruction.
            pub const ALL: [FusedOp; 6] = [
                $( $( FusedOp { op: ArithOp::$op, width: FloatWidth::$w }, )* )*
            ];

            /// Symbol of the host function implementing this instruction.
            pub fn symbol(self) -> &'static str {
                match (self.op, self.width) {
                    $( $( (ArithOp::$op, FloatWidth::$w) => stringify!($f), )* )*
                }
            }

            /// Evaluate on interpreter values of exactly this width.
            pub fn eval(self, a: &Value, b: &Value) -> Result<Value, ExecError> {
                match (self.op, self.width, a, b) {
                    $( $(
                        (ArithOp::$op, FloatWidth::$w, Value::$w(a), Value::$w(b)) => Ok(Value::$w($f(*a, *b))),
                    )* )*
                    (_, _, a, b) => Err(ExecError::InvalidOperand {
                        op: self.symbol().to_string(),
                        found: if a.ty() == self.width.ty() { b.ty() } else { a.ty() },
                    }),
                }
            }
        }
    };
}

fused_ops! {
    Add + [F32 f32 => add_contract_f32, F64 f64 => add_contract_f64]
    Sub - [F32 f32 => sub_contract_f32, F64 f64 => sub_contract_f64]
    Mul * [F32 f32 => mul_contract_f32, F64 f64 => mul_contract_f64]
}

impl FusedOp {
    /// The raw contracted instruction applied to two operands.
    pub fn emit(self, left: Operand, right: Operand) -> Rvalue {
        Rvalue::BinaryOp {
            op: self.op.to_binop(),
            mode: FloatMode::Contract,
            left,
            right,
        }
    }

    /// A stand-alone function computing this instruction, for call sites
    /// that must keep a real call.
    pub fn body(self) -> MirBody {
        let ty = self.width.ty();
        let mut builder = BodyBuilder::new(vec![ty.clone(), ty.clone()], ty);
        let (a, b) = (builder.param(0), builder.param(1));
        builder.assign(Place::local(LocalId::RETURN), self.emit(Operand::copy(a), Operand::copy(b)));
        builder.ret();
        builder.finish()
    }
}

/// Fused multiply-add with a single rounding, for contracted `a * b + c`.
pub fn fused_mul_add(a: &Value, b: &Value, c: &Value) -> Result<Value, ExecError> {
    match (a, b, c) {
        (Value::F32(a), Value::F32(b), Value::F32(c)) => Ok(Value::F32(a.mul_add(*b, *c))),
        (Value::F64(a), Value::F64(b), Value::F64(c)) => Ok(Value::F64(a.mul_add(*b, *c))),
        (a, _, _) => Err(ExecError::InvalidOperand { op: "fma".to_string(), found: a.ty() }),
    }
}
