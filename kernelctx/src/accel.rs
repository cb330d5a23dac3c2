//! # Accelerator Support
//!
//! The math library of the accelerator target and its type layout queries.
//! Compiled only with the `accel` feature; without it the `Accel` target,
//! these routines and the `target_alignment` intrinsic do not exist.
//!
//! Routines are host emulations of the device library (`__accel_*` symbols)
//! with the same mathematical meaning as the host operations.

use crate::device::{MathLibrary, Routine, RoutineImpl};
use crate::intrinsics::MathOp;
use crate::ty::{FloatWidth, Type};

/// The accelerator math library.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccelMath;

/// Shared instance used by the `Accel` target.
pub static ACCEL_MATH: AccelMath = AccelMath;

macro_rules! accel_routines {
    (
        unary { $( $u:ident => $u32:literal, $u64:literal, $umethod:ident; )* }
        predicate { $( $p:ident => $p32:literal, $p64:literal, $pmethod:ident; )* }
    ) => {
        fn lookup(op: MathOp, width: FloatWidth) -> Option<Routine> {
            let routine = match (op, width) {
                $(
                    (MathOp::$u, FloatWidth::F32) => Routine::new($u32, RoutineImpl::F32(|x| x.$umethod())),
                    (MathOp::$u, FloatWidth::F64) => Routine::new($u64, RoutineImpl::F64(|x| x.$umethod())),
                )*
                $(
                    (MathOp::$p, FloatWidth::F32) => Routine::new($p32, RoutineImpl::PredF32(|x| x.$pmethod())),
                    (MathOp::$p, FloatWidth::F64) => Routine::new($p64, RoutineImpl::PredF64(|x| x.$pmethod())),
                )*
                #[allow(unreachable_patterns)]
                _ => return None,
            };
            Some(routine)
        }
    };
}

accel_routines! {
    unary {
        Sin => "__accel_sinf", "__accel_sin", sin;
        Cos => "__accel_cosf", "__accel_cos", cos;
        Tan => "__accel_tanf", "__accel_tan", tan;
        Asin => "__accel_asinf", "__accel_asin", asin;
        Acos => "__accel_acosf", "__accel_acos", acos;
        Atan => "__accel_atanf", "__accel_atan", atan;
        Sinh => "__accel_sinhf", "__accel_sinh", sinh;
        Cosh => "__accel_coshf", "__accel_cosh", cosh;
        Tanh => "__accel_tanhf", "__accel_tanh", tanh;
        Asinh => "__accel_asinhf", "__accel_asinh", asinh;
        Acosh => "__accel_acoshf", "__accel_acosh", acosh;
        Atanh => "__accel_atanhf", "__accel_atanh", atanh;
        Exp => "__accel_expf", "__accel_exp", exp;
        Exp2 => "__accel_exp2f", "__accel_exp2", exp2;
        Expm1 => "__accel_expm1f", "__accel_expm1", exp_m1;
        Log => "__accel_logf", "__accel_log", ln;
        Log2 => "__accel_log2f", "__accel_log2", log2;
        Log10 => "__accel_log10f", "__accel_log10", log10;
        Log1p => "__accel_log1pf", "__accel_log1p", ln_1p;
        Floor => "__accel_floorf", "__accel_floor", floor;
        Ceil => "__accel_ceilf", "__accel_ceil", ceil;
        Trunc => "__accel_truncf", "__accel_trunc", trunc;
        Round => "__accel_rintf", "__accel_rint", round_ties_even;
        Abs => "__accel_fabsf", "__accel_fabs", abs;
        Sqrt => "__accel_sqrtf", "__accel_sqrt", sqrt;
        Cbrt => "__accel_cbrtf", "__accel_cbrt", cbrt;
    }
    predicate {
        IsNan => "__accel_isnanf", "__accel_isnan", is_nan;
        IsInf => "__accel_isinff", "__accel_isinf", is_infinite;
        IsFinite => "__accel_finitef", "__accel_isfinite", is_finite;
    }
}

impl MathLibrary for AccelMath {
    fn name(&self) -> &'static str {
        "accel-libm"
    }

    fn routine(&self, op: MathOp, width: FloatWidth) -> Option<Routine> {
        lookup(op, width)
    }
}

/// Alignment in bytes of `ty` in accelerator memory.
pub fn alignment_of(ty: &Type) -> u64 {
    match ty {
        Type::Unit | Type::Bool => 1,
        Type::I32 | Type::F32 => 4,
        Type::I64 | Type::F64 | Type::Meta | Type::Fn | Type::Param(_) => 8,
        Type::Tuple(elems) => elems.iter().map(alignment_of).max().unwrap_or(1),
        Type::Struct(def) => def.fields.iter().map(alignment_of).max().unwrap_or(1),
    }
}
