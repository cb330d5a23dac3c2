//! # MIR Interpreter
//!
//! Executes program items on [`Value`]s. Used to run both the original and
//! the specialized form of a kernel, so the two can be compared.
//!
//! Each frame binds the generic parameters of its body from the types of
//! the argument values. Constants of generic type (`1 as T0`) are resolved
//! against that binding, which is how an unspecialized generic kernel runs.
//!
//! Intrinsics that survived rewriting execute with host semantics. Device
//! routines run their host emulation. Contracted operations execute through
//! the emitter's functions.

use tracing::trace;

use crate::emit::{fused_mul_add, FusedOp};
use crate::error::ExecError;
use crate::intrinsics::ArithOp;
use crate::mir::{
    AggregateKind, BasicBlockId, BinOp, Constant, ConstantKind, DefId, FloatMode, MirBody, Operand, Place,
    PlaceElem, Rvalue, StatementKind, TerminatorKind, UnOp,
};
use crate::program::Program;
use crate::ty::{Subst, Type};
use crate::value::Value;

/// Runs items of one program.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter<'p> {
    program: &'p Program,
    max_call_depth: usize,
}

struct Frame<'b> {
    name: &'b str,
    body: &'b MirBody,
    locals: Vec<Option<Value>>,
    subst: Subst,
    depth: usize,
}

impl<'p> Interpreter<'p> {
    pub fn new(program: &'p Program, max_call_depth: usize) -> Self {
        Self { program, max_call_depth }
    }

    /// Call `entry` with `args`. The entry frame has depth 1.
    pub fn run(&self, entry: DefId, args: &[Value]) -> Result<Value, ExecError> {
        self.call(entry, args.to_vec(), 1)
    }

    fn call(&self, def_id: DefId, args: Vec<Value>, depth: usize) -> Result<Value, ExecError> {
        if depth > self.max_call_depth {
            return Err(ExecError::StackOverflow { limit: self.max_call_depth });
        }
        let item = self.program.get(def_id).ok_or(ExecError::UnknownItem(def_id))?;
        let body = item.body().ok_or_else(|| ExecError::NoBody(item.name.clone()))?;
        if args.len() != body.param_count {
            return Err(ExecError::Arity {
                callee: item.name.clone(),
                expected: body.param_count,
                found: args.len(),
            });
        }

        let mut subst = Subst::new();
        for (declared, arg) in body.param_types().zip(&args) {
            subst.unify(declared, &arg.ty()).map_err(|_| ExecError::InvalidOperand {
                op: item.name.clone(),
                found: arg.ty(),
            })?;
        }

        let mut locals = vec![None; body.locals.len()];
        for (slot, arg) in locals.iter_mut().skip(1).zip(args) {
            *slot = Some(arg);
        }

        trace!(callee = %item.name, depth, "enter frame");
        let mut frame = Frame { name: &item.name, body, locals, subst, depth };
        self.execute(&mut frame)
    }

    fn execute(&self, frame: &mut Frame<'_>) -> Result<Value, ExecError> {
        let body = frame.body;
        let mut bb = BasicBlockId::ENTRY;
        loop {
            let block = body
                .get_block(bb)
                .ok_or_else(|| ExecError::Unreachable(frame.name.to_string()))?;

            for stmt in &block.statements {
                match &stmt.kind {
                    StatementKind::Assign(place, rvalue) => {
                        let value = self.eval_rvalue(frame, rvalue)?;
                        frame.store(place, value)?;
                    }
                    StatementKind::StorageDead(local) => {
                        if let Some(slot) = frame.locals.get_mut(local.index()) {
                            *slot = None;
                        }
                    }
                    StatementKind::StorageLive(_) | StatementKind::Nop => {}
                }
            }

            let Some(term) = &block.terminator else {
                return Err(ExecError::Unreachable(frame.name.to_string()));
            };
            match &term.kind {
                TerminatorKind::Goto { target } => bb = *target,
                TerminatorKind::SwitchInt { discr, targets } => {
                    let value = frame.operand(discr)?;
                    let discr = match value {
                        Value::Bool(b) => u128::from(b),
                        Value::I32(v) => v as i128 as u128,
                        Value::I64(v) => v as i128 as u128,
                        other => {
                            return Err(ExecError::InvalidOperand { op: "switchInt".to_string(), found: other.ty() })
                        }
                    };
                    bb = targets.target_for_value(discr);
                }
                TerminatorKind::Return => {
                    return match frame.locals[0].take() {
                        Some(value) => Ok(value),
                        None if *body.return_type() == Type::Unit => Ok(Value::Unit),
                        None => Err(ExecError::Uninitialized(0)),
                    };
                }
                TerminatorKind::Unreachable => return Err(ExecError::Unreachable(frame.name.to_string())),
                TerminatorKind::Call { func, args, destination, target, .. } => {
                    let args = args.iter().map(|a| frame.operand(a)).collect::<Result<Vec<_>, _>>()?;
                    let callee = func.as_constant().ok_or(ExecError::IndirectCall)?;
                    let result = match &callee.kind {
                        ConstantKind::FnDef(def_id) => self.call(*def_id, args, frame.depth + 1)?,
                        ConstantKind::Intrinsic(intrinsic) => intrinsic.eval_host(&args, frame.depth)?,
                        ConstantKind::Routine(routine) => routine.call(&args)?,
                        _ => return Err(ExecError::IndirectCall),
                    };
                    frame.store(destination, result)?;
                    match target {
                        Some(next) => bb = *next,
                        None => return Err(ExecError::Unreachable(frame.name.to_string())),
                    }
                }
            }
        }
    }

    fn eval_rvalue(&self, frame: &Frame<'_>, rvalue: &Rvalue) -> Result<Value, ExecError> {
        match rvalue {
            Rvalue::Use(op) => frame.operand(op),
            Rvalue::BinaryOp { op, mode, left, right } => {
                eval_binop(*op, *mode, &frame.operand(left)?, &frame.operand(right)?)
            }
            Rvalue::UnaryOp { op, operand } => eval_unop(*op, frame.operand(operand)?),
            Rvalue::Cast { operand, target_ty } => {
                let target = frame.subst.apply(target_ty).map_err(ExecError::UnboundParam)?;
                cast(frame.operand(operand)?, &target)
            }
            Rvalue::Aggregate { kind, operands } => {
                let values = operands.iter().map(|op| frame.operand(op)).collect::<Result<Vec<_>, _>>()?;
                Ok(match kind {
                    AggregateKind::Tuple => Value::Tuple(values),
                    AggregateKind::Struct(def) => Value::Struct(def.clone(), values),
                })
            }
            Rvalue::FusedMulAdd { a, b, c } => {
                fused_mul_add(&frame.operand(a)?, &frame.operand(b)?, &frame.operand(c)?)
            }
        }
    }
}

impl Frame<'_> {
    fn operand(&self, op: &Operand) -> Result<Value, ExecError> {
        match op {
            Operand::Copy(place) | Operand::Move(place) => self.load(place),
            Operand::Constant(c) => eval_constant(c, &self.subst),
        }
    }

    fn load(&self, place: &Place) -> Result<Value, ExecError> {
        let mut value = self
            .locals
            .get(place.local.index())
            .and_then(Option::as_ref)
            .ok_or(ExecError::Uninitialized(place.local.0))?;
        for elem in &place.projection {
            let PlaceElem::Field(idx) = elem;
            value = match value {
                Value::Tuple(fields) | Value::Struct(_, fields) => fields
                    .get(*idx as usize)
                    .ok_or_else(|| ExecError::InvalidOperand { op: format!(".{}", idx), found: value.ty() })?,
                other => return Err(ExecError::InvalidOperand { op: format!(".{}", idx), found: other.ty() }),
            };
        }
        Ok(value.clone())
    }

    fn store(&mut self, place: &Place, value: Value) -> Result<(), ExecError> {
        let slot = self
            .locals
            .get_mut(place.local.index())
            .ok_or(ExecError::Uninitialized(place.local.0))?;
        if place.projection.is_empty() {
            *slot = Some(value);
            return Ok(());
        }
        let mut target = slot.as_mut().ok_or(ExecError::Uninitialized(place.local.0))?;
        for elem in &place.projection {
            let PlaceElem::Field(idx) = elem;
            let found = target.ty();
            target = match target {
                Value::Tuple(fields) | Value::Struct(_, fields) => fields
                    .get_mut(*idx as usize)
                    .ok_or_else(|| ExecError::InvalidOperand { op: format!(".{}", idx), found: found.clone() })?,
                _ => return Err(ExecError::InvalidOperand { op: format!(".{}", idx), found }),
            };
        }
        *target = value;
        Ok(())
    }
}

/// Materialize a constant, resolving generic types through `subst`.
pub(crate) fn eval_constant(c: &Constant, subst: &Subst) -> Result<Value, ExecError> {
    let ty = subst.apply(&c.ty).map_err(ExecError::UnboundParam)?;
    let invalid = |ty: Type| ExecError::InvalidOperand { op: "constant".to_string(), found: ty };
    match &c.kind {
        ConstantKind::Int(v) => match ty {
            Type::I32 => Ok(Value::I32(*v as i32)),
            Type::I64 => Ok(Value::I64(*v as i64)),
            Type::F32 => Ok(Value::F32(*v as f32)),
            Type::F64 => Ok(Value::F64(*v as f64)),
            Type::Bool => Ok(Value::Bool(*v != 0)),
            other => Err(invalid(other)),
        },
        ConstantKind::Float(v) => match ty {
            Type::F32 => Ok(Value::F32(*v as f32)),
            Type::F64 => Ok(Value::F64(*v)),
            other => Err(invalid(other)),
        },
        ConstantKind::Bool(b) => Ok(Value::Bool(*b)),
        ConstantKind::Unit => Ok(Value::Unit),
        ConstantKind::FnDef(def_id) => Ok(Value::Fn(*def_id)),
        ConstantKind::Type(t) => subst.apply(t).map(Value::Type).map_err(ExecError::UnboundParam),
        ConstantKind::Intrinsic(_) | ConstantKind::Routine(_) => Err(invalid(Type::Fn)),
    }
}

macro_rules! float_binop {
    ($op:expr, $x:expr, $y:expr, $variant:ident) => {
        match $op {
            BinOp::Add => Some(Value::$variant($x + $y)),
            BinOp::Sub => Some(Value::$variant($x - $y)),
            BinOp::Mul => Some(Value::$variant($x * $y)),
            BinOp::Div => Some(Value::$variant($x / $y)),
            BinOp::Rem => Some(Value::$variant($x % $y)),
            BinOp::Eq => Some(Value::Bool($x == $y)),
            BinOp::Ne => Some(Value::Bool($x != $y)),
            BinOp::Lt => Some(Value::Bool($x < $y)),
            BinOp::Le => Some(Value::Bool($x <= $y)),
            BinOp::Gt => Some(Value::Bool($x > $y)),
            BinOp::Ge => Some(Value::Bool($x >= $y)),
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => None,
        }
    };
}

macro_rules! int_binop {
    ($op:expr, $x:expr, $y:expr, $variant:ident) => {
        match $op {
            BinOp::Add => Some(Value::$variant($x.wrapping_add($y))),
            BinOp::Sub => Some(Value::$variant($x.wrapping_sub($y))),
            BinOp::Mul => Some(Value::$variant($x.wrapping_mul($y))),
            BinOp::Div if $y == 0 => return Err(ExecError::DivisionByZero),
            BinOp::Rem if $y == 0 => return Err(ExecError::DivisionByZero),
            BinOp::Div => Some(Value::$variant($x.wrapping_div($y))),
            BinOp::Rem => Some(Value::$variant($x.wrapping_rem($y))),
            BinOp::BitAnd => Some(Value::$variant($x & $y)),
            BinOp::BitOr => Some(Value::$variant($x | $y)),
            BinOp::BitXor => Some(Value::$variant($x ^ $y)),
            BinOp::Eq => Some(Value::Bool($x == $y)),
            BinOp::Ne => Some(Value::Bool($x != $y)),
            BinOp::Lt => Some(Value::Bool($x < $y)),
            BinOp::Le => Some(Value::Bool($x <= $y)),
            BinOp::Gt => Some(Value::Bool($x > $y)),
            BinOp::Ge => Some(Value::Bool($x >= $y)),
        }
    };
}

/// Evaluate a binary operation. Both operands must have the same type;
/// integer arithmetic wraps.
pub(crate) fn eval_binop(op: BinOp, mode: FloatMode, a: &Value, b: &Value) -> Result<Value, ExecError> {
    if mode == FloatMode::Contract {
        if let (Some(arith), Some(width)) = (ArithOp::from_binop(op), a.ty().float_width()) {
            return FusedOp { op: arith, width }.eval(a, b);
        }
    }
    let result = match (a, b) {
        (Value::F32(x), Value::F32(y)) => float_binop!(op, *x, *y, F32),
        (Value::F64(x), Value::F64(y)) => float_binop!(op, *x, *y, F64),
        (Value::I32(x), Value::I32(y)) => int_binop!(op, *x, *y, I32),
        (Value::I64(x), Value::I64(y)) => int_binop!(op, *x, *y, I64),
        (Value::Bool(x), Value::Bool(y)) => match op {
            BinOp::Eq => Some(Value::Bool(x == y)),
            BinOp::Ne => Some(Value::Bool(x != y)),
            BinOp::BitAnd => Some(Value::Bool(x & y)),
            BinOp::BitOr => Some(Value::Bool(x | y)),
            BinOp::BitXor => Some(Value::Bool(x ^ y)),
            _ => None,
        },
        _ => None,
    };
    result.ok_or_else(|| ExecError::InvalidOperand {
        op: op.symbol().to_string(),
        found: if a.ty() == b.ty() { a.ty() } else { b.ty() },
    })
}

fn eval_unop(op: UnOp, value: Value) -> Result<Value, ExecError> {
    let result = match (op, &value) {
        (UnOp::Neg, Value::F32(x)) => Value::F32(-x),
        (UnOp::Neg, Value::F64(x)) => Value::F64(-x),
        (UnOp::Neg, Value::I32(x)) => Value::I32(x.wrapping_neg()),
        (UnOp::Neg, Value::I64(x)) => Value::I64(x.wrapping_neg()),
        (UnOp::Not, Value::Bool(b)) => Value::Bool(!b),
        (UnOp::Not, Value::I32(x)) => Value::I32(!x),
        (UnOp::Not, Value::I64(x)) => Value::I64(!x),
        _ => {
            let op = if op == UnOp::Neg { "-" } else { "!" };
            return Err(ExecError::InvalidOperand { op: op.to_string(), found: value.ty() });
        }
    };
    Ok(result)
}

fn cast(value: Value, target: &Type) -> Result<Value, ExecError> {
    macro_rules! numeric {
        ($v:expr) => {
            match target {
                Type::I32 => Some(Value::I32($v as i32)),
                Type::I64 => Some(Value::I64($v as i64)),
                Type::F32 => Some(Value::F32($v as f32)),
                Type::F64 => Some(Value::F64($v as f64)),
                _ => None,
            }
        };
    }
    let result = match &value {
        Value::I32(v) => numeric!(*v),
        Value::I64(v) => numeric!(*v),
        Value::F32(v) => numeric!(*v),
        Value::F64(v) => numeric!(*v),
        Value::Bool(b) if *target == Type::Bool => Some(Value::Bool(*b)),
        Value::Bool(b) => numeric!(u8::from(*b)),
        _ if value.ty() == *target => Some(value.clone()),
        _ => None,
    };
    result.ok_or_else(|| ExecError::InvalidOperand { op: format!("as {}", target), found: value.ty() })
}
