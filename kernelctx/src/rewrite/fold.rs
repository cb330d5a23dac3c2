//! Folding and contraction of contracted arithmetic.
//!
//! Both passes only touch operations in [`FloatMode::Contract`], which the
//! rewriter produces from substituted arithmetic. Strict operations are never
//! changed.
//!
//! - [`fold_constants`]: contracted operations whose operands are constants
//!   (directly, or through a local assigned exactly once from a constant)
//!   are evaluated at rewrite time.
//! - [`contract`]: a contracted multiply whose only use is a contracted
//!   add or subtract later in the same block becomes one
//!   [`Rvalue::FusedMulAdd`].

use std::collections::HashMap;

use crate::emit::FusedOp;
use crate::intrinsics::ArithOp;
use crate::interp::eval_constant;
use crate::mir::{
    BinOp, Constant, ConstantKind, FloatMode, LocalId, LocalUses, MirBody, Operand, Rvalue, Statement,
    StatementKind, UnOp,
};
use crate::ty::Subst;
use crate::value::Value;

/// Fold constant contracted operations. Returns the number folded.
pub(crate) fn fold_constants(body: &mut MirBody) -> usize {
    let uses = LocalUses::compute(body);
    let single: Vec<bool> = body
        .locals
        .iter()
        .map(|l| l.id.index() > body.param_count && uses.writes(l.id) == 1)
        .collect();
    let is_single = |local: LocalId| single.get(local.index()).copied().unwrap_or(false);

    let mut known: HashMap<LocalId, Constant> = HashMap::new();
    for block in &body.basic_blocks {
        for stmt in &block.statements {
            if let StatementKind::Assign(place, Rvalue::Use(Operand::Constant(c))) = &stmt.kind {
                if place.is_local() && is_single(place.local) {
                    known.insert(place.local, c.clone());
                }
            }
        }
    }

    let mut folded = 0;
    loop {
        let mut changed = false;
        for block in &mut body.basic_blocks {
            for stmt in &mut block.statements {
                let StatementKind::Assign(place, rvalue) = &mut stmt.kind else {
                    continue;
                };
                let Rvalue::BinaryOp { op, mode: FloatMode::Contract, left, right } = rvalue else {
                    continue;
                };
                propagate(left, &known);
                propagate(right, &known);
                let (Some(l), Some(r)) = (left.as_constant(), right.as_constant()) else {
                    continue;
                };
                let Some(result) = fold_contracted(*op, l, r) else {
                    continue;
                };
                if place.is_local() && is_single(place.local) {
                    known.insert(place.local, result.clone());
                }
                *rvalue = Rvalue::Use(Operand::constant(result));
                folded += 1;
                changed = true;
            }
        }
        if !changed {
            return folded;
        }
    }
}

fn propagate(operand: &mut Operand, known: &HashMap<LocalId, Constant>) {
    let replacement = match operand.place() {
        Some(place) if place.is_local() => known.get(&place.local).cloned(),
        _ => None,
    };
    if let Some(c) = replacement {
        *operand = Operand::constant(c);
    }
}

fn fold_contracted(op: BinOp, left: &Constant, right: &Constant) -> Option<Constant> {
    let arith = ArithOp::from_binop(op)?;
    let width = left.ty.float_width()?;
    if right.ty != left.ty {
        return None;
    }
    let subst = Subst::new();
    let (a, b) = (eval_constant(left, &subst).ok()?, eval_constant(right, &subst).ok()?);
    let fused = FusedOp { op: arith, width };
    match fused.eval(&a, &b).ok()? {
        Value::F32(v) => Some(Constant::f32(v)),
        Value::F64(v) => Some(Constant::f64(v)),
        _ => None,
    }
}

#[derive(Debug)]
enum Shape {
    /// `t + d` or `d + t`
    Add,
    /// `t - d`
    SubAddend,
    /// `d - t`
    SubProduct,
}

#[derive(Debug)]
struct Fusion {
    block: usize,
    mul: usize,
    add: usize,
    a: Operand,
    b: Operand,
    addend: Operand,
    shape: Shape,
}

/// Fuse contracted multiply-add chains. Returns the number fused.
pub(crate) fn contract(body: &mut MirBody) -> usize {
    let mut fused = 0;
    while let Some(fusion) = find_fusion(body) {
        apply_fusion(body, fusion);
        fused += 1;
    }
    fused
}

fn find_fusion(body: &MirBody) -> Option<Fusion> {
    let uses = LocalUses::compute(body);
    for (bi, block) in body.basic_blocks.iter().enumerate() {
        for (mi, stmt) in block.statements.iter().enumerate() {
            let StatementKind::Assign(
                place,
                Rvalue::BinaryOp { op: BinOp::Mul, mode: FloatMode::Contract, left: a, right: b },
            ) = &stmt.kind
            else {
                continue;
            };
            let t = place.local;
            if !place.is_local()
                || t.index() <= body.param_count
                || uses.writes(t) != 1
                || uses.reads(t) != 1
                || !body.locals[t.index()].ty.is_float()
            {
                continue;
            }

            let is_t = |o: &Operand| o.place().is_some_and(|p| p.is_local() && p.local == t);
            let operand_locals: Vec<LocalId> = [a, b].iter().filter_map(|o| o.place()).map(|p| p.local).collect();

            for (ai, later) in block.statements.iter().enumerate().skip(mi + 1) {
                if let StatementKind::Assign(_, Rvalue::BinaryOp { op, mode: FloatMode::Contract, left, right }) =
                    &later.kind
                {
                    let found = match op {
                        BinOp::Add if is_t(left) => Some((Shape::Add, right)),
                        BinOp::Add if is_t(right) => Some((Shape::Add, left)),
                        BinOp::Sub if is_t(left) => Some((Shape::SubAddend, right)),
                        BinOp::Sub if is_t(right) => Some((Shape::SubProduct, left)),
                        _ => None,
                    };
                    if let Some((shape, addend)) = found {
                        return Some(Fusion {
                            block: bi,
                            mul: mi,
                            add: ai,
                            a: a.clone(),
                            b: b.clone(),
                            addend: addend.clone(),
                            shape,
                        });
                    }
                }
                if writes_any(later, &operand_locals) || reads_local(later, t) {
                    break;
                }
            }
        }
    }
    None
}

fn writes_any(stmt: &Statement, locals: &[LocalId]) -> bool {
    match &stmt.kind {
        StatementKind::Assign(place, _) => locals.contains(&place.local),
        StatementKind::StorageDead(local) | StatementKind::StorageLive(local) => locals.contains(local),
        StatementKind::Nop => false,
    }
}

fn reads_local(stmt: &Statement, local: LocalId) -> bool {
    match &stmt.kind {
        StatementKind::Assign(_, rvalue) => rvalue
            .operands()
            .iter()
            .any(|o| o.place().is_some_and(|p| p.local == local)),
        _ => false,
    }
}

fn apply_fusion(body: &mut MirBody, fusion: Fusion) {
    let Fusion { block, mul, mut add, a, b, addend, shape } = fusion;
    let ty = match &body.basic_blocks[block].statements[mul].kind {
        StatementKind::Assign(place, _) => body.locals[place.local.index()].ty.clone(),
        _ => return,
    };
    let span = body.basic_blocks[block].statements[add].span;

    let negate = |operand: Operand, body: &mut MirBody, add: &mut usize| -> Operand {
        if let Operand::Constant(Constant { ty: const_ty, kind: ConstantKind::Float(v) }) = &operand {
            return Operand::constant(Constant::float(-v, const_ty.clone()));
        }
        let neg = body.new_temp(ty.clone(), span);
        body.basic_blocks[block].statements.insert(
            *add,
            Statement::new(StatementKind::Assign(neg.into(), Rvalue::UnaryOp { op: UnOp::Neg, operand }), span),
        );
        *add += 1;
        Operand::copy(neg)
    };

    let fma = match shape {
        Shape::Add => Rvalue::FusedMulAdd { a, b, c: addend },
        Shape::SubAddend => {
            let c = negate(addend, body, &mut add);
            Rvalue::FusedMulAdd { a, b, c }
        }
        Shape::SubProduct => {
            let a = negate(a, body, &mut add);
            Rvalue::FusedMulAdd { a, b, c: addend }
        }
    };

    let statements = &mut body.basic_blocks[block].statements;
    if let StatementKind::Assign(_, rvalue) = &mut statements[add].kind {
        *rvalue = fma;
    }
    statements[mul].kind = StatementKind::Nop;
}
