//! Inlining of `Always` call sites.
//!
//! Items are processed callees first, so a callee is already flat when it is
//! spliced into its callers. Recursive edges never carry `Always`, which keeps
//! the spliced graph acyclic.

use tracing::trace;

use crate::mir::{
    BasicBlockId, Constant, ConstantKind, DefId, InlineDirective, LocalId, LocalKind, Location, MirBody,
    MutVisitor, Operand, Place, PlaceContext, Rvalue, Statement, StatementKind, Terminator, TerminatorKind,
};
use crate::program::{FnItem, Program};
use crate::ty::Type;

/// Inline every `Always` site in the items of `order`, which must list
/// callees before callers. Returns the number of spliced sites.
pub(crate) fn inline_program(program: &mut Program, order: &[DefId]) -> usize {
    let mut total = 0;
    for &caller in order {
        let Some(mut body) = program.get(caller).and_then(FnItem::body).cloned() else {
            continue;
        };
        let spliced = inline_calls(&mut body, |def| program.get(def).and_then(FnItem::body));
        if spliced > 0 {
            trace!(%caller, spliced, "inlined call sites");
            if let Some(slot) = program.body_mut(caller) {
                *slot = body;
            }
            total += spliced;
        }
    }
    total
}

/// Splice the callee of every `Always` call in `body`. Callee bodies are
/// looked up through `callee_body` and must not contain `Always` sites.
pub(crate) fn inline_calls<'p>(body: &mut MirBody, callee_body: impl Fn(DefId) -> Option<&'p MirBody>) -> usize {
    let mut spliced = 0;
    let mut bb = 0;
    while bb < body.basic_blocks.len() {
        let site = match body.basic_blocks[bb].terminator.as_ref().map(|t| &t.kind) {
            Some(TerminatorKind::Call {
                func,
                args,
                destination,
                target: Some(target),
                inline: InlineDirective::Always,
            }) => match func.as_constant().map(|c| &c.kind) {
                Some(ConstantKind::FnDef(def)) => Some((*def, args.clone(), destination.clone(), *target)),
                _ => None,
            },
            _ => None,
        };

        if let Some((def, args, destination, target)) = site {
            if let Some(callee) = callee_body(def) {
                splice(body, BasicBlockId::new(bb as u32), callee, args, destination, target);
                spliced += 1;
            }
        }
        bb += 1;
    }
    spliced
}

fn splice(
    body: &mut MirBody,
    site: BasicBlockId,
    callee: &MirBody,
    args: Vec<Operand>,
    destination: Place,
    continuation: BasicBlockId,
) {
    let span = body.basic_blocks[site.index()]
        .terminator
        .as_ref()
        .map(|t| t.span)
        .unwrap_or(body.span);
    let local_offset = body.locals.len() as u32;
    let block_offset = body.basic_blocks.len() as u32;

    for local in &callee.locals {
        let id = body.new_local(local.ty.clone(), LocalKind::Temp, local.span);
        body.locals[id.index()].name = local.name.clone();
    }

    let callee_return = LocalId::new(local_offset);
    let result = if *callee.return_type() == Type::Unit {
        Rvalue::Use(Operand::constant(Constant::unit()))
    } else {
        Rvalue::Use(Operand::copy(callee_return))
    };

    let mut remap = Renumber { local_offset };
    for (idx, block) in callee.basic_blocks.iter().enumerate() {
        let mut block = block.clone();
        remap.visit_basic_block_mut(BasicBlockId::new(idx as u32), &mut block);
        if let Some(term) = &mut block.terminator {
            if term.kind.is_return() {
                block.statements.push(Statement::new(
                    StatementKind::Assign(destination.clone(), result.clone()),
                    term.span,
                ));
                term.kind = TerminatorKind::Goto { target: continuation };
            } else {
                term.kind.map_successors(|b| BasicBlockId::new(b.0 + block_offset));
            }
        }
        body.basic_blocks.push(block);
    }

    let site_block = &mut body.basic_blocks[site.index()];
    for (i, arg) in args.into_iter().enumerate() {
        let param = Place::local(LocalId::new(local_offset + 1 + i as u32));
        site_block.statements.push(Statement::new(
            StatementKind::Assign(param, Rvalue::Use(arg)),
            span,
        ));
    }
    site_block.terminator = Some(Terminator::new(
        TerminatorKind::Goto { target: BasicBlockId::new(block_offset) },
        span,
    ));
}

struct Renumber {
    local_offset: u32,
}

impl MutVisitor for Renumber {
    fn visit_local_mut(&mut self, local: &mut LocalId, _context: PlaceContext, _location: Location) {
        local.0 += self.local_offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intrinsics::{Intrinsic, MathOp};
    use crate::mir::{validate_body, BinOp, BodyBuilder, Phase, SwitchTargets};
    use crate::interp::Interpreter;
    use crate::value::Value;

    /// `sq(x) = x * x`
    fn square() -> MirBody {
        let mut b = BodyBuilder::new(vec![Type::F64], Type::F64);
        let x = b.param(0);
        b.assign(LocalId::RETURN, Rvalue::binary(BinOp::Mul, Operand::copy(x), Operand::copy(x)));
        b.ret();
        b.finish()
    }

    fn caller_of(callee: DefId, directive: InlineDirective) -> MirBody {
        // f(x) = sin(sq(x))
        let mut b = BodyBuilder::new(vec![Type::F64], Type::F64);
        let x = b.param(0);
        let t = b.temp(Type::F64);
        b.call_with(Operand::item(callee), vec![Operand::copy(x)], t, directive);
        b.call(Operand::intrinsic(Intrinsic::Math(MathOp::Sin)), vec![Operand::copy(t)], LocalId::RETURN);
        b.ret();
        b.finish()
    }

    #[test]
    fn test_inlined_body_is_valid_and_equivalent() {
        let mut program = Program::new();
        let sq = program.add("sq", square());
        let f = program.add("f", caller_of(sq, InlineDirective::Always));
        let before = Interpreter::new(&program, 16).run(f, &[Value::F64(1.5)]).unwrap();

        assert_eq!(inline_program(&mut program, &[sq, f]), 1);
        let body = program.get(f).and_then(FnItem::body).unwrap();
        assert!(validate_body(body, Phase::Specialized).is_empty(), "{}", body);
        let calls_to_sq = body
            .basic_blocks
            .iter()
            .filter(|bb| {
                matches!(&bb.terminator.as_ref().unwrap().kind, TerminatorKind::Call { func, .. }
                    if matches!(func.as_constant().map(|c| &c.kind), Some(ConstantKind::FnDef(_))))
            })
            .count();
        assert_eq!(calls_to_sq, 0);

        let after = Interpreter::new(&program, 16).run(f, &[Value::F64(1.5)]).unwrap();
        assert!(after.bit_eq(&before));
    }

    #[test]
    fn test_default_and_never_sites_are_kept() {
        for directive in [InlineDirective::Default, InlineDirective::Never] {
            let mut program = Program::new();
            let sq = program.add("sq", square());
            let f = program.add("f", caller_of(sq, directive));
            assert_eq!(inline_program(&mut program, &[sq, f]), 0);
        }
    }

    #[test]
    fn test_callee_with_branches() {
        // relu(x) = if x > 0 { x } else { 0 }
        let mut b = BodyBuilder::new(vec![Type::F64], Type::F64);
        let x = b.param(0);
        let pos = b.temp(Type::Bool);
        b.assign(pos, Rvalue::binary(BinOp::Gt, Operand::copy(x), Operand::constant(Constant::f64(0.0))));
        let (then, els) = (b.new_block(), b.new_block());
        b.switch_int(Operand::copy(pos), SwitchTargets::if_true(then, els));
        b.switch_to(then);
        b.assign(LocalId::RETURN, Rvalue::Use(Operand::copy(x)));
        b.ret();
        b.switch_to(els);
        b.assign(LocalId::RETURN, Rvalue::Use(Operand::constant(Constant::f64(0.0))));
        b.ret();

        let mut program = Program::new();
        let relu = program.add("relu", b.finish());
        let f = program.add("f", caller_of(relu, InlineDirective::Always));
        inline_program(&mut program, &[relu, f]);

        let interp = Interpreter::new(&program, 16);
        assert_eq!(interp.run(f, &[Value::F64(-2.0)]).unwrap(), Value::F64(0.0));
        assert_eq!(interp.run(f, &[Value::F64(0.5)]).unwrap(), Value::F64(0.5f64.sin()));
    }

    #[test]
    fn test_unit_callee() {
        let mut b = BodyBuilder::new(vec![], Type::Unit);
        b.ret();
        let mut program = Program::new();
        let noop = program.add("noop", b.finish());

        let mut b = BodyBuilder::new(vec![], Type::Unit);
        b.call_with(Operand::item(noop), vec![], LocalId::RETURN, InlineDirective::Always);
        b.ret();
        let f = program.add("f", b.finish());

        assert_eq!(inline_program(&mut program, &[noop, f]), 1);
        assert_eq!(Interpreter::new(&program, 4).run(f, &[]).unwrap(), Value::Unit);
    }
}
