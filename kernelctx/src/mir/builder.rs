//! Incremental construction of MIR bodies.
//!
//! The builder keeps a cursor on the block being filled. Calls terminate
//! the current block and move the cursor to a fresh continuation block, so
//! straight-line kernel code reads top to bottom:
//!
//! ```
//! use kernelctx::mir::{BodyBuilder, Operand, Place, LocalId};
//! use kernelctx::intrinsics::{Intrinsic, MathOp};
//! use kernelctx::ty::Type;
//!
//! // g(x) = sin(x)
//! let mut b = BodyBuilder::new(vec![Type::F32], Type::F32);
//! let x = b.param(0);
//! b.call(Operand::intrinsic(Intrinsic::Math(MathOp::Sin)), vec![Operand::copy(x)], Place::local(LocalId::RETURN));
//! b.ret();
//! let body = b.finish();
//! assert_eq!(body.basic_blocks.len(), 2);
//! ```

use crate::span::Span;
use crate::ty::Type;
use super::body::{LocalKind, MirBody};
use super::types::{
    BasicBlockId, InlineDirective, LocalId, Operand, Place, Rvalue, Statement, StatementKind,
    SwitchTargets, Terminator, TerminatorKind,
};

/// Builds a [`MirBody`] block by block.
#[derive(Debug)]
pub struct BodyBuilder {
    body: MirBody,
    current: BasicBlockId,
    span: Span,
}

impl BodyBuilder {
    /// Start a body with the given parameter and return types. The cursor
    /// is on the entry block.
    pub fn new(params: Vec<Type>, return_ty: Type) -> Self {
        let mut body = MirBody::new(return_ty, Span::dummy());
        body.param_count = params.len();
        for ty in params {
            body.new_local(ty, LocalKind::Arg, Span::dummy());
        }
        body.type_params = body.locals.iter().map(|l| max_param(&l.ty)).max().unwrap_or(0);
        let current = body.new_block();
        Self { body, current, span: Span::dummy() }
    }

    /// Declare the number of generic type parameters explicitly, for
    /// parameters that only appear in locals or constants.
    pub fn type_params(&mut self, count: u32) -> &mut Self {
        self.body.type_params = self.body.type_params.max(count);
        self
    }

    /// Span attached to subsequently built statements and terminators.
    pub fn set_span(&mut self, span: Span) -> &mut Self {
        self.span = span;
        self
    }

    /// The local of the `index`-th parameter.
    pub fn param(&self, index: usize) -> LocalId {
        debug_assert!(index < self.body.param_count);
        LocalId::new(index as u32 + 1)
    }

    pub fn temp(&mut self, ty: Type) -> LocalId {
        self.body.type_params = self.body.type_params.max(max_param(&ty));
        self.body.new_temp(ty, self.span)
    }

    /// A named user variable.
    pub fn var(&mut self, name: &str, ty: Type) -> LocalId {
        self.body.type_params = self.body.type_params.max(max_param(&ty));
        let id = self.body.new_local(ty, LocalKind::Var, self.span);
        self.body.locals[id.index()].name = Some(name.to_string());
        id
    }

    pub fn current_block(&self) -> BasicBlockId {
        self.current
    }

    pub fn new_block(&mut self) -> BasicBlockId {
        self.body.new_block()
    }

    pub fn switch_to(&mut self, block: BasicBlockId) {
        self.current = block;
    }

    pub fn assign(&mut self, place: impl Into<Place>, rvalue: Rvalue) {
        let stmt = Statement::new(StatementKind::Assign(place.into(), rvalue), self.span);
        self.body.push_statement(self.current, stmt);
    }

    /// `dest = func(args...)` with no inlining preference.
    pub fn call(&mut self, func: Operand, args: Vec<Operand>, destination: impl Into<Place>) -> BasicBlockId {
        self.call_with(func, args, destination, InlineDirective::Default)
    }

    /// `dest = func(args...)` at a call site that must never be inlined.
    pub fn call_noinline(&mut self, func: Operand, args: Vec<Operand>, destination: impl Into<Place>) -> BasicBlockId {
        self.call_with(func, args, destination, InlineDirective::Never)
    }

    /// Terminate the current block with a call and continue in a new block,
    /// which is returned.
    pub fn call_with(
        &mut self,
        func: Operand,
        args: Vec<Operand>,
        destination: impl Into<Place>,
        inline: InlineDirective,
    ) -> BasicBlockId {
        let next = self.body.new_block();
        self.terminate(TerminatorKind::Call {
            func,
            args,
            destination: destination.into(),
            target: Some(next),
            inline,
        });
        self.current = next;
        next
    }

    pub fn goto(&mut self, target: BasicBlockId) {
        self.terminate(TerminatorKind::Goto { target });
    }

    pub fn switch_int(&mut self, discr: Operand, targets: SwitchTargets) {
        self.terminate(TerminatorKind::SwitchInt { discr, targets });
    }

    pub fn ret(&mut self) {
        self.terminate(TerminatorKind::Return);
    }

    pub fn unreachable(&mut self) {
        self.terminate(TerminatorKind::Unreachable);
    }

    fn terminate(&mut self, kind: TerminatorKind) {
        self.body.set_terminator(self.current, Terminator::new(kind, self.span));
    }

    pub fn finish(self) -> MirBody {
        self.body
    }
}

/// One past the highest generic parameter mentioned in `ty`.
fn max_param(ty: &Type) -> u32 {
    match ty {
        Type::Param(p) => p.saturating_add(1),
        Type::Tuple(elems) => elems.iter().map(max_param).max().unwrap_or(0),
        Type::Struct(def) => def.fields.iter().map(max_param).max().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::types::{BinOp, Constant};

    #[test]
    fn test_params_and_generics() {
        let b = BodyBuilder::new(vec![Type::Param(0), Type::Param(1)], Type::Param(0));
        assert_eq!(b.param(1), LocalId::new(2));
        let body = b.finish();
        assert_eq!(body.type_params, 2);
        assert_eq!(body.param_count, 2);
    }

    #[test]
    fn test_call_splits_block() {
        let mut b = BodyBuilder::new(vec![], Type::Unit);
        let entry = b.current_block();
        let next = b.call(Operand::item(crate::mir::DefId::new(1)), vec![], LocalId::RETURN);
        b.ret();
        let body = b.finish();
        assert_ne!(entry, next);
        assert_eq!(body.basic_blocks[entry.index()].successors(), vec![next]);
        assert!(body.is_complete());
    }

    #[test]
    fn test_branching_body() {
        // _0 = if _1 < 0 { -1 } else { 1 }
        let mut b = BodyBuilder::new(vec![Type::I32], Type::I32);
        let x = b.param(0);
        let neg = b.temp(Type::Bool);
        b.assign(neg, Rvalue::binary(BinOp::Lt, Operand::copy(x), Operand::constant(Constant::int(0, Type::I32))));
        let then = b.new_block();
        let els = b.new_block();
        b.switch_int(Operand::copy(neg), SwitchTargets::if_true(then, els));
        b.switch_to(then);
        b.assign(LocalId::RETURN, Rvalue::Use(Operand::constant(Constant::int(-1, Type::I32))));
        b.ret();
        b.switch_to(els);
        b.assign(LocalId::RETURN, Rvalue::Use(Operand::constant(Constant::int(1, Type::I32))));
        b.ret();
        let body = b.finish();
        assert_eq!(body.basic_blocks.len(), 3);
        assert!(body.is_complete());
    }
}
