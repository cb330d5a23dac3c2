//! # MIR Function Bodies
//!
//! ## Local Convention
//!
//! - `_0`: Return place
//! - `_1..=_n`: Parameters (where n = param_count)
//! - `_(n+1)..`: Temporaries and user variables

use crate::span::Span;
use crate::ty::Type;
use super::types::{BasicBlockData, BasicBlockId, LocalId, Place, PlaceElem, Statement, Terminator};

/// What a local is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalKind {
    ReturnPlace,
    Arg,
    Var,
    Temp,
}

/// A local variable declaration.
#[derive(Debug, Clone)]
pub struct MirLocal {
    pub id: LocalId,
    pub ty: Type,
    pub kind: LocalKind,
    /// User-facing name, if any.
    pub name: Option<String>,
    pub span: Span,
}

/// A MIR function body.
#[derive(Debug, Clone)]
pub struct MirBody {
    /// All locals (return place at index 0, then params, then temps).
    pub locals: Vec<MirLocal>,
    /// Number of parameters (not counting the return place).
    pub param_count: usize,
    /// Number of generic type parameters (`T0..`).
    pub type_params: u32,
    /// The basic blocks of the CFG.
    pub basic_blocks: Vec<BasicBlockData>,
    pub span: Span,
}

impl MirBody {
    /// A body with a return place and no blocks.
    pub fn new(return_ty: Type, span: Span) -> Self {
        let mut body = Self {
            locals: Vec::new(),
            param_count: 0,
            type_params: 0,
            basic_blocks: Vec::new(),
            span,
        };
        body.new_local(return_ty, LocalKind::ReturnPlace, span);
        body
    }

    pub fn return_type(&self) -> &Type {
        &self.locals[0].ty
    }

    /// Declared parameter types.
    pub fn param_types(&self) -> impl Iterator<Item = &Type> {
        self.locals.iter().skip(1).take(self.param_count).map(|l| &l.ty)
    }

    pub fn param_ids(&self) -> impl Iterator<Item = LocalId> {
        (1..=self.param_count).map(|i| LocalId::new(i as u32))
    }

    pub fn get_local(&self, id: LocalId) -> Option<&MirLocal> {
        self.locals.get(id.index())
    }

    pub fn new_local(&mut self, ty: Type, kind: LocalKind, span: Span) -> LocalId {
        let id = LocalId::new(self.locals.len() as u32);
        self.locals.push(MirLocal { id, ty, kind, name: None, span });
        id
    }

    pub fn new_temp(&mut self, ty: Type, span: Span) -> LocalId {
        self.new_local(ty, LocalKind::Temp, span)
    }

    pub fn get_block(&self, id: BasicBlockId) -> Option<&BasicBlockData> {
        self.basic_blocks.get(id.index())
    }

    pub fn new_block(&mut self) -> BasicBlockId {
        let id = BasicBlockId::new(self.basic_blocks.len() as u32);
        self.basic_blocks.push(BasicBlockData::new());
        id
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BasicBlockId> {
        (0..self.basic_blocks.len()).map(|i| BasicBlockId::new(i as u32))
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BasicBlockId, &BasicBlockData)> {
        self.basic_blocks
            .iter()
            .enumerate()
            .map(|(i, bb)| (BasicBlockId::new(i as u32), bb))
    }

    pub fn is_complete(&self) -> bool {
        self.basic_blocks.iter().all(BasicBlockData::is_terminated)
    }

    pub fn push_statement(&mut self, block: BasicBlockId, stmt: Statement) {
        if let Some(bb) = self.basic_blocks.get_mut(block.index()) {
            bb.statements.push(stmt);
        }
    }

    pub fn set_terminator(&mut self, block: BasicBlockId, term: Terminator) {
        if let Some(bb) = self.basic_blocks.get_mut(block.index()) {
            bb.terminator = Some(term);
        }
    }

    /// Type of a place, following field projections.
    pub fn place_ty(&self, place: &Place) -> Option<&Type> {
        let mut ty = &self.get_local(place.local)?.ty;
        for elem in &place.projection {
            match elem {
                PlaceElem::Field(idx) => ty = ty.field(*idx)?,
            }
        }
        Some(ty)
    }
}
