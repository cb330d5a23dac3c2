//! # MIR Visitor Infrastructure
//!
//! - `Visitor` for immutable traversal (analysis passes)
//! - `MutVisitor` for mutable traversal (transformation passes)
//!
//! Each `visit_X` method has a corresponding `super_X` method that performs
//! the default recursive traversal. Override `visit_X` for custom behavior,
//! call `super_X` to continue traversal into children.

use super::body::MirBody;
use super::types::{
    BasicBlockData, BasicBlockId, Constant, LocalId, Operand, Place, Rvalue, Statement, StatementKind,
    Terminator, TerminatorKind,
};

// ============================================================================
// Location
// ============================================================================

/// Identifies a statement or terminator within a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub block: BasicBlockId,
    /// Statement index, or `TERMINATOR`.
    pub statement_index: usize,
}

impl Location {
    /// Sentinel value for terminator position.
    pub const TERMINATOR: usize = usize::MAX;

    pub fn statement(block: BasicBlockId, index: usize) -> Self {
        Self { block, statement_index: index }
    }

    pub fn terminator(block: BasicBlockId) -> Self {
        Self { block, statement_index: Self::TERMINATOR }
    }

    pub fn is_terminator(&self) -> bool {
        self.statement_index == Self::TERMINATOR
    }
}

/// How a place is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceContext {
    /// Read by copy.
    Copy,
    /// Read by move.
    Move,
    /// Written by an assignment or call.
    Store,
    StorageLive,
    StorageDead,
}

impl PlaceContext {
    pub fn is_write(self) -> bool {
        matches!(self, PlaceContext::Store)
    }

    pub fn is_read(self) -> bool {
        matches!(self, PlaceContext::Copy | PlaceContext::Move)
    }
}

// ============================================================================
// Visitor Trait (Immutable)
// ============================================================================

/// Visitor trait for immutable MIR traversal.
pub trait Visitor: Sized {
    fn visit_body(&mut self, body: &MirBody) {
        self.super_body(body);
    }

    fn super_body(&mut self, body: &MirBody) {
        for (bb_id, block) in body.blocks() {
            self.visit_basic_block(bb_id, block);
        }
    }

    fn visit_basic_block(&mut self, bb_id: BasicBlockId, block: &BasicBlockData) {
        self.super_basic_block(bb_id, block);
    }

    fn super_basic_block(&mut self, bb_id: BasicBlockId, block: &BasicBlockData) {
        for (idx, stmt) in block.statements.iter().enumerate() {
            self.visit_statement(stmt, Location::statement(bb_id, idx));
        }
        if let Some(ref term) = block.terminator {
            self.visit_terminator(term, Location::terminator(bb_id));
        }
    }

    fn visit_statement(&mut self, stmt: &Statement, location: Location) {
        self.super_statement(stmt, location);
    }

    fn super_statement(&mut self, stmt: &Statement, location: Location) {
        match &stmt.kind {
            StatementKind::Assign(place, rvalue) => {
                self.visit_rvalue(rvalue, location);
                self.visit_place(place, PlaceContext::Store, location);
            }
            StatementKind::StorageLive(local) => {
                self.visit_local(*local, PlaceContext::StorageLive, location);
            }
            StatementKind::StorageDead(local) => {
                self.visit_local(*local, PlaceContext::StorageDead, location);
            }
            StatementKind::Nop => {}
        }
    }

    fn visit_terminator(&mut self, term: &Terminator, location: Location) {
        self.super_terminator(term, location);
    }

    fn super_terminator(&mut self, term: &Terminator, location: Location) {
        match &term.kind {
            TerminatorKind::Goto { .. } | TerminatorKind::Return | TerminatorKind::Unreachable => {}
            TerminatorKind::SwitchInt { discr, .. } => {
                self.visit_operand(discr, location);
            }
            TerminatorKind::Call { func, args, destination, .. } => {
                self.visit_operand(func, location);
                for arg in args {
                    self.visit_operand(arg, location);
                }
                self.visit_place(destination, PlaceContext::Store, location);
            }
        }
    }

    fn visit_rvalue(&mut self, rvalue: &Rvalue, location: Location) {
        self.super_rvalue(rvalue, location);
    }

    fn super_rvalue(&mut self, rvalue: &Rvalue, location: Location) {
        for op in rvalue.operands() {
            self.visit_operand(op, location);
        }
    }

    fn visit_operand(&mut self, operand: &Operand, location: Location) {
        self.super_operand(operand, location);
    }

    fn super_operand(&mut self, operand: &Operand, location: Location) {
        match operand {
            Operand::Copy(place) => self.visit_place(place, PlaceContext::Copy, location),
            Operand::Move(place) => self.visit_place(place, PlaceContext::Move, location),
            Operand::Constant(c) => self.visit_constant(c, location),
        }
    }

    fn visit_place(&mut self, place: &Place, context: PlaceContext, location: Location) {
        self.super_place(place, context, location);
    }

    fn super_place(&mut self, place: &Place, context: PlaceContext, location: Location) {
        self.visit_local(place.local, context, location);
    }

    fn visit_local(&mut self, _local: LocalId, _context: PlaceContext, _location: Location) {}

    fn visit_constant(&mut self, _constant: &Constant, _location: Location) {}
}

// ============================================================================
// MutVisitor Trait
// ============================================================================

/// Visitor trait for mutable MIR traversal.
pub trait MutVisitor: Sized {
    fn visit_body_mut(&mut self, body: &mut MirBody) {
        self.super_body_mut(body);
    }

    fn super_body_mut(&mut self, body: &mut MirBody) {
        for (idx, block) in body.basic_blocks.iter_mut().enumerate() {
            self.visit_basic_block_mut(BasicBlockId::new(idx as u32), block);
        }
    }

    fn visit_basic_block_mut(&mut self, bb_id: BasicBlockId, block: &mut BasicBlockData) {
        self.super_basic_block_mut(bb_id, block);
    }

    fn super_basic_block_mut(&mut self, bb_id: BasicBlockId, block: &mut BasicBlockData) {
        for (idx, stmt) in block.statements.iter_mut().enumerate() {
            self.visit_statement_mut(stmt, Location::statement(bb_id, idx));
        }
        if let Some(ref mut term) = block.terminator {
            self.visit_terminator_mut(term, Location::terminator(bb_id));
        }
    }

    fn visit_statement_mut(&mut self, stmt: &mut Statement, location: Location) {
        self.super_statement_mut(stmt, location);
    }

    fn super_statement_mut(&mut self, stmt: &mut Statement, location: Location) {
        match &mut stmt.kind {
            StatementKind::Assign(place, rvalue) => {
                self.visit_rvalue_mut(rvalue, location);
                self.visit_place_mut(place, PlaceContext::Store, location);
            }
            StatementKind::StorageLive(local) => {
                self.visit_local_mut(local, PlaceContext::StorageLive, location);
            }
            StatementKind::StorageDead(local) => {
                self.visit_local_mut(local, PlaceContext::StorageDead, location);
            }
            StatementKind::Nop => {}
        }
    }

    fn visit_terminator_mut(&mut self, term: &mut Terminator, location: Location) {
        self.super_terminator_mut(term, location);
    }

    fn super_terminator_mut(&mut self, term: &mut Terminator, location: Location) {
        match &mut term.kind {
            TerminatorKind::Goto { .. } | TerminatorKind::Return | TerminatorKind::Unreachable => {}
            TerminatorKind::SwitchInt { discr, .. } => {
                self.visit_operand_mut(discr, location);
            }
            TerminatorKind::Call { func, args, destination, .. } => {
                self.visit_operand_mut(func, location);
                for arg in args {
                    self.visit_operand_mut(arg, location);
                }
                self.visit_place_mut(destination, PlaceContext::Store, location);
            }
        }
    }

    fn visit_rvalue_mut(&mut self, rvalue: &mut Rvalue, location: Location) {
        self.super_rvalue_mut(rvalue, location);
    }

    fn super_rvalue_mut(&mut self, rvalue: &mut Rvalue, location: Location) {
        match rvalue {
            Rvalue::Use(op) | Rvalue::UnaryOp { operand: op, .. } | Rvalue::Cast { operand: op, .. } => {
                self.visit_operand_mut(op, location);
            }
            Rvalue::BinaryOp { left, right, .. } => {
                self.visit_operand_mut(left, location);
                self.visit_operand_mut(right, location);
            }
            Rvalue::Aggregate { operands, .. } => {
                for op in operands {
                    self.visit_operand_mut(op, location);
                }
            }
            Rvalue::FusedMulAdd { a, b, c } => {
                self.visit_operand_mut(a, location);
                self.visit_operand_mut(b, location);
                self.visit_operand_mut(c, location);
            }
        }
    }

    fn visit_operand_mut(&mut self, operand: &mut Operand, location: Location) {
        self.super_operand_mut(operand, location);
    }

    fn super_operand_mut(&mut self, operand: &mut Operand, location: Location) {
        match operand {
            Operand::Copy(place) => self.visit_place_mut(place, PlaceContext::Copy, location),
            Operand::Move(place) => self.visit_place_mut(place, PlaceContext::Move, location),
            Operand::Constant(c) => self.visit_constant_mut(c, location),
        }
    }

    fn visit_place_mut(&mut self, place: &mut Place, context: PlaceContext, location: Location) {
        self.visit_local_mut(&mut place.local, context, location);
    }

    fn visit_local_mut(&mut self, _local: &mut LocalId, _context: PlaceContext, _location: Location) {}

    fn visit_constant_mut(&mut self, _constant: &mut Constant, _location: Location) {}
}

// ============================================================================
// Helpers
// ============================================================================

/// Walk a body with a visitor.
pub fn walk_body<V: Visitor>(visitor: &mut V, body: &MirBody) {
    visitor.visit_body(body);
}

/// Per-local read and write counts.
#[derive(Debug, Clone, Default)]
pub struct LocalUses {
    pub reads: Vec<usize>,
    pub writes: Vec<usize>,
}

impl LocalUses {
    /// Count uses of every local in `body`.
    pub fn compute(body: &MirBody) -> Self {
        let mut uses = Self { reads: vec![0; body.locals.len()], writes: vec![0; body.locals.len()] };
        walk_body(&mut uses, body);
        uses
    }

    pub fn reads(&self, local: LocalId) -> usize {
        self.reads.get(local.index()).copied().unwrap_or(0)
    }

    pub fn writes(&self, local: LocalId) -> usize {
        self.writes.get(local.index()).copied().unwrap_or(0)
    }
}

impl Visitor for LocalUses {
    fn visit_local(&mut self, local: LocalId, context: PlaceContext, _location: Location) {
        let idx = local.index();
        if idx >= self.reads.len() {
            return;
        }
        if context.is_read() {
            self.reads[idx] += 1;
        } else if context.is_write() {
            self.writes[idx] += 1;
        }
    }
}
