//! MIR validation pass.
//!
//! Checks bodies for well-formedness. Specialized bodies are validated
//! before they are handed out, so a broken rewrite surfaces as a
//! specialization error instead of a confusing failure at execution time.

use super::body::{LocalKind, MirBody};
use super::types::{ConstantKind, LocalId, Operand, Place, PlaceElem, TerminatorKind};
use crate::ty::Type;
use super::visitor::{walk_body, Location, PlaceContext, Visitor};

/// How strict validation is about generic types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Source bodies may mention type parameters.
    Generic,
    /// Specialized bodies must be fully concrete.
    Specialized,
}

/// Validate a body. Returns a description of every problem found.
pub fn validate_body(body: &MirBody, phase: Phase) -> Vec<String> {
    let mut errors = Vec::new();
    let num_blocks = body.basic_blocks.len();

    if num_blocks == 0 {
        errors.push("body has no basic blocks".to_string());
        return errors;
    }

    match body.locals.first() {
        None => errors.push("body has no locals (missing return place)".to_string()),
        Some(local) if local.kind != LocalKind::ReturnPlace => {
            errors.push(format!("local _0 should be the return place but is {:?}", local.kind));
        }
        Some(_) => {}
    }

    if body.locals.len() <= body.param_count {
        errors.push(format!(
            "body declares {} parameters but only {} locals",
            body.param_count,
            body.locals.len()
        ));
    }

    for (bb, block) in body.blocks() {
        let Some(term) = &block.terminator else {
            errors.push(format!("{} has no terminator", bb));
            continue;
        };
        for target in term.successors() {
            if target.index() >= num_blocks {
                errors.push(format!("{} jumps to non-existent block {} (body has {} blocks)", bb, target, num_blocks));
            }
        }
        if let TerminatorKind::Call { func, .. } = &term.kind {
            if !is_callable(func) {
                errors.push(format!("{} calls something that is not a function constant", bb));
            }
        }
    }

    let mut locals = LocalChecker { body, errors: &mut errors };
    walk_body(&mut locals, body);

    if phase == Phase::Specialized {
        for local in &body.locals {
            if local.ty.has_params() {
                errors.push(format!("local {} has unresolved type {}", local.id, local.ty));
            }
        }
    }

    errors
}

fn is_callable(func: &Operand) -> bool {
    matches!(
        func.as_constant().map(|c| &c.kind),
        Some(ConstantKind::FnDef(_) | ConstantKind::Intrinsic(_) | ConstantKind::Routine(_))
    )
}

fn describe(location: Location) -> String {
    if location.is_terminator() {
        format!("terminator of {}", location.block)
    } else {
        format!("{}[{}]", location.block, location.statement_index)
    }
}

struct LocalChecker<'a> {
    body: &'a MirBody,
    errors: &'a mut Vec<String>,
}

impl Visitor for LocalChecker<'_> {
    fn visit_place(&mut self, place: &Place, context: PlaceContext, location: Location) {
        self.super_place(place, context, location);
        let Some(local) = self.body.get_local(place.local) else {
            return;
        };
        let mut ty = &local.ty;
        for elem in &place.projection {
            if matches!(ty, Type::Param(_)) {
                return;
            }
            match elem {
                PlaceElem::Field(idx) => match ty.field(*idx) {
                    Some(field) => ty = field,
                    None => {
                        self.errors.push(format!("{} projects field {} of {} in {}", describe(location), idx, ty, place));
                        return;
                    }
                },
            }
        }
    }

    fn visit_local(&mut self, local: LocalId, _context: PlaceContext, location: Location) {
        let num_locals = self.body.locals.len();
        if local.index() >= num_locals {
            self.errors.push(format!(
                "{} references non-existent local {} (body has {} locals)",
                describe(location),
                local,
                num_locals
            ));
        }
    }
}
