//! Monomorphization of generic bodies.

use crate::error::RewriteError;
use crate::mir::{AggregateKind, Constant, ConstantKind, Location, MirBody, MutVisitor, Rvalue};
use crate::ty::{Subst, Type};

/// Bind the parameters of `body` to `arg_types` and return the concrete
/// body. `name` is only used in errors.
pub(crate) fn monomorphize(body: &MirBody, arg_types: &[Type], name: &str) -> Result<MirBody, RewriteError> {
    if body.param_count != arg_types.len() {
        return Err(RewriteError::Arity {
            name: name.to_string(),
            expected: body.param_count,
            found: arg_types.len(),
        });
    }

    let mut subst = Subst::new();
    for (declared, actual) in body.param_types().zip(arg_types) {
        subst.unify(declared, actual).map_err(|m| RewriteError::TypeMismatch {
            name: name.to_string(),
            expected: m.expected,
            found: m.found,
        })?;
    }

    let mut mono = body.clone();
    if body.type_params == 0 && !body.locals.iter().any(|l| l.ty.has_params()) {
        return Ok(mono);
    }

    let mut folder = TypeFolder { subst: &subst, unbound: None };
    for local in &mut mono.locals {
        folder.apply(&mut local.ty);
    }
    folder.visit_body_mut(&mut mono);
    mono.type_params = 0;

    match folder.unbound {
        Some(param) => Err(RewriteError::UnboundParam { name: name.to_string(), param }),
        None => Ok(mono),
    }
}

struct TypeFolder<'s> {
    subst: &'s Subst,
    unbound: Option<u32>,
}

impl TypeFolder<'_> {
    fn apply(&mut self, ty: &mut Type) {
        if !ty.has_params() {
            return;
        }
        match self.subst.apply(ty) {
            Ok(concrete) => *ty = concrete,
            Err(param) => {
                self.unbound.get_or_insert(param);
            }
        }
    }
}

impl MutVisitor for TypeFolder<'_> {
    fn visit_rvalue_mut(&mut self, rvalue: &mut Rvalue, location: Location) {
        match rvalue {
            Rvalue::Cast { target_ty, .. } => self.apply(target_ty),
            Rvalue::Aggregate { kind: AggregateKind::Struct(def), .. } => {
                let mut ty = Type::Struct(def.clone());
                self.apply(&mut ty);
                if let Type::Struct(concrete) = ty {
                    *def = concrete;
                }
            }
            _ => {}
        }
        self.super_rvalue_mut(rvalue, location);
    }

    fn visit_constant_mut(&mut self, constant: &mut Constant, _location: Location) {
        self.apply(&mut constant.ty);
        if let ConstantKind::Type(ty) = &mut constant.kind {
            self.apply(ty);
        }
    }
}
