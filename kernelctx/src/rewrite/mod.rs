//! # Contextual Rewriter
//!
//! Produces the specialization of a kernel for one substitution table and
//! one argument-type signature. The pass works on a copy of the kernel's IR
//! and never modifies the source program.
//!
//! ## Algorithm
//!
//! 1. Extract the entry body and monomorphize it for the argument types.
//! 2. Visit every call terminator and every float `+ - *` operation,
//!    compute the callee identity and the argument types, and dispose of the
//!    site:
//!    - passthrough intrinsics are left exactly as written (checked first)
//!    - a table match is retargeted to its replacement
//!    - a call to a program item descends into the callee, specialized for
//!      the argument types, and is retargeted to that instance
//!    - anything else is left alone
//! 3. Descended call sites are marked `Always` unless the site says `Never`
//!    or the callee is `no_inline`. A callee already on the visitation stack
//!    is not descended again and keeps an ordinary call.
//! 4. `Always` sites are spliced, callees first ([`inline`]).
//! 5. Contracted arithmetic is folded and fused ([`fold`]).
//! 6. Every produced body is validated.
//!
//! Any item without an extractable body aborts the whole rewrite.

mod fold;
mod inline;
mod mono;

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::RewriteConfig;
use crate::emit::FusedOp;
use crate::error::RewriteError;
use crate::intrinsics::ArithOp;
use crate::mir::{
    validate_body, BasicBlockData, BasicBlockId, Constant, ConstantKind, DefId, FloatMode, InlineDirective,
    LocalId, Location, MirBody, Operand, Phase, Rvalue, Statement, StatementKind, SwitchTargets, Terminator,
    TerminatorKind,
};
use crate::program::{FnAttrs, FnItem, ItemKind, Program};
use crate::table::{OpId, Replacement, SubstitutionTable};
use crate::ty::{display_signature, Type};

/// Counters describing one rewrite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RewriteStats {
    /// Specialized program items.
    pub functions: usize,
    /// Call sites and float arithmetic sites inspected.
    pub call_sites: usize,
    /// Sites retargeted to a table replacement.
    pub substituted: usize,
    /// Passthrough intrinsic calls left untouched.
    pub passthrough: usize,
    /// Calls that descended into a program item.
    pub descended: usize,
    /// Calls back into an item on the visitation stack.
    pub recursive: usize,
    /// Descended calls kept out of line by a `Never` site or `no_inline` callee.
    pub no_inline: usize,
    /// Spliced call sites.
    pub inlined: usize,
    /// Contracted operations evaluated at rewrite time.
    pub folded: usize,
    /// Multiply-add chains fused.
    pub fused: usize,
}

/// What happened at a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Substituted(&'static str),
    Passthrough,
    Descended { callee: DefId, inline: InlineDirective },
    Recursive { callee: DefId },
    Unmatched,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Substituted(symbol) => write!(f, "substituted by {}", symbol),
            Disposition::Passthrough => write!(f, "passthrough"),
            Disposition::Descended { callee, inline } => write!(f, "descended into {} ({:?})", callee, inline),
            Disposition::Recursive { callee } => write!(f, "recursive call to {}", callee),
            Disposition::Unmatched => write!(f, "unmatched"),
        }
    }
}

/// One inspected site. Records only live while their body is rewritten.
#[derive(Debug, Clone)]
pub struct CallSiteRecord {
    /// Output id of the calling instance.
    pub caller: DefId,
    pub location: Location,
    /// Callee name.
    pub callee: String,
    pub arg_types: Vec<Type>,
    pub disposition: Disposition,
}

impl RewriteStats {
    fn record(&mut self, site: &CallSiteRecord) {
        self.call_sites += 1;
        match site.disposition {
            Disposition::Substituted(_) => self.substituted += 1,
            Disposition::Passthrough => self.passthrough += 1,
            Disposition::Descended { inline, .. } => {
                self.descended += 1;
                if inline != InlineDirective::Always {
                    self.no_inline += 1;
                }
            }
            Disposition::Recursive { .. } => {
                self.descended += 1;
                self.recursive += 1;
            }
            Disposition::Unmatched => {}
        }
    }
}

/// The rewritten form of a kernel for one argument-type signature.
#[derive(Debug)]
pub struct Specialization {
    /// Specialized items, plus the source items when the debug fallback is on.
    pub program: Program,
    /// Entry item in `program`.
    pub entry: DefId,
    pub signature: Vec<Type>,
    pub stats: RewriteStats,
}

impl Specialization {
    pub fn entry_body(&self) -> Option<&MirBody> {
        self.program.get(self.entry).and_then(FnItem::body)
    }
}

/// One rewrite of one kernel. Consumed by [`RewritePass::run`].
pub struct RewritePass<'a> {
    source: &'a Program,
    table: &'a SubstitutionTable,
    config: &'a RewriteConfig,
    output: Program,
    next_id: u32,
    /// `(source item, argument types)` to output instance.
    instances: HashMap<(DefId, Vec<Type>), DefId>,
    return_types: HashMap<DefId, Type>,
    on_stack: HashSet<DefId>,
    /// Output instances in completion order, callees before callers.
    post_order: Vec<DefId>,
    rewritten: Vec<DefId>,
    fused_items: HashMap<FusedOp, DefId>,
    stats: RewriteStats,
}

impl<'a> RewritePass<'a> {
    pub fn new(source: &'a Program, table: &'a SubstitutionTable, config: &'a RewriteConfig) -> Self {
        let next_id = if config.debug_fallback { source.next_def_id().0 } else { 0 };
        Self {
            source,
            table,
            config,
            output: Program::new(),
            next_id,
            instances: HashMap::new(),
            return_types: HashMap::new(),
            on_stack: HashSet::new(),
            post_order: Vec::new(),
            rewritten: Vec::new(),
            fused_items: HashMap::new(),
            stats: RewriteStats::default(),
        }
    }

    /// Specialize `entry` for `arg_types`.
    pub fn run(mut self, entry: DefId, arg_types: &[Type]) -> Result<Specialization, RewriteError> {
        let name = self.source.get(entry).ok_or(RewriteError::UnknownItem(entry))?.name.clone();
        debug!(kernel = %name, signature = %display_signature(arg_types), entries = self.table.len(), "specializing");

        let out_entry = self.visit_instance(entry, arg_types)?;

        self.stats.inlined = inline::inline_program(&mut self.output, &self.post_order);
        for &def in &self.rewritten {
            if let Some(body) = self.output.body_mut(def) {
                self.stats.folded += fold::fold_constants(body);
                if self.config.contraction {
                    self.stats.fused += fold::contract(body);
                }
            }
        }

        for &def in &self.rewritten {
            if let Some(item) = self.output.get(def) {
                let errors = item.body().map(|b| validate_body(b, Phase::Specialized)).unwrap_or_default();
                if !errors.is_empty() {
                    return Err(RewriteError::Malformed { name: item.name.clone(), errors });
                }
            }
        }

        if self.config.debug_fallback {
            self.install_fallback(entry, out_entry);
        }

        debug!(kernel = %name, stats = ?self.stats, "specialized");
        if let Some(body) = self.output.get(out_entry).and_then(FnItem::body) {
            trace!(kernel = %name, "rewritten entry:\n{}", body);
        }
        Ok(Specialization {
            program: self.output,
            entry: out_entry,
            signature: arg_types.to_vec(),
            stats: self.stats,
        })
    }

    fn alloc_id(&mut self) -> DefId {
        let id = DefId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// The output instance of `def` for `arg_types`, rewriting it first if
    /// needed. An instance that is still on the stack is returned as is.
    fn visit_instance(&mut self, def: DefId, arg_types: &[Type]) -> Result<DefId, RewriteError> {
        let key = (def, arg_types.to_vec());
        if let Some(&out) = self.instances.get(&key) {
            return Ok(out);
        }

        let item = self.source.get(def).ok_or(RewriteError::UnknownItem(def))?;
        if self.on_stack.len() >= self.config.max_instance_depth {
            return Err(RewriteError::InstanceDepth { name: item.name.clone(), limit: self.config.max_instance_depth });
        }
        let body = self.source.extract_body(def)?;
        let body = mono::monomorphize(body, arg_types, &item.name)?;
        let (name, attrs) = (item.name.clone(), item.attrs);

        let out = self.alloc_id();
        self.instances.insert(key, out);
        self.return_types.insert(out, body.return_type().clone());
        self.on_stack.insert(out);
        trace!(item = %name, %out, signature = %display_signature(arg_types), "descending");

        let body = self.rewrite_body(out, &name, body)?;

        self.on_stack.remove(&out);
        self.output.insert(FnItem {
            def_id: out,
            name: format!("{}{}", name, display_signature(arg_types)),
            attrs,
            kind: ItemKind::Mir(body),
        });
        self.post_order.push(out);
        self.rewritten.push(out);
        self.stats.functions += 1;
        Ok(out)
    }

    fn rewrite_body(&mut self, caller: DefId, caller_name: &str, mut body: MirBody) -> Result<MirBody, RewriteError> {
        let mut sites = Vec::new();
        for bb in body.block_ids().collect::<Vec<_>>() {
            for idx in 0..body.basic_blocks[bb.index()].statements.len() {
                if let Some(site) = self.rewrite_arith(caller, &mut body, bb, idx) {
                    sites.push(site);
                }
            }
            if let Some(site) = self.rewrite_call(caller, caller_name, &mut body, bb)? {
                sites.push(site);
            }
        }
        for site in &sites {
            trace!(
                caller = %site.caller,
                location = ?site.location,
                callee = %site.callee,
                args = %display_signature(&site.arg_types),
                disposition = %site.disposition,
                "call site"
            );
            self.stats.record(site);
        }
        Ok(body)
    }

    /// A float `+ - *` statement.
    fn rewrite_arith(
        &mut self,
        caller: DefId,
        body: &mut MirBody,
        bb: BasicBlockId,
        idx: usize,
    ) -> Option<CallSiteRecord> {
        let (arith, arg_types) = {
            let StatementKind::Assign(_, Rvalue::BinaryOp { op, mode: FloatMode::Strict, left, right }) =
                &body.basic_blocks[bb.index()].statements[idx].kind
            else {
                return None;
            };
            let arith = ArithOp::from_binop(*op)?;
            let types = [operand_ty(body, left)?, operand_ty(body, right)?];
            if !types.iter().any(Type::is_float) {
                return None;
            }
            (arith, types.to_vec())
        };

        let disposition = match self.table.lookup(OpId::Arith(arith), &arg_types) {
            Some(Replacement::Fused(fused)) => {
                let fused = *fused;
                if let StatementKind::Assign(_, rvalue) = &mut body.basic_blocks[bb.index()].statements[idx].kind {
                    if let Rvalue::BinaryOp { left, right, .. } = rvalue {
                        let (left, right) = (left.clone(), right.clone());
                        *rvalue = fused.emit(left, right);
                    }
                }
                Disposition::Substituted(fused.symbol())
            }
            _ => Disposition::Unmatched,
        };

        Some(CallSiteRecord {
            caller,
            location: Location::statement(bb, idx),
            callee: format!("({})", arith.symbol()),
            arg_types,
            disposition,
        })
    }

    /// The call terminating `bb`, if any. A call whose arguments cannot be
    /// typed is an error when the callee is known, since it could not be
    /// consulted, descended into or retargeted.
    fn rewrite_call(
        &mut self,
        caller: DefId,
        caller_name: &str,
        body: &mut MirBody,
        bb: BasicBlockId,
    ) -> Result<Option<CallSiteRecord>, RewriteError> {
        let (callee, args, dest_ty, directive) = {
            let Some(Terminator { kind: TerminatorKind::Call { func, args, destination, inline, .. }, .. }) =
                &body.basic_blocks[bb.index()].terminator
            else {
                return Ok(None);
            };
            let Some(callee) = func.as_constant().map(|c| c.kind.clone()) else {
                return Ok(None);
            };
            let Some(arg_types) = args.iter().map(|a| operand_ty(body, a)).collect::<Option<Vec<_>>>() else {
                return match self.callee_name(&callee) {
                    Some(callee) => Err(RewriteError::UntypedCall { caller: caller_name.to_string(), callee }),
                    None => Ok(None),
                };
            };
            (callee, arg_types, body.place_ty(destination).cloned(), *inline)
        };
        let location = Location::terminator(bb);

        let (name, disposition) = match callee {
            ConstantKind::Intrinsic(intrinsic) if intrinsic.is_passthrough() => {
                (intrinsic.name().to_string(), Disposition::Passthrough)
            }
            ConstantKind::Intrinsic(intrinsic) => {
                let name = intrinsic.name().to_string();
                let Some(op) = intrinsic.op_id() else {
                    return Ok(Some(self.site(caller, location, name, args, Disposition::Unmatched)));
                };
                if args.len() != intrinsic.arity() {
                    return Err(RewriteError::Arity { name, expected: intrinsic.arity(), found: args.len() });
                }
                let disposition = match self.table.lookup(op, &args).copied() {
                    Some(Replacement::Routine(routine)) => {
                        set_callee(body, bb, Operand::routine(routine));
                        Disposition::Substituted(routine.name)
                    }
                    Some(Replacement::Fused(fused)) => {
                        self.substitute_fused(body, bb, fused);
                        Disposition::Substituted(fused.symbol())
                    }
                    None => Disposition::Unmatched,
                };
                (name, disposition)
            }
            ConstantKind::FnDef(def) => {
                let item = self.source.get(def).ok_or(RewriteError::UnknownItem(def))?;
                let (name, no_inline) = (item.name.clone(), item.attrs.no_inline);
                let out = self.visit_instance(def, &args)?;

                if let (Some(ret), Some(dest)) = (self.return_types.get(&out), &dest_ty) {
                    if ret != dest {
                        return Err(RewriteError::TypeMismatch { name, expected: dest.clone(), found: ret.clone() });
                    }
                }

                let disposition = if self.on_stack.contains(&out) {
                    Disposition::Recursive { callee: out }
                } else {
                    let inline = match directive {
                        InlineDirective::Never => InlineDirective::Never,
                        _ if no_inline => InlineDirective::Default,
                        _ => InlineDirective::Always,
                    };
                    Disposition::Descended { callee: out, inline }
                };
                retarget(body, bb, out, &disposition);
                (name, disposition)
            }
            ConstantKind::Routine(routine) => (routine.name.to_string(), Disposition::Unmatched),
            _ => return Ok(None),
        };

        Ok(Some(self.site(caller, location, name, args, disposition)))
    }

    fn callee_name(&self, callee: &ConstantKind) -> Option<String> {
        match callee {
            ConstantKind::FnDef(def) => {
                Some(self.source.get(*def).map_or_else(|| def.to_string(), |item| item.name.clone()))
            }
            ConstantKind::Intrinsic(intrinsic) => Some(intrinsic.name().to_string()),
            ConstantKind::Routine(routine) => Some(routine.name.to_string()),
            _ => None,
        }
    }

    fn site(
        &self,
        caller: DefId,
        location: Location,
        callee: String,
        arg_types: Vec<Type>,
        disposition: Disposition,
    ) -> CallSiteRecord {
        CallSiteRecord { caller, location, callee, arg_types, disposition }
    }

    /// Replace a call with the contracted instruction, or with a call to the
    /// stand-alone instruction body where the call must stay a call.
    fn substitute_fused(&mut self, body: &mut MirBody, bb: BasicBlockId, fused: FusedOp) {
        let block = &mut body.basic_blocks[bb.index()];
        let Some(term) = block.terminator.take() else {
            return;
        };
        match term.kind {
            TerminatorKind::Call { args, destination, target: Some(target), inline, .. }
                if inline != InlineDirective::Never && args.len() == 2 =>
            {
                let mut args = args.into_iter();
                if let (Some(left), Some(right)) = (args.next(), args.next()) {
                    block
                        .statements
                        .push(Statement::new(StatementKind::Assign(destination, fused.emit(left, right)), term.span));
                }
                block.terminator = Some(Terminator::new(TerminatorKind::Goto { target }, term.span));
            }
            mut kind => {
                let item = self.fused_item(fused);
                if let TerminatorKind::Call { func, .. } = &mut kind {
                    *func = Operand::item(item);
                }
                block.terminator = Some(Terminator::new(kind, term.span));
            }
        }
    }

    fn fused_item(&mut self, fused: FusedOp) -> DefId {
        if let Some(&id) = self.fused_items.get(&fused) {
            return id;
        }
        let id = self.alloc_id();
        self.output.insert(FnItem {
            def_id: id,
            name: fused.symbol().to_string(),
            attrs: FnAttrs::default(),
            kind: ItemKind::Mir(fused.body()),
        });
        self.fused_items.insert(fused, id);
        self.rewritten.push(id);
        id
    }

    /// Copy the source items into the output and guard the entry with a
    /// never-taken branch to the unrewritten original.
    fn install_fallback(&mut self, source_entry: DefId, out_entry: DefId) {
        for item in self.source.items() {
            self.output.insert(item.clone());
        }
        let Some(body) = self.output.body_mut(out_entry) else {
            return;
        };

        let span = body.span;
        let moved = body.new_block();
        let fallback = body.new_block();
        let ret = body.new_block();

        let entry = std::mem::take(&mut body.basic_blocks[BasicBlockId::ENTRY.index()]);
        body.basic_blocks[moved.index()] = entry;
        for block in &mut body.basic_blocks {
            if let Some(term) = &mut block.terminator {
                term.kind.map_successors(|b| if b == BasicBlockId::ENTRY { moved } else { b });
            }
        }

        let args = body.param_ids().map(Operand::copy).collect();
        body.basic_blocks[fallback.index()] = BasicBlockData {
            statements: vec![],
            terminator: Some(Terminator::new(
                TerminatorKind::Call {
                    func: Operand::item(source_entry),
                    args,
                    destination: LocalId::RETURN.into(),
                    target: Some(ret),
                    inline: InlineDirective::Never,
                },
                span,
            )),
        };
        body.set_terminator(ret, Terminator::new(TerminatorKind::Return, span));
        body.set_terminator(
            BasicBlockId::ENTRY,
            Terminator::new(
                TerminatorKind::SwitchInt {
                    discr: Operand::constant(Constant::bool(false)),
                    targets: SwitchTargets::if_true(fallback, moved),
                },
                span,
            ),
        );
    }
}

fn operand_ty(body: &MirBody, operand: &Operand) -> Option<Type> {
    match operand {
        Operand::Copy(place) | Operand::Move(place) => body.place_ty(place).cloned(),
        Operand::Constant(c) => Some(c.ty.clone()),
    }
}

fn set_callee(body: &mut MirBody, bb: BasicBlockId, callee: Operand) {
    if let Some(Terminator { kind: TerminatorKind::Call { func, .. }, .. }) =
        &mut body.basic_blocks[bb.index()].terminator
    {
        *func = callee;
    }
}

fn retarget(body: &mut MirBody, bb: BasicBlockId, callee: DefId, disposition: &Disposition) {
    if let Some(Terminator { kind: TerminatorKind::Call { func, inline, .. }, .. }) =
        &mut body.basic_blocks[bb.index()].terminator
    {
        *func = Operand::item(callee);
        match disposition {
            Disposition::Descended { inline: directive, .. } => *inline = *directive,
            Disposition::Recursive { .. } if *inline == InlineDirective::Always => *inline = InlineDirective::Default,
            _ => {}
        }
    }
}
