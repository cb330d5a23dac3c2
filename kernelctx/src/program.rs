//! # Programs and Kernels
//!
//! A [`Program`] is a set of items addressed by [`DefId`]. An item either
//! has a MIR body the rewriter can extract, or it is opaque (a host function
//! with no inspectable body) or merely declared. A [`Kernel`] names the entry
//! item of a shared program.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::RewriteConfig;
use crate::error::{ExecError, ExtractionFailure, RewriteError};
use crate::interp::Interpreter;
use crate::mir::{DefId, MirBody};
use crate::value::Value;

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a program, used as part of cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgramId(u64);

impl ProgramId {
    fn fresh() -> Self {
        ProgramId(NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program#{}", self.0)
    }
}

/// Attributes attached to an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FnAttrs {
    /// Calls to this item are never inlined.
    pub no_inline: bool,
}

impl FnAttrs {
    pub fn no_inline() -> Self {
        Self { no_inline: true }
    }
}

/// What an item consists of.
#[derive(Debug, Clone)]
pub enum ItemKind {
    Mir(MirBody),
    /// A host function whose body cannot be inspected.
    Opaque { reason: String },
    /// Declared but not (yet) defined.
    Undefined,
}

/// A function item.
#[derive(Debug, Clone)]
pub struct FnItem {
    pub def_id: DefId,
    pub name: String,
    pub attrs: FnAttrs,
    pub kind: ItemKind,
}

impl FnItem {
    pub fn body(&self) -> Option<&MirBody> {
        match &self.kind {
            ItemKind::Mir(body) => Some(body),
            _ => None,
        }
    }
}

/// A collection of function items.
#[derive(Debug)]
pub struct Program {
    id: ProgramId,
    items: BTreeMap<DefId, FnItem>,
    by_name: HashMap<String, DefId>,
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    pub fn new() -> Self {
        Self {
            id: ProgramId::fresh(),
            items: BTreeMap::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// The id the next new item receives.
    pub fn next_def_id(&self) -> DefId {
        self.items.keys().next_back().map_or(DefId::new(0), |d| DefId::new(d.0 + 1))
    }

    /// Declare an item without a body, so that mutually recursive items
    /// can refer to each other. Declaring a known name returns its id.
    pub fn declare(&mut self, name: &str) -> DefId {
        if let Some(&def_id) = self.by_name.get(name) {
            return def_id;
        }
        let def_id = self.next_def_id();
        self.insert(FnItem {
            def_id,
            name: name.to_string(),
            attrs: FnAttrs::default(),
            kind: ItemKind::Undefined,
        });
        def_id
    }

    /// Give a declared item its body.
    pub fn define(&mut self, def_id: DefId, body: MirBody, attrs: FnAttrs) -> Result<(), RewriteError> {
        let item = self.items.get_mut(&def_id).ok_or(RewriteError::UnknownItem(def_id))?;
        item.kind = ItemKind::Mir(body);
        item.attrs = attrs;
        Ok(())
    }

    /// Add an item with a body.
    pub fn add(&mut self, name: &str, body: MirBody) -> DefId {
        self.add_with_attrs(name, body, FnAttrs::default())
    }

    pub fn add_with_attrs(&mut self, name: &str, body: MirBody, attrs: FnAttrs) -> DefId {
        let def_id = self.declare(name);
        if let Some(item) = self.items.get_mut(&def_id) {
            item.kind = ItemKind::Mir(body);
            item.attrs = attrs;
        }
        def_id
    }

    /// Add a host function with no inspectable body.
    pub fn add_opaque(&mut self, name: &str, reason: &str) -> DefId {
        let def_id = self.declare(name);
        if let Some(item) = self.items.get_mut(&def_id) {
            item.kind = ItemKind::Opaque { reason: reason.to_string() };
        }
        def_id
    }

    /// Insert an item under its own id, replacing any previous item.
    pub(crate) fn insert(&mut self, item: FnItem) {
        self.by_name.insert(item.name.clone(), item.def_id);
        self.items.insert(item.def_id, item);
    }

    pub fn get(&self, def_id: DefId) -> Option<&FnItem> {
        self.items.get(&def_id)
    }

    pub(crate) fn body_mut(&mut self, def_id: DefId) -> Option<&mut MirBody> {
        match &mut self.items.get_mut(&def_id)?.kind {
            ItemKind::Mir(body) => Some(body),
            _ => None,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<DefId> {
        self.by_name.get(name).copied()
    }

    /// Items in id order.
    pub fn items(&self) -> impl Iterator<Item = &FnItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The body of an item, or why there is none.
    pub fn extract_body(&self, def_id: DefId) -> Result<&MirBody, RewriteError> {
        let item = self.get(def_id).ok_or(RewriteError::UnknownItem(def_id))?;
        let reason = match &item.kind {
            ItemKind::Mir(body) => return Ok(body),
            ItemKind::Opaque { reason } => ExtractionFailure::Opaque(reason.clone()),
            ItemKind::Undefined => ExtractionFailure::Undefined,
        };
        Err(RewriteError::Extraction { def_id, name: item.name.clone(), reason })
    }

    /// Handle on the item called `name`.
    pub fn kernel(self: &Arc<Self>, name: &str) -> Option<Kernel> {
        self.lookup(name).map(|def| Kernel { program: Arc::clone(self), def })
    }
}

/// The entry point of a kernel: a shared program and one of its items.
#[derive(Debug, Clone)]
pub struct Kernel {
    program: Arc<Program>,
    def: DefId,
}

impl Kernel {
    pub fn new(program: Arc<Program>, def: DefId) -> Self {
        Self { program, def }
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn def_id(&self) -> DefId {
        self.def
    }

    pub fn name(&self) -> &str {
        self.program.get(self.def).map_or("<unknown>", |item| item.name.as_str())
    }

    /// Run the kernel as written, without any substitution.
    pub fn call_original(&self, args: &[Value]) -> Result<Value, ExecError> {
        let config = RewriteConfig::default();
        Interpreter::new(&self.program, config.max_call_depth).run(self.def, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{BodyBuilder, LocalId, Operand, Rvalue};
    use crate::ty::Type;

    fn identity(ty: Type) -> MirBody {
        let mut b = BodyBuilder::new(vec![ty.clone()], ty);
        let x = b.param(0);
        b.assign(LocalId::RETURN, Rvalue::Use(Operand::copy(x)));
        b.ret();
        b.finish()
    }

    #[test]
    fn test_program_ids_are_unique() {
        assert_ne!(Program::new().id(), Program::new().id());
    }

    #[test]
    fn test_declare_then_define() {
        let mut program = Program::new();
        let f = program.declare("f");
        assert_eq!(program.declare("f"), f);
        assert!(matches!(
            program.extract_body(f),
            Err(RewriteError::Extraction { reason: ExtractionFailure::Undefined, .. })
        ));

        program.define(f, identity(Type::I32), FnAttrs::no_inline()).unwrap();
        assert!(program.extract_body(f).is_ok());
        assert!(program.get(f).unwrap().attrs.no_inline);
        assert!(program.define(DefId::new(42), identity(Type::I32), FnAttrs::default()).is_err());
    }

    #[test]
    fn test_opaque_items_cannot_be_extracted() {
        let mut program = Program::new();
        let host = program.add_opaque("host_rng", "foreign function");
        let err = program.extract_body(host).unwrap_err();
        assert_eq!(err.to_string(), "cannot extract a body for `host_rng`: item is an opaque host function: foreign function");
    }

    #[test]
    fn test_ids_are_dense() {
        let mut program = Program::new();
        let a = program.add("a", identity(Type::F32));
        let b = program.add("b", identity(Type::F64));
        assert_eq!((a, b), (DefId::new(0), DefId::new(1)));
        assert_eq!(program.next_def_id(), DefId::new(2));
        assert_eq!(program.lookup("b"), Some(b));
    }

    #[test]
    fn test_kernel_runs_original() {
        let mut program = Program::new();
        program.add("id", identity(Type::F64));
        let program = Arc::new(program);
        let kernel = program.kernel("id").unwrap();
        assert_eq!(kernel.name(), "id");
        assert_eq!(kernel.call_original(&[Value::F64(2.5)]).unwrap(), Value::F64(2.5));
        assert!(program.kernel("missing").is_none());
    }
}
