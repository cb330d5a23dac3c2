//! # Core MIR Types
//!
//! The fundamental types of the kernel IR.
//!
//! ## Type Hierarchy
//!
//! ```text
//! MirBody
//! └── BasicBlockData
//!     ├── Vec<Statement>
//!     │   └── StatementKind
//!     │       ├── Assign(Place, Rvalue)
//!     │       ├── StorageLive(Local)
//!     │       └── StorageDead(Local)
//!     └── Terminator
//!         └── TerminatorKind
//!             ├── Goto { target }
//!             ├── SwitchInt { discr, targets }
//!             ├── Return
//!             └── Call { func, args, destination, target, inline }
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::device::Routine;
use crate::intrinsics::Intrinsic;
use crate::span::Span;
use crate::ty::{StructDef, Type};

// ============================================================================
// Identifiers
// ============================================================================

/// Identifies an item within a [`Program`](crate::program::Program).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefId(pub u32);

impl DefId {
    pub const fn new(index: u32) -> Self {
        DefId(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for DefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DefId({})", self.0)
    }
}

impl fmt::Display for DefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def{}", self.0)
    }
}

/// A local variable slot within a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(pub u32);

impl LocalId {
    /// The return place.
    pub const RETURN: LocalId = LocalId(0);

    pub const fn new(index: u32) -> Self {
        LocalId(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_{}", self.0)
    }
}

/// A unique identifier for a basic block within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BasicBlockId(pub u32);

impl BasicBlockId {
    /// The entry block ID (always 0).
    pub const ENTRY: BasicBlockId = BasicBlockId(0);

    pub const fn new(id: u32) -> Self {
        BasicBlockId(id)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BasicBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

// ============================================================================
// Basic Blocks
// ============================================================================

/// A basic block: a sequence of statements followed by a single terminator.
#[derive(Debug, Clone, Default)]
pub struct BasicBlockData {
    /// Statements executed sequentially.
    pub statements: Vec<Statement>,
    /// The terminator that ends this block.
    pub terminator: Option<Terminator>,
}

impl BasicBlockData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }

    pub fn successors(&self) -> Vec<BasicBlockId> {
        match &self.terminator {
            Some(term) => term.kind.successors(),
            None => vec![],
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

/// A statement in a basic block.
#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

impl Statement {
    pub fn new(kind: StatementKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Shorthand for an assignment with a synthesized span.
    pub fn assign(place: Place, rvalue: Rvalue) -> Self {
        Self::new(StatementKind::Assign(place, rvalue), Span::dummy())
    }
}

/// The kind of a statement.
#[derive(Debug, Clone)]
pub enum StatementKind {
    /// `place = rvalue`
    Assign(Place, Rvalue),
    /// Mark storage as live.
    StorageLive(LocalId),
    /// Mark storage as dead.
    StorageDead(LocalId),
    /// Placeholder for removed statements.
    Nop,
}

// ============================================================================
// Terminators
// ============================================================================

/// How a call site should be treated by the inliner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InlineDirective {
    /// No preference. Left alone by the inliner.
    #[default]
    Default,
    /// Splice the callee into the caller.
    Always,
    /// Never inline. The rewriter must not override this.
    Never,
}

/// A terminator ends a basic block.
#[derive(Debug, Clone)]
pub struct Terminator {
    pub kind: TerminatorKind,
    pub span: Span,
}

impl Terminator {
    pub fn new(kind: TerminatorKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn successors(&self) -> Vec<BasicBlockId> {
        self.kind.successors()
    }
}

/// The kind of a terminator.
#[derive(Debug, Clone)]
pub enum TerminatorKind {
    /// Unconditional jump.
    Goto { target: BasicBlockId },

    /// Multi-way branch on an integer or boolean discriminant.
    SwitchInt {
        discr: Operand,
        targets: SwitchTargets,
    },

    /// Return from the function.
    Return,

    /// Unreachable code.
    Unreachable,

    /// Function call.
    Call {
        /// The callee, always a function constant in well-formed bodies.
        func: Operand,
        args: Vec<Operand>,
        destination: Place,
        /// Continuation block. `None` for diverging calls.
        target: Option<BasicBlockId>,
        inline: InlineDirective,
    },
}

impl TerminatorKind {
    pub fn successors(&self) -> Vec<BasicBlockId> {
        match self {
            TerminatorKind::Goto { target } => vec![*target],
            TerminatorKind::SwitchInt { targets, .. } => targets.all_targets(),
            TerminatorKind::Return | TerminatorKind::Unreachable => vec![],
            TerminatorKind::Call { target, .. } => target.iter().copied().collect(),
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, TerminatorKind::Return)
    }

    /// Rewrite every successor edge through `f`.
    pub fn map_successors(&mut self, mut f: impl FnMut(BasicBlockId) -> BasicBlockId) {
        match self {
            TerminatorKind::Goto { target } => *target = f(*target),
            TerminatorKind::SwitchInt { targets, .. } => {
                for (_, t) in &mut targets.branches {
                    *t = f(*t);
                }
                targets.otherwise = f(targets.otherwise);
            }
            TerminatorKind::Return | TerminatorKind::Unreachable => {}
            TerminatorKind::Call { target, .. } => {
                if let Some(t) = target {
                    *t = f(*t);
                }
            }
        }
    }
}

/// Switch targets for a `SwitchInt` terminator.
#[derive(Debug, Clone)]
pub struct SwitchTargets {
    /// Value -> target block mappings.
    pub branches: Vec<(u128, BasicBlockId)>,
    /// Default block.
    pub otherwise: BasicBlockId,
}

impl SwitchTargets {
    pub fn new(branches: Vec<(u128, BasicBlockId)>, otherwise: BasicBlockId) -> Self {
        Self { branches, otherwise }
    }

    /// `if` on a boolean: `true` goes to `then`, anything else to `otherwise`.
    pub fn if_true(then: BasicBlockId, otherwise: BasicBlockId) -> Self {
        Self::new(vec![(1, then)], otherwise)
    }

    pub fn all_targets(&self) -> Vec<BasicBlockId> {
        let mut targets: Vec<_> = self.branches.iter().map(|(_, t)| *t).collect();
        targets.push(self.otherwise);
        targets
    }

    pub fn target_for_value(&self, value: u128) -> BasicBlockId {
        self.branches
            .iter()
            .find(|(v, _)| *v == value)
            .map_or(self.otherwise, |(_, t)| *t)
    }
}

// ============================================================================
// Places and Operands
// ============================================================================

/// A memory location: a local plus field projections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Place {
    pub local: LocalId,
    pub projection: Vec<PlaceElem>,
}

/// A projection element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceElem {
    /// Tuple or struct field.
    Field(u32),
}

impl Place {
    pub fn local(local: LocalId) -> Self {
        Self { local, projection: vec![] }
    }

    pub fn field(&self, index: u32) -> Self {
        let mut projection = self.projection.clone();
        projection.push(PlaceElem::Field(index));
        Self { local: self.local, projection }
    }

    pub fn is_local(&self) -> bool {
        self.projection.is_empty()
    }
}

impl From<LocalId> for Place {
    fn from(local: LocalId) -> Self {
        Place::local(local)
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.local)?;
        for elem in &self.projection {
            match elem {
                PlaceElem::Field(idx) => write!(f, ".{}", idx)?,
            }
        }
        Ok(())
    }
}

/// A read-only input to an operation.
#[derive(Debug, Clone)]
pub enum Operand {
    Copy(Place),
    Move(Place),
    Constant(Constant),
}

impl Operand {
    pub fn copy(place: impl Into<Place>) -> Self {
        Operand::Copy(place.into())
    }

    pub fn constant(c: Constant) -> Self {
        Operand::Constant(c)
    }

    pub fn place(&self) -> Option<&Place> {
        match self {
            Operand::Copy(p) | Operand::Move(p) => Some(p),
            Operand::Constant(_) => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Operand::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Function constant for calling a program item.
    pub fn item(def_id: DefId) -> Self {
        Operand::Constant(Constant::new(Type::Fn, ConstantKind::FnDef(def_id)))
    }

    /// Function constant for calling an intrinsic.
    pub fn intrinsic(intrinsic: Intrinsic) -> Self {
        Operand::Constant(Constant::new(Type::Fn, ConstantKind::Intrinsic(intrinsic)))
    }

    /// Function constant for calling a device routine.
    pub fn routine(routine: Routine) -> Self {
        Operand::Constant(Constant::new(Type::Fn, ConstantKind::Routine(routine)))
    }
}

// ============================================================================
// Rvalues
// ============================================================================

/// Floating-point evaluation mode of a binary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FloatMode {
    /// IEEE semantics with rounding after every operation.
    #[default]
    Strict,
    /// The operation may be contracted with neighbouring arithmetic and skip
    /// intermediate rounding.
    Contract,
}

/// The right-hand side of an assignment.
#[derive(Debug, Clone)]
pub enum Rvalue {
    Use(Operand),

    BinaryOp {
        op: BinOp,
        mode: FloatMode,
        left: Operand,
        right: Operand,
    },

    UnaryOp {
        op: UnOp,
        operand: Operand,
    },

    Cast {
        operand: Operand,
        target_ty: Type,
    },

    Aggregate {
        kind: AggregateKind,
        operands: Vec<Operand>,
    },

    /// `a * b + c` with a single rounding. Only produced by contraction.
    FusedMulAdd {
        a: Operand,
        b: Operand,
        c: Operand,
    },
}

impl Rvalue {
    /// A strict binary operation.
    pub fn binary(op: BinOp, left: Operand, right: Operand) -> Self {
        Rvalue::BinaryOp { op, mode: FloatMode::Strict, left, right }
    }

    /// Operands read by this rvalue, in evaluation order.
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Rvalue::Use(op) | Rvalue::UnaryOp { operand: op, .. } | Rvalue::Cast { operand: op, .. } => vec![op],
            Rvalue::BinaryOp { left, right, .. } => vec![left, right],
            Rvalue::Aggregate { operands, .. } => operands.iter().collect(),
            Rvalue::FusedMulAdd { a, b, c } => vec![a, b, c],
        }
    }
}

/// Binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add, Sub, Mul, Div, Rem,
    BitAnd, BitOr, BitXor,
    Eq, Ne, Lt, Le, Gt, Ge,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

/// Unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Not,
    Neg,
}

/// Kind of aggregate value being constructed.
#[derive(Debug, Clone)]
pub enum AggregateKind {
    Tuple,
    Struct(Arc<StructDef>),
}

// ============================================================================
// Constants
// ============================================================================

/// A constant value in MIR.
#[derive(Debug, Clone)]
pub struct Constant {
    /// Possibly generic until specialization.
    pub ty: Type,
    pub kind: ConstantKind,
}

impl Constant {
    pub fn new(ty: Type, kind: ConstantKind) -> Self {
        Self { ty, kind }
    }

    pub fn int(value: i128, ty: Type) -> Self {
        Self::new(ty, ConstantKind::Int(value))
    }

    pub fn float(value: f64, ty: Type) -> Self {
        Self::new(ty, ConstantKind::Float(value))
    }

    pub fn f32(value: f32) -> Self {
        Self::float(f64::from(value), Type::F32)
    }

    pub fn f64(value: f64) -> Self {
        Self::float(value, Type::F64)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(Type::Bool, ConstantKind::Bool(value))
    }

    pub fn unit() -> Self {
        Self::new(Type::Unit, ConstantKind::Unit)
    }

    /// A type used as a value.
    pub fn type_value(ty: Type) -> Self {
        Self::new(Type::Meta, ConstantKind::Type(ty))
    }
}

/// The kind of a constant.
#[derive(Debug, Clone)]
pub enum ConstantKind {
    Int(i128),
    /// Float payload; `f32` constants hold an exactly representable value.
    Float(f64),
    Bool(bool),
    Unit,
    /// Reference to a program item.
    FnDef(DefId),
    /// Reference to a built-in operation.
    Intrinsic(Intrinsic),
    /// Reference to a device library routine.
    Routine(Routine),
    /// A type value.
    Type(Type),
}
