//! Textual rendering of MIR bodies, for inspection and trace logs.
//!
//! ```text
//! fn(_1: f32, _2: f32) -> f32 {
//!     bb0: {
//!         _0 = Add[contract](_1, _2);
//!         return;
//!     }
//! }
//! ```

use std::fmt;

use super::body::{LocalKind, MirBody};
use super::types::{
    AggregateKind, Constant, ConstantKind, FloatMode, InlineDirective, Operand, Rvalue, StatementKind,
    TerminatorKind, UnOp,
};

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConstantKind::Int(v) => write!(f, "const {}{}", v, self.ty),
            ConstantKind::Float(v) => write!(f, "const {:?}{}", v, self.ty),
            ConstantKind::Bool(v) => write!(f, "const {}", v),
            ConstantKind::Unit => write!(f, "const ()"),
            ConstantKind::FnDef(def) => write!(f, "{}", def),
            ConstantKind::Intrinsic(intr) => write!(f, "{}", intr.name()),
            ConstantKind::Routine(routine) => write!(f, "{}", routine.name),
            ConstantKind::Type(ty) => write!(f, "const {}", ty),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Copy(place) => write!(f, "{}", place),
            Operand::Move(place) => write!(f, "move {}", place),
            Operand::Constant(c) => write!(f, "{}", c),
        }
    }
}

fn comma_separated<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Rvalue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rvalue::Use(op) => write!(f, "{}", op),
            Rvalue::BinaryOp { op, mode, left, right } => {
                write!(f, "{:?}", op)?;
                if *mode == FloatMode::Contract {
                    write!(f, "[contract]")?;
                }
                write!(f, "({}, {})", left, right)
            }
            Rvalue::UnaryOp { op: UnOp::Neg, operand } => write!(f, "Neg({})", operand),
            Rvalue::UnaryOp { op: UnOp::Not, operand } => write!(f, "Not({})", operand),
            Rvalue::Cast { operand, target_ty } => write!(f, "{} as {}", operand, target_ty),
            Rvalue::Aggregate { kind, operands } => {
                if let AggregateKind::Struct(def) = kind {
                    write!(f, "{}", def.name)?;
                }
                write!(f, "(")?;
                comma_separated(f, operands)?;
                write!(f, ")")
            }
            Rvalue::FusedMulAdd { a, b, c } => write!(f, "fma({}, {}, {})", a, b, c),
        }
    }
}

impl fmt::Display for MirBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn(")?;
        for (i, local) in self.locals.iter().skip(1).take(self.param_count).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", local.id, local.ty)?;
        }
        writeln!(f, ") -> {} {{", self.return_type())?;

        for local in &self.locals {
            if matches!(local.kind, LocalKind::Var | LocalKind::Temp) {
                write!(f, "    let {}: {};", local.id, local.ty)?;
                match &local.name {
                    Some(name) => writeln!(f, " // {}", name)?,
                    None => writeln!(f)?,
                }
            }
        }

        for (bb, block) in self.blocks() {
            writeln!(f, "    {}: {{", bb)?;
            for stmt in &block.statements {
                match &stmt.kind {
                    StatementKind::Assign(place, rvalue) => writeln!(f, "        {} = {};", place, rvalue)?,
                    StatementKind::StorageLive(local) => writeln!(f, "        StorageLive({});", local)?,
                    StatementKind::StorageDead(local) => writeln!(f, "        StorageDead({});", local)?,
                    StatementKind::Nop => writeln!(f, "        nop;")?,
                }
            }
            match block.terminator.as_ref().map(|t| &t.kind) {
                None => writeln!(f, "        <unterminated>")?,
                Some(TerminatorKind::Goto { target }) => writeln!(f, "        goto -> {};", target)?,
                Some(TerminatorKind::SwitchInt { discr, targets }) => {
                    write!(f, "        switchInt({}) -> [", discr)?;
                    for (value, target) in &targets.branches {
                        write!(f, "{}: {}, ", value, target)?;
                    }
                    writeln!(f, "otherwise: {}];", targets.otherwise)?;
                }
                Some(TerminatorKind::Return) => writeln!(f, "        return;")?,
                Some(TerminatorKind::Unreachable) => writeln!(f, "        unreachable;")?,
                Some(TerminatorKind::Call { func, args, destination, target, inline }) => {
                    write!(f, "        {} = {}(", destination, func)?;
                    comma_separated(f, args)?;
                    write!(f, ")")?;
                    if let Some(target) = target {
                        write!(f, " -> {}", target)?;
                    }
                    match inline {
                        InlineDirective::Default => {}
                        InlineDirective::Always => write!(f, " [inline(always)]")?,
                        InlineDirective::Never => write!(f, " [inline(never)]")?,
                    }
                    writeln!(f, ";")?;
                }
            }
            writeln!(f, "    }}")?;
        }
        write!(f, "}}")
    }
}
