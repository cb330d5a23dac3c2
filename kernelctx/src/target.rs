//! Capability tags.
//!
//! A tag is a zero-sized type naming an execution target. Its only job is to
//! pick the substitution table when a kernel is contextualized; the rewriter
//! itself only ever sees the table.

use std::fmt::Debug;
use std::sync::OnceLock;

use crate::table::SubstitutionTable;

/// An execution target.
pub trait Target: Copy + Default + Send + Sync + Debug + 'static {
    /// Target name, part of specialization cache keys.
    const NAME: &'static str;

    /// The substitution table of this target, built on first use.
    fn substitution_table() -> &'static SubstitutionTable;
}

/// The host. Nothing is substituted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Cpu;

impl Target for Cpu {
    const NAME: &'static str = "cpu";

    fn substitution_table() -> &'static SubstitutionTable {
        static TABLE: OnceLock<SubstitutionTable> = OnceLock::new();
        TABLE.get_or_init(SubstitutionTable::empty)
    }
}

/// The accelerator: math calls go to the device library and float
/// arithmetic is contracted.
#[cfg(feature = "accel")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Accel;

#[cfg(feature = "accel")]
impl Target for Accel {
    const NAME: &'static str = "accel";

    fn substitution_table() -> &'static SubstitutionTable {
        static TABLE: OnceLock<SubstitutionTable> = OnceLock::new();
        TABLE.get_or_init(|| SubstitutionTable::build(Some(&crate::accel::ACCEL_MATH)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_table_is_empty() {
        assert!(Cpu::substitution_table().is_empty());
        assert!(std::ptr::eq(Cpu::substitution_table(), Cpu::substitution_table()));
    }

    #[cfg(feature = "accel")]
    #[test]
    fn test_accel_table_is_built_once() {
        let table = Accel::substitution_table();
        assert_eq!(table.library(), Some("accel-libm"));
        assert!(std::ptr::eq(table, Accel::substitution_table()));
        assert_ne!(Cpu::NAME, Accel::NAME);
    }
}
