//! Fixed answers to the capability questions an engine asks a scripted table.

use std::fmt;
use std::ops::BitOr;

/// How rows fetched from a scripted table are re-identified for row-level
/// locking. Scripted tables have no row identity, so the whole row is copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowMarkType {
    Exclusive,
    NoKeyExclusive,
    Share,
    KeyShare,
    Reference,
    Copy,
}

/// A set of write operations, using the engine's command bit positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpdatableOperations(u32);

impl UpdatableOperations {
    pub const NONE: Self = Self(0);
    pub const UPDATE: Self = Self(1 << 2);
    pub const INSERT: Self = Self(1 << 3);
    pub const DELETE: Self = Self(1 << 4);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for UpdatableOperations {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for UpdatableOperations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::INSERT, "INSERT"),
            (Self::UPDATE, "UPDATE"),
            (Self::DELETE, "DELETE"),
        ]
        .iter()
        .filter(|(op, _)| self.contains(*op))
        .map(|(_, name)| *name)
        .collect::<Vec<_>>();
        write!(f, "{}", names.join(", "))
    }
}

pub fn row_mark_type() -> RowMarkType {
    RowMarkType::Copy
}

pub fn supports_join_pushdown() -> bool {
    false
}

pub fn supports_analyze() -> bool {
    false
}

/// Scripted tables are declared by hand, so importing a remote schema yields
/// no statements.
pub fn import_foreign_schema(_remote_schema: &str) -> Vec<String> {
    Vec::new()
}

/// The write operations a scripted table accepts. Scripts are not consulted.
pub fn updatable_operations() -> UpdatableOperations {
    UpdatableOperations::UPDATE | UpdatableOperations::INSERT | UpdatableOperations::DELETE
}
