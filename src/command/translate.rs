//! Driver error translation
//!
//! Maps driver result codes onto [`TranslatedKind`]s. The default table is
//! empty, so failures surface as plain `Driver` errors unless a caller opts in.

use std::collections::HashMap;

use crate::error::{DriverError, TranslatedKind};
use crate::util::NamedEnum;

/// `SQLITE_BUSY`
pub const SQLITE_BUSY: i32 = 5;
/// `SQLITE_LOCKED`
pub const SQLITE_LOCKED: i32 = 6;
/// `SQLITE_INTERRUPT`
pub const SQLITE_INTERRUPT: i32 = 9;

impl NamedEnum for TranslatedKind {
    const VARIANTS: &'static [Self] =
        &[Self::Timeout, Self::Deadlock, Self::Cancelled, Self::Unknown];

    fn name(&self) -> &'static str {
        match self {
            Self::Timeout => "Timeout",
            Self::Deadlock => "Deadlock",
            Self::Cancelled => "Cancelled",
            Self::Unknown => "Unknown",
        }
    }
}

/// Result code to translated kind lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationTable {
    by_code: HashMap<i32, TranslatedKind>,
}

impl TranslationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Busy → `Timeout`, locked → `Deadlock`, interrupt → `Cancelled`
    #[must_use]
    pub fn sqlite_standard() -> Self {
        Self::new()
            .with(SQLITE_BUSY, TranslatedKind::Timeout)
            .with(SQLITE_LOCKED, TranslatedKind::Deadlock)
            .with(SQLITE_INTERRUPT, TranslatedKind::Cancelled)
    }

    #[must_use]
    pub fn with(mut self, code: i32, kind: TranslatedKind) -> Self {
        self.insert(code, kind);
        self
    }

    pub fn insert(&mut self, code: i32, kind: TranslatedKind) {
        self.by_code.insert(code, kind);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Extended code takes precedence over the primary code
    #[must_use]
    pub fn translate(&self, error: &DriverError) -> Option<TranslatedKind> {
        let extended = error.code.and_then(|code| self.by_code.get(&code));
        let primary = || error.primary_code().and_then(|code| self.by_code.get(&code));
        extended.or_else(primary).copied()
    }
}
