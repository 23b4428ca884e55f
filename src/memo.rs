//! Explicit memoisation of derived quantities.
//!
//! Every cached quantity of a body or skeleton is a [Memo] holding the value together with
//! the stamp of the computation that produced it. Invalidating empties the cell, a query
//! recomputes it on demand.

/// Memoised value with the stamp of the computation it stems from
#[derive(Debug, Clone, PartialEq)]
pub struct Memo<T> {
    cell: Option<(T, u64)>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Memo { cell: None }
    }
}

impl<T> Memo<T> {
    pub fn get(&self) -> Option<&T> {
        self.cell.as_ref().map(|(value, _)| value)
    }

    /// Stamp of the computation that produced the current value
    pub fn stamp(&self) -> Option<u64> {
        self.cell.as_ref().map(|(_, stamp)| *stamp)
    }

    pub fn is_valid(&self) -> bool {
        self.cell.is_some()
    }

    pub fn set(&mut self, value: T, stamp: u64) {
        self.cell = Some((value, stamp));
    }

    pub fn invalidate(&mut self) {
        self.cell = None;
    }
}

impl<T: Clone> Memo<T> {
    pub fn cloned(&self) -> Option<T> {
        self.get().cloned()
    }
}
