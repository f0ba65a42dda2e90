//! Capabilities a stored value must provide for the table's walks.

use crate::ptr_table::SlotHandle;

/// A value record stored in a [`PtrTable`](crate::PtrTable).
///
/// Call-tree records typically hold their own nested table; the walks
/// below are expected to recurse into it.
pub trait Record {
    /// Detached copy produced by [`Record::export_copy`].
    type Snapshot;

    /// Emit this record's diagnostics, indented for `nesting_level`.
    fn print_stats(&self, nesting_level: usize);

    /// Number of logical records this value represents. Zero means the
    /// value is skipped by [`PtrTable::flatten_to_array`](crate::PtrTable::flatten_to_array).
    fn records_to_copy(&self) -> usize;

    /// Copy this record; with `deep`, nested tables are copied too.
    fn export_copy(&self, deep: bool) -> Self::Snapshot;

    /// Reset time-windowed counters as of `now`.
    fn reset_counters(&mut self, now: u64);
}

/// One entry of a flattened table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exported<S> {
    /// Handle of the live value; identities get remapped by the caller once
    /// the copies exist.
    Shallow(SlotHandle),
    /// The value's own deep copy.
    Deep(S),
}

impl<S> Exported<S> {
    pub fn handle(&self) -> Option<SlotHandle> {
        match self {
            Exported::Shallow(h) => Some(*h),
            Exported::Deep(_) => None,
        }
    }

    pub fn snapshot(&self) -> Option<&S> {
        match self {
            Exported::Shallow(_) => None,
            Exported::Deep(s) => Some(s),
        }
    }

    pub fn into_snapshot(self) -> Option<S> {
        match self {
            Exported::Shallow(_) => None,
            Exported::Deep(s) => Some(s),
        }
    }
}
