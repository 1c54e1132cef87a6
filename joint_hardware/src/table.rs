//! RAM-backed flash table.

use joint_traits::{BoxError, PersistentTable};

use crate::error::HwError;

/// Value an erased flash half-word reads back as.
pub const ERASED: u16 = 0xFFFF;

/// `PersistentTable` with flash-like rules: writes only inside a
/// begin/end window, strictly sequential, bounded by capacity.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    entries: Vec<u16>,
    cursor: Option<usize>,
    fail_after: Option<usize>,
    writes: usize,
}

impl MemoryTable {
    /// Erased table with `capacity` entries.
    pub fn erased(capacity: usize) -> Self {
        Self {
            entries: vec![ERASED; capacity],
            cursor: None,
            fail_after: None,
            writes: 0,
        }
    }

    /// Table preloaded with previously persisted contents.
    pub fn from_entries(entries: Vec<u16>) -> Self {
        Self {
            entries,
            cursor: None,
            fail_after: None,
            writes: 0,
        }
    }

    /// Make every append after the first `n` fail, to exercise storage faults.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Entries appended since the table was created.
    pub fn total_writes(&self) -> usize {
        self.writes
    }

    pub fn is_erased(&self) -> bool {
        self.entries.iter().all(|&e| e == ERASED)
    }
}

impl PersistentTable for MemoryTable {
    fn clear(&mut self) -> Result<(), BoxError> {
        self.entries.fill(ERASED);
        self.cursor = None;
        tracing::debug!(capacity = self.entries.len(), "table erased");
        Ok(())
    }

    fn begin_write(&mut self) -> Result<(), BoxError> {
        if self.cursor.is_some() {
            tracing::warn!("begin_write while a write window is open");
            return Err(Box::new(HwError::WriteAlreadyOpen));
        }
        self.cursor = Some(0);
        Ok(())
    }

    fn append_u16(&mut self, value: u16) -> Result<(), BoxError> {
        let Some(idx) = self.cursor else {
            tracing::warn!(value, "append outside a write window");
            return Err(Box::new(HwError::WriteNotOpen));
        };
        if let Some(limit) = self.fail_after
            && self.writes >= limit
        {
            tracing::warn!(entry = idx, writes = self.writes, "injected flash program failure");
            return Err(Box::new(HwError::Flash(format!(
                "program failed at entry {idx}"
            ))));
        }
        let capacity = self.entries.len();
        let Some(slot) = self.entries.get_mut(idx) else {
            tracing::warn!(capacity, "append past the end of the table");
            return Err(Box::new(HwError::TableFull { capacity }));
        };
        *slot = value;
        self.cursor = Some(idx + 1);
        self.writes += 1;
        Ok(())
    }

    fn end_write(&mut self) -> Result<(), BoxError> {
        let Some(written) = self.cursor.take() else {
            tracing::warn!("end_write without an open window");
            return Err(Box::new(HwError::WriteNotOpen));
        };
        tracing::debug!(written, "table write window closed");
        Ok(())
    }

    fn entries(&self) -> &[u16] {
        &self.entries
    }
}
