use crate::models::{ActivityUse, SlotId};
use crate::platform::WindowHandle;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Row shown for one tracked table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSummary {
    pub handle: WindowHandle,
    pub title: String,
    pub role: ActivityUse,
    pub slot: Option<SlotId>,
    pub slot_priority: Option<i32>,
    pub evicted: bool,
    pub detected_at: DateTime<Utc>,
}

/// Table list published after every reconciliation. Placeholders are not included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSnapshot {
    /// Increases with every publication
    pub generation: u64,
    pub tables: Vec<TableSummary>,
}

/// Selection-preserving view over the published snapshots
#[derive(Debug, Default)]
pub struct TableListView {
    generation: u64,
    rows: Vec<TableSummary>,
    selected: Option<WindowHandle>,
}

impl TableListView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rows, keeping the selected table if it is still listed.
    /// Snapshots older than the one already shown are ignored.
    pub fn apply(&mut self, snapshot: &TableSnapshot) -> bool {
        if snapshot.generation < self.generation {
            debug!(
                current = self.generation,
                received = snapshot.generation,
                "Ignoring stale table snapshot"
            );
            return false;
        }

        self.generation = snapshot.generation;
        self.rows = snapshot.tables.clone();
        if let Some(handle) = self.selected {
            if !self.rows.iter().any(|row| row.handle == handle) {
                self.selected = None;
            }
        }
        true
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn rows(&self) -> &[TableSummary] {
        &self.rows
    }

    pub fn selected_handle(&self) -> Option<WindowHandle> {
        self.selected
    }

    pub fn selected_index(&self) -> Option<usize> {
        let handle = self.selected?;
        self.rows.iter().position(|row| row.handle == handle)
    }

    pub fn selected(&self) -> Option<&TableSummary> {
        self.selected_index().map(|index| &self.rows[index])
    }

    /// Select by row index as computed against `generation`.
    ///
    /// An index from another generation may point at a different table, so it is
    /// skipped and the next snapshot settles the view.
    pub fn select_index(&mut self, index: usize, generation: u64) -> bool {
        if generation != self.generation {
            debug!(
                index,
                generation,
                current = self.generation,
                "Skipping selection from another generation"
            );
            return false;
        }

        match self.rows.get(index) {
            Some(row) => {
                self.selected = Some(row.handle);
                true
            }
            None => false,
        }
    }

    pub fn select_handle(&mut self, handle: WindowHandle) -> bool {
        if self.rows.iter().any(|row| row.handle == handle) {
            self.selected = Some(handle);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u64) -> TableSummary {
        TableSummary {
            handle: WindowHandle(id),
            title: format!("Table {id}"),
            role: ActivityUse::Active,
            slot: None,
            slot_priority: None,
            evicted: false,
            detected_at: Utc::now(),
        }
    }

    fn snapshot(generation: u64, ids: &[u64]) -> TableSnapshot {
        TableSnapshot {
            generation,
            tables: ids.iter().copied().map(row).collect(),
        }
    }

    #[test]
    fn selection_follows_the_table_not_the_index() {
        let mut view = TableListView::new();
        view.apply(&snapshot(1, &[1, 2, 3]));
        assert!(view.select_index(2, 1));

        view.apply(&snapshot(2, &[3, 4]));
        assert_eq!(view.selected_handle(), Some(WindowHandle(3)));
        assert_eq!(view.selected_index(), Some(0));
    }

    #[test]
    fn selection_is_dropped_when_table_disappears() {
        let mut view = TableListView::new();
        view.apply(&snapshot(1, &[1, 2]));
        view.select_handle(WindowHandle(2));

        view.apply(&snapshot(2, &[1]));
        assert_eq!(view.selected(), None);
    }

    #[test]
    fn index_from_stale_generation_is_skipped() {
        let mut view = TableListView::new();
        view.apply(&snapshot(1, &[1, 2, 3]));
        view.apply(&snapshot(2, &[1]));

        assert!(!view.select_index(2, 1));
        assert!(!view.select_index(5, 2));
        assert_eq!(view.selected_handle(), None);
    }

    #[test]
    fn older_snapshot_does_not_overwrite_newer_one() {
        let mut view = TableListView::new();
        view.apply(&snapshot(5, &[1, 2]));
        assert!(!view.apply(&snapshot(4, &[9])));
        assert_eq!(view.rows().len(), 2);
        assert_eq!(view.generation(), 5);
    }
}
