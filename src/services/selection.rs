//! Sheet selection bookkeeping.
//!
//! Maps a file index to the set of selected sheet indices of that file. A file
//! index only appears in the map while at least one of its sheets is selected.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SheetSelection {
    files: BTreeMap<usize, BTreeSet<usize>>,
}

impl SheetSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, file: usize, sheet: usize) -> bool {
        self.files.get(&file).map_or(false, |sheets| sheets.contains(&sheet))
    }

    /// Select the sheet if it is unselected, unselect it otherwise.
    /// Returns whether the sheet is selected afterwards.
    pub fn toggle(&mut self, file: usize, sheet: usize) -> bool {
        if self.contains(file, sheet) {
            self.deselect(file, sheet);
            false
        } else {
            self.select(file, sheet);
            true
        }
    }

    pub fn select(&mut self, file: usize, sheet: usize) {
        self.files.entry(file).or_default().insert(sheet);
    }

    pub fn deselect(&mut self, file: usize, sheet: usize) {
        if let Some(sheets) = self.files.get_mut(&file) {
            sheets.remove(&sheet);
            if sheets.is_empty() {
                self.files.remove(&file);
            }
        }
    }

    /// Replace the selected sheets of one file. An empty set drops the file.
    pub fn set_file<I>(&mut self, file: usize, sheets: I)
    where
        I: IntoIterator<Item = usize>,
    {
        let sheets: BTreeSet<usize> = sheets.into_iter().collect();
        if sheets.is_empty() {
            self.clear_file(file);
        } else {
            self.files.insert(file, sheets);
        }
    }

    pub fn clear_file(&mut self, file: usize) {
        self.files.remove(&file);
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// Forget a removed file and move the entries of later files down one
    /// index so they keep pointing at the same files.
    pub fn remove_file_and_shift(&mut self, file: usize) {
        let files = std::mem::take(&mut self.files);
        self.files = files
            .into_iter()
            .filter(|(idx, _)| *idx != file)
            .map(|(idx, sheets)| if idx > file { (idx - 1, sheets) } else { (idx, sheets) })
            .collect();
    }

    /// Selected `(file, sheet)` pairs in index order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.files
            .iter()
            .flat_map(|(file, sheets)| sheets.iter().map(move |sheet| (*file, *sheet)))
    }

    pub fn len(&self) -> usize {
        self.files.values().map(BTreeSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_adds_then_removes() {
        let mut selection = SheetSelection::new();
        assert!(selection.toggle(0, 1));
        assert!(selection.contains(0, 1));
        assert!(!selection.toggle(0, 1));
        assert!(selection.is_empty());
        assert_eq!(selection.entries().count(), 0);
    }

    #[test]
    fn test_last_sheet_removal_drops_file_entry() {
        let mut selection = SheetSelection::new();
        selection.select(2, 0);
        selection.select(2, 3);
        selection.deselect(2, 0);
        assert_eq!(selection.entries().collect::<Vec<_>>(), vec![(2, 3)]);
        selection.deselect(2, 3);
        // no empty set is left behind for file 2
        assert_eq!(serde_json::to_string(&selection).unwrap(), "{}");
        // deselecting something never selected is a no-op
        selection.deselect(7, 7);
        assert!(selection.is_empty());
    }

    #[test]
    fn test_set_file_with_empty_set_removes_entry() {
        let mut selection = SheetSelection::new();
        selection.set_file(1, [0, 2]);
        assert_eq!(selection.len(), 2);
        selection.set_file(1, Vec::new());
        assert!(selection.is_empty());
    }

    #[test]
    fn test_entries_are_ordered() {
        let mut selection = SheetSelection::new();
        selection.select(1, 2);
        selection.select(0, 1);
        selection.select(1, 0);
        let entries: Vec<_> = selection.entries().collect();
        assert_eq!(entries, vec![(0, 1), (1, 0), (1, 2)]);
    }

    #[test]
    fn test_remove_file_and_shift() {
        let mut selection = SheetSelection::new();
        selection.select(0, 0);
        selection.select(1, 1);
        selection.select(2, 0);
        selection.select(2, 2);

        selection.remove_file_and_shift(1);

        let entries: Vec<_> = selection.entries().collect();
        assert_eq!(entries, vec![(0, 0), (1, 0), (1, 2)]);
    }

    #[test]
    fn test_serializes_as_map() {
        let mut selection = SheetSelection::new();
        selection.select(0, 1);
        let json = serde_json::to_value(&selection).unwrap();
        assert_eq!(json, serde_json::json!({"0": [1]}));
    }
}
