//! Seven-variable path state and its scenario classification.
//!
//! Every relative path is observed as a tuple of seven booleans drawn from
//! the two disks and the catalog. The tuple collapses into one of 34
//! scenarios; the scenario number is a stable identifier referenced by tests
//! and logs, and maps onto the user-facing status label.

use serde::{Deserialize, Serialize};

use crate::types::{Entry, SpacesView};

/// The observed situation of one path, re-read between pipeline stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathState {
    /// A file or directory exists at the Archives path.
    pub a_disk: bool,
    /// A catalog entry exists for this path.
    pub a_db: bool,
    /// A file or directory exists at the Spaces path.
    pub s_disk: bool,
    /// A spaces-view row exists for the entry.
    pub s_db: bool,
    /// `Entry.selected`, or false when no entry exists.
    pub selected: bool,
    /// Archives disk mtime differs from the entry's recorded mtime.
    pub a_dirty: bool,
    /// Spaces disk mtime differs from the view's synced mtime.
    pub s_dirty: bool,
}

/// User-facing status label derived from the scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiStatus {
    /// The path does not exist anywhere; no label is shown.
    None,
    Untracked,
    Lost,
    Recovering,
    Archived,
    Syncing,
    Repairing,
    Conflict,
    Removing,
    Synced,
    Updating,
}

impl UiStatus {
    /// Wire form of the label; the nonexistent state renders empty.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Untracked => "untracked",
            Self::Lost => "lost",
            Self::Recovering => "recovering",
            Self::Archived => "archived",
            Self::Syncing => "syncing",
            Self::Repairing => "repairing",
            Self::Conflict => "conflict",
            Self::Removing => "removing",
            Self::Synced => "synced",
            Self::Updating => "updating",
        }
    }
}

impl std::fmt::Display for UiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PathState {
    /// Build the state from catalog rows and disk observations.
    ///
    /// `archives_mtime` and `spaces_mtime` are `None` when the path is absent
    /// on the respective disk, nanoseconds since the epoch otherwise.
    #[must_use]
    pub fn compute(
        entry: Option<&Entry>,
        view: Option<&SpacesView>,
        archives_mtime: Option<i64>,
        spaces_mtime: Option<i64>,
    ) -> Self {
        let mut state = Self {
            a_disk: archives_mtime.is_some(),
            a_db: entry.is_some(),
            s_disk: spaces_mtime.is_some(),
            s_db: view.is_some(),
            ..Self::default()
        };

        if let Some(entry) = entry {
            state.selected = entry.selected;
            if let Some(mtime) = archives_mtime {
                state.a_dirty = mtime != entry.mtime;
            }
        }

        if let (Some(view), Some(mtime)) = (view, spaces_mtime) {
            state.s_dirty = mtime != view.synced_mtime;
        }

        state
    }

    /// Scenario number (1..=34) from the fixed decision tree over
    /// `(a_db, a_disk, s_disk, s_db, selected, a_dirty, s_dirty)`.
    #[must_use]
    pub const fn scenario(&self) -> u8 {
        if !self.a_db {
            // No catalog row: 1-4.
            return match (self.a_disk, self.s_disk) {
                (false, false) => 1,
                (true, false) => 2,
                (false, true) => 3,
                (true, true) => 4,
            };
        }

        if !self.a_disk {
            // Catalog row without an Archives file: 5-14.
            if !self.s_disk {
                return match (self.s_db, self.selected) {
                    (false, false) => 5,
                    (false, true) => 6,
                    (true, false) => 7,
                    (true, true) => 8,
                };
            }
            if !self.s_db {
                return if self.selected { 10 } else { 9 };
            }
            return match (self.selected, self.s_dirty) {
                (false, false) => 11,
                (false, true) => 12,
                (true, false) => 13,
                (true, true) => 14,
            };
        }

        // Archives file and catalog row both present: 15-34.
        match (self.s_disk, self.s_db) {
            (false, false) => match (self.selected, self.a_dirty) {
                (false, false) => 15,
                (false, true) => 16,
                (true, false) => 17,
                (true, true) => 18,
            },
            (false, true) => match (self.selected, self.a_dirty) {
                (false, false) => 19,
                (false, true) => 20,
                (true, false) => 21,
                (true, true) => 22,
            },
            (true, false) => match (self.selected, self.a_dirty) {
                (false, false) => 23,
                (false, true) => 24,
                (true, false) => 25,
                (true, true) => 26,
            },
            (true, true) => match (self.selected, self.a_dirty, self.s_dirty) {
                (false, false, false) => 27,
                (false, false, true) => 28,
                (false, true, false) => 29,
                (false, true, true) => 30,
                (true, false, false) => 31,
                (true, false, true) => 32,
                (true, true, false) => 33,
                (true, true, true) => 34,
            },
        }
    }

    /// User-facing label for the current scenario.
    #[must_use]
    pub const fn ui_status(&self) -> UiStatus {
        match self.scenario() {
            1 => UiStatus::None,
            2..=4 => UiStatus::Untracked,
            5..=8 => UiStatus::Lost,
            9..=14 => UiStatus::Recovering,
            15 | 16 => UiStatus::Archived,
            17 | 18 => UiStatus::Syncing,
            19..=23 | 25 | 26 => UiStatus::Repairing,
            24 | 30 | 34 => UiStatus::Conflict,
            27..=29 => UiStatus::Removing,
            31 => UiStatus::Synced,
            // 32 | 33; scenario() is total over 1..=34.
            _ => UiStatus::Updating,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryKind;

    fn state(
        a_db: bool,
        a_disk: bool,
        s_disk: bool,
        s_db: bool,
        selected: bool,
        a_dirty: bool,
        s_dirty: bool,
    ) -> PathState {
        PathState {
            a_disk,
            a_db,
            s_disk,
            s_db,
            selected,
            a_dirty,
            s_dirty,
        }
    }

    #[test]
    fn scenario_truth_table() {
        // (a_db, a_disk, s_disk, s_db, selected, a_dirty, s_dirty) → scenario
        let table: &[((bool, bool, bool, bool, bool, bool, bool), u8)] = &[
            ((false, false, false, false, false, false, false), 1),
            ((false, true, false, false, false, false, false), 2),
            ((false, false, true, false, false, false, false), 3),
            ((false, true, true, false, false, false, false), 4),
            ((true, false, false, false, false, false, false), 5),
            ((true, false, false, false, true, false, false), 6),
            ((true, false, false, true, false, false, false), 7),
            ((true, false, false, true, true, false, false), 8),
            ((true, false, true, false, false, false, false), 9),
            ((true, false, true, false, true, false, false), 10),
            ((true, false, true, true, false, false, false), 11),
            ((true, false, true, true, false, false, true), 12),
            ((true, false, true, true, true, false, false), 13),
            ((true, false, true, true, true, false, true), 14),
            ((true, true, false, false, false, false, false), 15),
            ((true, true, false, false, false, true, false), 16),
            ((true, true, false, false, true, false, false), 17),
            ((true, true, false, false, true, true, false), 18),
            ((true, true, false, true, false, false, false), 19),
            ((true, true, false, true, false, true, false), 20),
            ((true, true, false, true, true, false, false), 21),
            ((true, true, false, true, true, true, false), 22),
            ((true, true, true, false, false, false, false), 23),
            ((true, true, true, false, false, true, false), 24),
            ((true, true, true, false, true, false, false), 25),
            ((true, true, true, false, true, true, false), 26),
            ((true, true, true, true, false, false, false), 27),
            ((true, true, true, true, false, false, true), 28),
            ((true, true, true, true, false, true, false), 29),
            ((true, true, true, true, false, true, true), 30),
            ((true, true, true, true, true, false, false), 31),
            ((true, true, true, true, true, false, true), 32),
            ((true, true, true, true, true, true, false), 33),
            ((true, true, true, true, true, true, true), 34),
        ];

        for ((a_db, a_disk, s_disk, s_db, selected, a_dirty, s_dirty), expected) in table {
            let s = state(*a_db, *a_disk, *s_disk, *s_db, *selected, *a_dirty, *s_dirty);
            assert_eq!(
                s.scenario(),
                *expected,
                "state {s:?} should classify as scenario {expected}"
            );
        }
    }

    #[test]
    fn label_mapping() {
        let cases: &[(u8, UiStatus)] = &[
            (1, UiStatus::None),
            (2, UiStatus::Untracked),
            (4, UiStatus::Untracked),
            (5, UiStatus::Lost),
            (8, UiStatus::Lost),
            (9, UiStatus::Recovering),
            (14, UiStatus::Recovering),
            (15, UiStatus::Archived),
            (16, UiStatus::Archived),
            (17, UiStatus::Syncing),
            (18, UiStatus::Syncing),
            (19, UiStatus::Repairing),
            (23, UiStatus::Repairing),
            (24, UiStatus::Conflict),
            (25, UiStatus::Repairing),
            (26, UiStatus::Repairing),
            (27, UiStatus::Removing),
            (29, UiStatus::Removing),
            (30, UiStatus::Conflict),
            (31, UiStatus::Synced),
            (32, UiStatus::Updating),
            (33, UiStatus::Updating),
            (34, UiStatus::Conflict),
        ];

        // Reuse the truth table shapes via brute force: enumerate all states
        // and check each expected (scenario, label) pair is produced.
        let mut seen = std::collections::HashMap::new();
        for bits in 0..128_u8 {
            let s = state(
                bits & 1 != 0,
                bits & 2 != 0,
                bits & 4 != 0,
                bits & 8 != 0,
                bits & 16 != 0,
                bits & 32 != 0,
                bits & 64 != 0,
            );
            seen.insert(s.scenario(), s.ui_status());
        }
        for (scenario, label) in cases {
            assert_eq!(
                seen.get(scenario),
                Some(label),
                "scenario {scenario} should map to {label:?}"
            );
        }
    }

    #[test]
    fn every_scenario_is_reachable() {
        let mut seen = std::collections::HashSet::new();
        for bits in 0..128_u8 {
            let s = state(
                bits & 1 != 0,
                bits & 2 != 0,
                bits & 4 != 0,
                bits & 8 != 0,
                bits & 16 != 0,
                bits & 32 != 0,
                bits & 64 != 0,
            );
            seen.insert(s.scenario());
        }
        for scenario in 1..=34_u8 {
            assert!(seen.contains(&scenario), "scenario {scenario} unreachable");
        }
    }

    fn sample_entry(selected: bool, mtime: i64) -> Entry {
        Entry {
            inode: 42,
            parent_ino: 0,
            name: "r.txt".to_owned(),
            kind: EntryKind::Text,
            size: Some(1),
            mtime,
            selected,
        }
    }

    #[test]
    fn compute_fully_synced() {
        let entry = sample_entry(true, 1_000);
        let view = SpacesView {
            entry_ino: 42,
            synced_mtime: 1_000,
            checked_at: 2_000,
        };
        let s = PathState::compute(Some(&entry), Some(&view), Some(1_000), Some(1_000));
        assert_eq!(s.scenario(), 31);
        assert_eq!(s.ui_status(), UiStatus::Synced);
    }

    #[test]
    fn compute_dirty_sides() {
        let entry = sample_entry(true, 1_000);
        let view = SpacesView {
            entry_ino: 42,
            synced_mtime: 1_000,
            checked_at: 2_000,
        };
        // Archives rewritten.
        let s = PathState::compute(Some(&entry), Some(&view), Some(1_500), Some(1_000));
        assert!(s.a_dirty);
        assert!(!s.s_dirty);
        assert_eq!(s.scenario(), 33);

        // Both rewritten: conflict.
        let s = PathState::compute(Some(&entry), Some(&view), Some(1_500), Some(1_700));
        assert_eq!(s.scenario(), 34);
        assert_eq!(s.ui_status(), UiStatus::Conflict);
    }

    #[test]
    fn compute_without_rows_ignores_dirty_flags() {
        let s = PathState::compute(None, None, Some(1_000), Some(1_000));
        assert_eq!(s.scenario(), 4);
        assert!(!s.selected);
        assert!(!s.a_dirty);
        assert!(!s.s_dirty);
    }

    #[test]
    fn empty_label_only_for_nonexistent() {
        let s = state(false, false, false, false, false, false, false);
        assert_eq!(s.ui_status().as_str(), "");
        let s = state(false, true, false, false, false, false, false);
        assert_ne!(s.ui_status().as_str(), "");
    }
}
