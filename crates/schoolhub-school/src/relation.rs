//! Reconciliation of keyed relationship lists.
//!
//! A relationship list holds at most one principal per key (for class
//! assignments: one teacher per subject). [`diff`] compares the persisted
//! list with a requested one and yields the minimal set of rows to add and
//! remove.

use std::collections::HashMap;

/// A `(key, principal)` pair. Two pairs with the same key and different
/// principals are a change, not two relations.
pub trait Relation: Clone + PartialEq {
    fn key(&self) -> &str;
}

/// How keys absent from the request are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffMode {
    /// Keys the request does not mention are kept.
    #[default]
    Merge,
    /// Keys the request does not mention are removed.
    Replace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationDiff<R> {
    /// The list after applying the delta.
    pub merged: Vec<R>,
    /// Pairs to write.
    pub added: Vec<R>,
    /// Pairs to delete.
    pub removed: Vec<R>,
}

impl<R> RelationDiff<R> {
    /// True when nothing needs to be written or deleted.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Collapses `list` to one entry per key; the last entry for a key wins but
/// keeps the position of the first.
pub fn normalize<R: Relation>(list: &[R]) -> Vec<R> {
    let mut out: Vec<R> = Vec::with_capacity(list.len());
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(list.len());
    for item in list {
        match positions.get(item.key()) {
            Some(&pos) => out[pos] = item.clone(),
            None => {
                positions.insert(item.key(), out.len());
                out.push(item.clone());
            }
        }
    }
    out
}

/// Computes the delta that turns `current` into what `requested` asks for.
///
/// Unchanged pairs land in `merged` only. A key whose principal changed
/// yields the old pair in `removed` and the new one in `added`. Output order
/// follows first appearance, `current` before `requested`.
pub fn diff<R: Relation>(current: &[R], requested: &[R], mode: DiffMode) -> RelationDiff<R> {
    let current = normalize(current);
    let requested = normalize(requested);

    let current_by_key: HashMap<&str, &R> = current.iter().map(|r| (r.key(), r)).collect();
    let requested_by_key: HashMap<&str, &R> = requested.iter().map(|r| (r.key(), r)).collect();

    let mut merged = Vec::with_capacity(current.len().max(requested.len()));
    let mut added = Vec::new();
    let mut removed = Vec::new();

    for existing in &current {
        match requested_by_key.get(existing.key()) {
            Some(wanted) if *wanted == existing => merged.push(existing.clone()),
            Some(_) => removed.push(existing.clone()),
            None => match mode {
                DiffMode::Merge => merged.push(existing.clone()),
                DiffMode::Replace => removed.push(existing.clone()),
            },
        }
    }

    for wanted in &requested {
        let unchanged = current_by_key
            .get(wanted.key())
            .is_some_and(|existing| *existing == wanted);
        if !unchanged {
            added.push(wanted.clone());
            merged.push(wanted.clone());
        }
    }

    RelationDiff {
        merged,
        added,
        removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Pair(&'static str, &'static str);

    impl Relation for Pair {
        fn key(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_changed_principal_is_one_remove_and_one_add() {
        let result = diff(&[Pair("S1", "T1")], &[Pair("S1", "T2")], DiffMode::Merge);
        assert_eq!(result.removed, vec![Pair("S1", "T1")]);
        assert_eq!(result.added, vec![Pair("S1", "T2")]);
        assert_eq!(result.merged, vec![Pair("S1", "T2")]);
    }

    #[test]
    fn test_unchanged_pairs_are_not_reissued() {
        let current = [Pair("S1", "T1"), Pair("S2", "T2")];
        let result = diff(&current, &current, DiffMode::Merge);
        assert!(result.is_empty());
        assert_eq!(result.merged, current.to_vec());
    }

    #[test]
    fn test_merge_keeps_unmentioned_keys() {
        let current = [Pair("S1", "T1"), Pair("S2", "T2")];
        let requested = [Pair("S3", "T3")];
        let result = diff(&current, &requested, DiffMode::Merge);
        assert!(result.removed.is_empty());
        assert_eq!(result.added, vec![Pair("S3", "T3")]);
        assert_eq!(
            result.merged,
            vec![Pair("S1", "T1"), Pair("S2", "T2"), Pair("S3", "T3")]
        );
    }

    #[test]
    fn test_replace_drops_unmentioned_keys() {
        let current = [Pair("S1", "T1"), Pair("S2", "T2")];
        let requested = [Pair("S2", "T2"), Pair("S3", "T3")];
        let result = diff(&current, &requested, DiffMode::Replace);
        assert_eq!(result.removed, vec![Pair("S1", "T1")]);
        assert_eq!(result.added, vec![Pair("S3", "T3")]);
        assert_eq!(result.merged, vec![Pair("S2", "T2"), Pair("S3", "T3")]);
    }

    #[test]
    fn test_duplicate_request_keys_last_write_wins() {
        let requested = [Pair("S1", "T1"), Pair("S2", "T9"), Pair("S1", "T2")];
        assert_eq!(
            normalize(&requested),
            vec![Pair("S1", "T2"), Pair("S2", "T9")]
        );

        let result = diff(&[Pair("S1", "T2")], &requested, DiffMode::Merge);
        assert_eq!(result.added, vec![Pair("S2", "T9")]);
        assert!(result.removed.is_empty());
    }

    #[test]
    fn test_merged_is_current_minus_removed_plus_added() {
        let current = [Pair("A", "1"), Pair("B", "2"), Pair("C", "3")];
        let requested = [Pair("B", "9"), Pair("C", "3"), Pair("D", "4")];

        for mode in [DiffMode::Merge, DiffMode::Replace] {
            let result = diff(&current, &requested, mode);
            let mut expected: Vec<Pair> = current
                .iter()
                .filter(|c| !result.removed.contains(c))
                .cloned()
                .collect();
            expected.extend(result.added.iter().cloned());
            assert_eq!(result.merged, expected, "mode {mode:?}");
        }
    }

    #[test]
    fn test_empty_inputs() {
        let none: [Pair; 0] = [];
        let result = diff(&none, &none, DiffMode::Merge);
        assert!(result.is_empty());
        assert!(result.merged.is_empty());

        let result = diff(&[Pair("A", "1")], &none, DiffMode::Replace);
        assert_eq!(result.removed, vec![Pair("A", "1")]);
        assert!(result.merged.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        #[derive(Debug, Clone, PartialEq)]
        struct Row(String, String);

        impl Relation for Row {
            fn key(&self) -> &str {
                &self.0
            }
        }

        fn arb_rows() -> impl Strategy<Value = Vec<Row>> {
            prop::collection::vec(("[a-e]", "[1-3]").prop_map(|(k, p)| Row(k, p)), 0..8)
        }

        fn arb_mode() -> impl Strategy<Value = DiffMode> {
            prop_oneof![Just(DiffMode::Merge), Just(DiffMode::Replace)]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn prop_diff_is_consistent(
                current in arb_rows(),
                requested in arb_rows(),
                mode in arb_mode(),
            ) {
                let result = diff(&current, &requested, mode);

                let keys: HashSet<&str> = result.merged.iter().map(Relation::key).collect();
                prop_assert_eq!(keys.len(), result.merged.len(), "one merged entry per key");

                for added in &result.added {
                    prop_assert!(!result.removed.contains(added), "{:?} both added and removed", added);
                }

                let mut rebuilt: Vec<Row> = normalize(&current)
                    .into_iter()
                    .filter(|row| !result.removed.contains(row))
                    .collect();
                rebuilt.extend(result.added.iter().cloned());
                prop_assert_eq!(&rebuilt, &result.merged);

                // Every requested pair ends up in merged as asked.
                for wanted in normalize(&requested) {
                    prop_assert!(result.merged.contains(&wanted), "{:?} missing", wanted);
                }
                if mode == DiffMode::Replace {
                    prop_assert_eq!(result.merged.len(), normalize(&requested).len());
                }
            }

            #[test]
            fn prop_applying_a_diff_twice_is_a_no_op(
                current in arb_rows(),
                requested in arb_rows(),
                mode in arb_mode(),
            ) {
                let first = diff(&current, &requested, mode);
                let second = diff(&first.merged, &requested, mode);
                prop_assert!(second.is_empty());
                prop_assert_eq!(second.merged, first.merged);
            }
        }
    }
}
