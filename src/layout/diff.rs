//! This module contains the layout differ, which computes the minimal edit
//! sequence between two storage layouts.
//!
//! The differ runs a classic edit-distance dynamic program over the two slot
//! sequences, with asymmetric costs chosen so that a single in-place change
//! (cost 3) is never cheaper than an unpaired deletion plus insertion
//! (cost 4). The lowest-cost path therefore matches semantically equal slots
//! whenever possible, and the edits it reports are the smallest honest
//! description of what changed.

use itertools::Itertools;

use crate::{
    constant::{LAYOUT_DELETION_COST, LAYOUT_INSERTION_COST, LAYOUT_SUBSTITUTION_COST},
    error::layout::{Error, Result},
    layout::{Action, Operation, StorageSlot},
};

/// Classifies the relationship between a slot of the original layout and a
/// slot of the updated layout.
///
/// Same type and label means the slots are equal; same type under a new
/// label is a rename; same label with a new type is a typechange; and
/// agreement on neither is a wholesale replacement.
#[must_use]
fn classify(original: &StorageSlot, updated: &StorageSlot) -> Action {
    let same_type = original.type_id == updated.type_id;
    let same_label = original.label == updated.label;
    match (same_type, same_label) {
        (true, true) => Action::Equal,
        (true, false) => Action::Rename,
        (false, true) => Action::Typechange,
        (false, false) => Action::Replace,
    }
}

/// Computes the edit sequence that transforms the `original` layout into the
/// `updated` one, with `equal` operations filtered out.
///
/// Edits at the tail of the sequence are reported as `append` and `pop`
/// rather than `insert` and `delete`: growth past the last existing slot
/// leaves every assigned slot where it was, while an edit in the middle
/// shifts everything after it. That distinction is the entire point of
/// running this diff before an upgrade.
///
/// # Errors
///
/// Fails with [`Error::BacktrackFailed`] if the backtracking pass reaches a
/// cell with no consistent predecessor. The matrix is constructed so that
/// this cannot happen; the error indicates a bug in the differ itself.
pub fn diff(original: &[StorageSlot], updated: &[StorageSlot]) -> Result<Vec<Operation>> {
    let rows = original.len();
    let columns = updated.len();

    // matrix[i][j] holds the cheapest cost of transforming the first i
    // original slots into the first j updated slots.
    let mut matrix = vec![vec![0usize; columns + 1]; rows + 1];
    for (i, row) in matrix.iter_mut().enumerate().skip(1) {
        row[0] = i * LAYOUT_DELETION_COST;
    }
    for j in 1..=columns {
        matrix[0][j] = j * LAYOUT_INSERTION_COST;
    }
    for i in 1..=rows {
        for j in 1..=columns {
            let substitution_cost = if classify(&original[i - 1], &updated[j - 1]) == Action::Equal
            {
                0
            } else {
                LAYOUT_SUBSTITUTION_COST
            };
            matrix[i][j] = (matrix[i - 1][j - 1] + substitution_cost)
                .min(matrix[i][j - 1] + LAYOUT_INSERTION_COST)
                .min(matrix[i - 1][j] + LAYOUT_DELETION_COST);
        }
    }

    // Walk the optimal path back from the final cell to the origin,
    // preferring equality, then insertion, then deletion, then substitution.
    let mut operations = Vec::new();
    let (mut i, mut j) = (rows, columns);
    while i > 0 || j > 0 {
        let cost = matrix[i][j];

        if i > 0
            && j > 0
            && matrix[i - 1][j - 1] == cost
            && classify(&original[i - 1], &updated[j - 1]) == Action::Equal
        {
            operations.push(Operation {
                action:   Action::Equal,
                original: Some(original[i - 1].clone()),
                updated:  Some(updated[j - 1].clone()),
            });
            i -= 1;
            j -= 1;
        } else if j > 0 && matrix[i][j - 1] + LAYOUT_INSERTION_COST == cost {
            let action = if i >= rows { Action::Append } else { Action::Insert };
            operations.push(Operation {
                action,
                original: None,
                updated: Some(updated[j - 1].clone()),
            });
            j -= 1;
        } else if i > 0 && matrix[i - 1][j] + LAYOUT_DELETION_COST == cost {
            let action = if j >= columns { Action::Pop } else { Action::Delete };
            operations.push(Operation {
                action,
                original: Some(original[i - 1].clone()),
                updated: None,
            });
            i -= 1;
        } else if i > 0 && j > 0 && matrix[i - 1][j - 1] + LAYOUT_SUBSTITUTION_COST == cost {
            operations.push(Operation {
                action:   classify(&original[i - 1], &updated[j - 1]),
                original: Some(original[i - 1].clone()),
                updated:  Some(updated[j - 1].clone()),
            });
            i -= 1;
            j -= 1;
        } else {
            return Err(Error::BacktrackFailed {
                row:    i,
                column: j,
                matrix: render_matrix(&matrix),
            });
        }
    }

    operations.reverse();
    Ok(operations
        .into_iter()
        .filter(|operation| operation.action != Action::Equal)
        .collect())
}

/// Renders the edit matrix for inclusion in a backtracking failure report.
fn render_matrix(matrix: &[Vec<usize>]) -> String {
    matrix
        .iter()
        .map(|row| row.iter().map(|cell| format!("{cell:>4}")).join(" "))
        .join("\n")
}

#[cfg(test)]
mod test {
    use super::diff;
    use crate::layout::{Action, StorageSlot};

    /// Constructs a slot with the provided `label` and `type_id`, with the
    /// positional fields held constant.
    fn slot(label: &str, type_id: &str) -> StorageSlot {
        StorageSlot {
            contract: "Example".to_string(),
            path:     "contracts/Example.sol".to_string(),
            label:    label.to_string(),
            type_id:  type_id.to_string(),
            src:      "0:0:0".to_string(),
        }
    }

    #[test]
    fn identical_layouts_produce_no_operations() {
        let layout = vec![slot("a", "t_uint256"), slot("b", "t_address")];
        assert!(diff(&layout, &layout).unwrap().is_empty());
    }

    #[test]
    fn growth_at_the_tail_is_an_append() {
        let original = vec![slot("a", "t_uint256")];
        let updated = vec![slot("a", "t_uint256"), slot("b", "t_address")];

        let operations = diff(&original, &updated).unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].action, Action::Append);
        assert_eq!(operations[0].updated.as_ref().unwrap().label, "b");
        assert!(operations[0].original.is_none());
    }

    #[test]
    fn shrinkage_at_the_tail_is_a_pop() {
        let original = vec![slot("a", "t_uint256"), slot("b", "t_address")];
        let updated = vec![slot("a", "t_uint256")];

        let operations = diff(&original, &updated).unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].action, Action::Pop);
        assert_eq!(operations[0].original.as_ref().unwrap().label, "b");
        assert!(operations[0].updated.is_none());
    }

    #[test]
    fn growth_in_the_middle_is_an_insert() {
        let original = vec![slot("a", "t_uint256"), slot("b", "t_address")];
        let updated = vec![slot("a", "t_uint256"), slot("x", "t_bool"), slot("b", "t_address")];

        let operations = diff(&original, &updated).unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].action, Action::Insert);
        assert_eq!(operations[0].updated.as_ref().unwrap().label, "x");
    }

    #[test]
    fn removal_in_the_middle_is_a_delete() {
        let original = vec![slot("a", "t_uint256"), slot("x", "t_bool"), slot("b", "t_address")];
        let updated = vec![slot("a", "t_uint256"), slot("b", "t_address")];

        let operations = diff(&original, &updated).unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].action, Action::Delete);
        assert_eq!(operations[0].original.as_ref().unwrap().label, "x");
    }

    #[test]
    fn relabelling_a_slot_is_a_rename() {
        let original = vec![slot("b", "t_uint256")];
        let updated = vec![slot("c", "t_uint256")];

        let operations = diff(&original, &updated).unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].action, Action::Rename);
        assert_eq!(operations[0].original.as_ref().unwrap().label, "b");
        assert_eq!(operations[0].updated.as_ref().unwrap().label, "c");
    }

    #[test]
    fn retyping_a_slot_is_a_typechange() {
        let original = vec![slot("a", "t_uint256")];
        let updated = vec![slot("a", "t_uint128")];

        let operations = diff(&original, &updated).unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].action, Action::Typechange);
    }

    #[test]
    fn changing_both_label_and_type_is_a_replace() {
        let original = vec![slot("a", "t_uint256")];
        let updated = vec![slot("b", "t_bool")];

        let operations = diff(&original, &updated).unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].action, Action::Replace);
    }

    #[test]
    fn equal_slots_are_matched_across_an_insertion() {
        // The cost choice must pair up the three equal slots rather than
        // report a run of replacements.
        let original = vec![slot("a", "t_uint256"), slot("b", "t_address"), slot("c", "t_bool")];
        let updated = vec![
            slot("a", "t_uint256"),
            slot("n", "t_uint128"),
            slot("b", "t_address"),
            slot("c", "t_bool"),
        ];

        let operations = diff(&original, &updated).unwrap();
        assert_eq!(operations.len(), 1);
        assert_eq!(operations[0].action, Action::Insert);
        assert_eq!(operations[0].updated.as_ref().unwrap().label, "n");
    }

    #[test]
    fn empty_original_grows_by_appends() {
        let updated = vec![slot("a", "t_uint256"), slot("b", "t_address")];
        let operations = diff(&[], &updated).unwrap();
        assert_eq!(operations.len(), 2);
        assert!(operations.iter().all(|op| op.action == Action::Append));
    }
}
