use std::collections::HashSet;

/// A user-facing list with the item currently picked by the user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectableList {
    pub items: Vec<String>,
    pub current_selection: Option<String>,
}

impl SelectableList {
    pub fn new(items: Vec<String>, current_selection: Option<String>) -> Self {
        Self {
            items,
            current_selection,
        }
    }

    /// Change the selection. Returns `false` and leaves the list untouched
    /// when `item` is not one of the items.
    pub fn select(&mut self, item: &str) -> bool {
        if self.items.iter().any(|i| i == item) {
            self.current_selection = Some(item.to_string());
            true
        } else {
            false
        }
    }

    /// Merge `fresh_items` into this list, see [`merge`].
    ///
    /// Returns `true` if anything visible changed.
    pub fn merge_in_place(&mut self, fresh_items: &[String]) -> bool {
        let merged = merge(self, fresh_items);
        if merged == *self {
            false
        } else {
            *self = merged;
            true
        }
    }
}

/// Reconcile a list and its selection with freshly discovered items.
///
/// - Same set of items (order ignored): the list is returned unchanged, so
///   repeated identical discovery never disturbs the user.
/// - Otherwise the items are replaced by `fresh_items` and the previous
///   selection is kept if it is still present, else the first fresh item is
///   selected, else nothing is.
pub fn merge(current: &SelectableList, fresh_items: &[String]) -> SelectableList {
    let old: HashSet<&str> = current.items.iter().map(String::as_str).collect();
    let new: HashSet<&str> = fresh_items.iter().map(String::as_str).collect();
    if old == new {
        return current.clone();
    }

    let current_selection = match &current.current_selection {
        Some(selected) if new.contains(selected.as_str()) => Some(selected.clone()),
        _ => fresh_items.first().cloned(),
    };

    SelectableList {
        items: fresh_items.to_vec(),
        current_selection,
    }
}
