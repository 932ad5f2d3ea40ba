use std::collections::{BTreeMap, HashSet};

use listing_config::{DEFAULT_CATEGORY, DEFAULT_PARENT_CATEGORY, WidgetConfig};
use listing_core::{AttributeRow, RowId};

use crate::normalize::normalize;

/// Display strings contributed by a single source row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowItems {
    pub row_id: RowId,
    pub items: Vec<String>,
}

/// Features grouped by parent category, then category.
///
/// Keys iterate in lexicographic order. Every (parent, category) pair present
/// holds at least one row with at least one item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedView {
    groups: BTreeMap<String, BTreeMap<String, Vec<RowItems>>>,
}

impl GroupedView {
    pub fn parent_categories(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    pub fn categories_of(&self, parent: &str) -> Vec<&str> {
        self.groups
            .get(parent)
            .map(|categories| categories.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Items of every contributing row in processing order, first occurrence kept.
    pub fn items_of(&self, parent: &str, category: &str) -> Vec<&str> {
        dedup_preserving_order(
            self.rows_of(parent, category)
                .iter()
                .flat_map(|row| row.items.iter().map(String::as_str)),
        )
    }

    pub fn rows_of(&self, parent: &str, category: &str) -> &[RowItems] {
        self.groups
            .get(parent)
            .and_then(|categories| categories.get(category))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.groups
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    fn push(&mut self, parent: &str, category: &str, row: RowItems) {
        self.groups
            .entry(parent.to_owned())
            .or_default()
            .entry(category.to_owned())
            .or_default()
            .push(row);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregator {
    default_parent_category: String,
    default_category: String,
}

impl Aggregator {
    pub fn new(default_parent_category: impl Into<String>, default_category: impl Into<String>) -> Self {
        Self {
            default_parent_category: default_parent_category.into(),
            default_category: default_category.into(),
        }
    }

    pub fn from_config(config: &WidgetConfig) -> Self {
        Self::new(
            config.default_parent_category.clone(),
            config.default_category.clone(),
        )
    }

    pub fn build<'a>(&self, rows: impl IntoIterator<Item = &'a AttributeRow>) -> GroupedView {
        let mut view = GroupedView::default();
        for row in rows {
            let items = normalize(row);
            if items.is_empty() {
                continue;
            }

            view.push(
                row.parent_category_or(&self.default_parent_category),
                row.category_or(&self.default_category),
                RowItems {
                    row_id: row.id,
                    items,
                },
            );
        }
        view
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_PARENT_CATEGORY, DEFAULT_CATEGORY)
    }
}

fn dedup_preserving_order<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    values.filter(|value| seen.insert(*value)).collect()
}
