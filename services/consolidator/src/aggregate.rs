//! Grouping of line items per canonical supplier.
//!
//! Output order is first-seen insertion order. Sorting is left to the
//! presentation layer (`report`).

use std::collections::HashMap;

use serde::Serialize;

use crate::row::LineItem;

/// Rolled-up totals and detail list for one canonical supplier.
///
/// Invariants, kept by construction:
/// - `total_value == sum(item.total_value)`
/// - `total_hours == sum(item.hours where item.hours > 0)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierAggregate {
    #[serde(rename = "fornecedor")]
    canonical_name: String,
    #[serde(rename = "total")]
    total_value: f64,
    #[serde(rename = "total_horas")]
    total_hours: f64,
    #[serde(rename = "detalhes")]
    line_items: Vec<LineItem>,
}

impl SupplierAggregate {
    fn new(canonical_name: String) -> Self {
        Self {
            canonical_name,
            total_value: 0.0,
            total_hours: 0.0,
            line_items: Vec::new(),
        }
    }

    /// Rebuild an aggregate from a detail list.
    pub fn from_items(canonical_name: impl Into<String>, items: impl IntoIterator<Item = LineItem>) -> Self {
        let mut aggregate = Self::new(canonical_name.into());
        for item in items {
            aggregate.push(item);
        }
        aggregate
    }

    fn push(&mut self, item: LineItem) {
        self.total_value += item.total_value;
        if item.hours > 0.0 {
            self.total_hours += item.hours;
        }
        self.line_items.push(item);
    }

    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    pub fn total_value(&self) -> f64 {
        self.total_value
    }

    pub fn total_hours(&self) -> f64 {
        self.total_hours
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn into_parts(self) -> (String, Vec<LineItem>) {
        (self.canonical_name, self.line_items)
    }
}

/// Accumulates `(canonical_name, LineItem)` pairs. One per ingestion call.
#[derive(Debug, Default)]
pub struct Aggregator {
    aggregates: Vec<SupplierAggregate>,
    positions: HashMap<String, usize>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, canonical_name: String, item: LineItem) {
        let idx = match self.positions.get(&canonical_name) {
            Some(&idx) => idx,
            None => {
                let idx = self.aggregates.len();
                self.positions.insert(canonical_name.clone(), idx);
                self.aggregates.push(SupplierAggregate::new(canonical_name));
                idx
            }
        };
        self.aggregates[idx].push(item);
    }

    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }

    /// Finalize: aggregates in first-seen order.
    pub fn finish(self) -> Vec<SupplierAggregate> {
        self.aggregates
    }
}

impl Extend<(String, LineItem)> for Aggregator {
    fn extend<T: IntoIterator<Item = (String, LineItem)>>(&mut self, iter: T) {
        for (name, item) in iter {
            self.add(name, item);
        }
    }
}

/// Group pairs into aggregates in one pass.
pub fn aggregate<I>(pairs: I) -> Vec<SupplierAggregate>
where
    I: IntoIterator<Item = (String, LineItem)>,
{
    let mut aggregator = Aggregator::new();
    aggregator.extend(pairs);
    aggregator.finish()
}
