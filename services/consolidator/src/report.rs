//! Presentation over aggregates: ordering, filtering and summary views.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::SupplierAggregate;
use crate::normalize::normalize;

/// Label for line items without a profile in the breakdown view.
pub const NO_PROFILE: &str = "Sem perfil";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortKey {
    #[default]
    Value,
    Hours,
}

/// Stable sort, largest first.
pub fn sort_suppliers(suppliers: &mut [SupplierAggregate], key: SortKey) {
    let metric = |s: &SupplierAggregate| match key {
        SortKey::Value => s.total_value(),
        SortKey::Hours => s.total_hours(),
    };
    suppliers.sort_by(|a, b| metric(b).total_cmp(&metric(a)));
}

/// Supplier selection. Unset bounds do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupplierFilter {
    /// Accent and case-insensitive substring of the canonical name.
    pub name: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_hours: Option<f64>,
    pub max_hours: Option<f64>,
}

impl SupplierFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, supplier: &SupplierAggregate) -> bool {
        if let Some(name) = &self.name {
            let needle = normalize(name);
            if !normalize(supplier.canonical_name()).contains(&needle) {
                return false;
            }
        }
        within(supplier.total_value(), self.min_value, self.max_value)
            && within(supplier.total_hours(), self.min_hours, self.max_hours)
    }

    pub fn apply(&self, suppliers: Vec<SupplierAggregate>) -> Vec<SupplierAggregate> {
        if self.is_empty() {
            return suppliers;
        }
        suppliers.into_iter().filter(|s| self.matches(s)).collect()
    }
}

fn within(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierHours {
    pub fornecedor: String,
    pub total_horas: f64,
}

/// Suppliers with positive hours, most hours first. The `unidentified`
/// supplier (the configured sentinel name) is left out.
pub fn hours_summary(suppliers: &[SupplierAggregate], unidentified: &str) -> Vec<SupplierHours> {
    let mut summary: Vec<SupplierHours> = suppliers
        .iter()
        .filter(|s| s.total_hours() > 0.0 && s.canonical_name() != unidentified)
        .map(|s| SupplierHours {
            fornecedor: s.canonical_name().to_string(),
            total_horas: s.total_hours(),
        })
        .collect();
    summary.sort_by(|a, b| b.total_horas.total_cmp(&a.total_horas));
    summary
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileTotals {
    pub perfil: String,
    pub total: f64,
    pub total_horas: f64,
    pub itens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierProfiles {
    pub fornecedor: String,
    pub total: f64,
    pub perfis: Vec<ProfileTotals>,
}

/// Per supplier, value and hours summed by profile.
///
/// Profiles group by normalized form; the first spelling seen is displayed.
pub fn profile_breakdown(suppliers: &[SupplierAggregate]) -> Vec<SupplierProfiles> {
    let mut breakdown: Vec<SupplierProfiles> = suppliers
        .iter()
        .map(|supplier| {
            let mut keys: Vec<String> = Vec::new();
            let mut perfis: Vec<ProfileTotals> = Vec::new();
            for item in supplier.line_items() {
                let label = item
                    .profile
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !normalize(p).is_empty())
                    .unwrap_or(NO_PROFILE);
                let key = normalize(label);
                let idx = match keys.iter().position(|k| *k == key) {
                    Some(idx) => idx,
                    None => {
                        keys.push(key);
                        perfis.push(ProfileTotals {
                            perfil: label.to_string(),
                            total: 0.0,
                            total_horas: 0.0,
                            itens: 0,
                        });
                        perfis.len() - 1
                    }
                };
                let totals = &mut perfis[idx];
                totals.total += item.total_value;
                if item.hours > 0.0 {
                    totals.total_horas += item.hours;
                }
                totals.itens += 1;
            }
            SupplierProfiles {
                fornecedor: supplier.canonical_name().to_string(),
                total: supplier.total_value(),
                perfis,
            }
        })
        .collect();
    breakdown.sort_by(|a, b| b.total.total_cmp(&a.total));
    breakdown
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestSupplier {
    pub fornecedor: String,
    pub total: f64,
}

/// Supplier with the highest non-zero total; the first one seen on ties.
pub fn best_supplier(suppliers: &[SupplierAggregate]) -> Option<BestSupplier> {
    let mut best: Option<&SupplierAggregate> = None;
    for supplier in suppliers.iter().filter(|s| s.total_value() != 0.0) {
        if best.map_or(true, |b| supplier.total_value() > b.total_value()) {
            best = Some(supplier);
        }
    }
    best.map(|s| BestSupplier {
        fornecedor: s.canonical_name().to_string(),
        total: s.total_value(),
    })
}

/// Drop the first `skip` entries and keep at most `limit` of the rest.
pub fn paginate<T>(items: Vec<T>, skip: usize, limit: Option<usize>) -> Vec<T> {
    let rest = items.into_iter().skip(skip);
    match limit {
        Some(limit) => rest.take(limit).collect(),
        None => rest.collect(),
    }
}

/// Metadata for one processed upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSummary {
    pub upload_id: Uuid,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub rows: usize,
    pub suppliers: usize,
}

impl UploadSummary {
    pub fn new(filename: impl Into<String>, suppliers: &[SupplierAggregate]) -> Self {
        Self {
            upload_id: Uuid::new_v4(),
            filename: filename.into(),
            timestamp: Utc::now(),
            rows: suppliers.iter().map(|s| s.line_items().len()).sum(),
            suppliers: suppliers.len(),
        }
    }
}
