use crate::pipeline::state::{ColumnRef, DomainExtract};
use std::collections::{HashMap, HashSet};

/// Merge every domain's columns, following `domain_order`, and deduplicate.
pub fn aggregate_columns(
    domain_results: &HashMap<String, DomainExtract>,
    domain_order: &[String],
) -> Vec<ColumnRef> {
    let merged = domain_order
        .iter()
        .filter_map(|domain| domain_results.get(domain))
        .flat_map(|extract| extract.columns.iter().cloned());
    dedup_columns(merged)
}

/// Drop repeated columns by normalized `(table, column, description)`.
/// The first occurrence wins and order of first appearance is kept.
pub fn dedup_columns<I>(columns: I) -> Vec<ColumnRef>
where
    I: IntoIterator<Item = ColumnRef>,
{
    let mut seen = HashSet::new();
    columns
        .into_iter()
        .filter(|column| seen.insert(column.normalized_key()))
        .collect()
}
