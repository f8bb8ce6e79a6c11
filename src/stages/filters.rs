//! Filter-need classification and fuzzy resolution of filter values.

use crate::error::Result;
use crate::fuzzy_matcher::FuzzyMatcher;
use crate::literal::{extract_list, parse_literal, Literal};
use crate::pipeline::state::{render_columns, ColumnRef, FilterExpression, ResolvedFilter};
use crate::pipeline::StageContext;
use crate::prompts;
use tracing::{info, warn};

/// Ask the model whether the question names stored values.
pub async fn classify(ctx: &StageContext, columns: &[ColumnRef], query: &str) -> Result<Vec<Literal>> {
    info!("Filter Check Node: Analyzing {} columns", columns.len());
    let request = prompts::filter_check(&render_columns(columns), query);
    let response = ctx.call_model(&request).await?;
    let directives = parse_directives(&response);
    info!(
        "Filter Check Node: Filter needed = {}",
        needs_fuzzy_matching(&directives)
    );
    Ok(directives)
}

/// Parse the classifier answer. Anything unparseable means `["no"]`.
pub fn parse_directives(response: &str) -> Vec<Literal> {
    match parse_literal(response) {
        Ok(Literal::List(items)) => return items,
        Ok(other) => return vec![other],
        Err(_) => {}
    }
    match extract_list(response) {
        Ok(items) => items,
        Err(e) => {
            warn!(
                "Filter Check Node: Failed to parse response: {}, using default 'no' ({})",
                response, e
            );
            vec![Literal::Str("no".to_string())]
        }
    }
}

/// A single element, sentinel or not, never needs matching.
pub fn needs_fuzzy_matching(directives: &[Literal]) -> bool {
    directives.len() > 1
}

fn is_sentinel(literal: &Literal) -> bool {
    matches!(literal.as_str().map(|s| s.trim().to_lowercase()).as_deref(), Some("yes" | "no"))
}

/// Filter expressions carried by the directives. Sentinels are skipped and
/// malformed entries are dropped with a warning.
pub fn filter_expressions(directives: &[Literal]) -> Vec<FilterExpression> {
    directives
        .iter()
        .filter(|d| !is_sentinel(d))
        .filter_map(|directive| {
            let parsed = match directive {
                Literal::List(parts) => match parts.as_slice() {
                    [table, column, value] => Some((table, column, value)),
                    _ => None,
                },
                Literal::Dict(_) => match (
                    directive.get("table"),
                    directive.get("column"),
                    directive.get("value"),
                ) {
                    (Some(table), Some(column), Some(value)) => Some((table, column, value)),
                    _ => None,
                },
                _ => None,
            };
            match parsed {
                Some((table, column, value)) => Some(FilterExpression {
                    table: table.to_plain_string().trim().to_string(),
                    column: column.to_plain_string().trim().to_string(),
                    value: value.to_plain_string(),
                }),
                None => {
                    warn!("Ignoring malformed filter expression {}", directive);
                    None
                }
            }
        })
        .collect()
}

/// Resolve each filter value to the closest value stored in its column.
///
/// Filters whose column cannot be read, or with no candidate above the
/// threshold, are left out.
pub async fn resolve_filters(ctx: &StageContext, directives: &[Literal]) -> Result<Vec<ResolvedFilter>> {
    let matcher = FuzzyMatcher::new(ctx.config.fuzzy_threshold);
    let mut resolved = Vec::new();

    for expression in filter_expressions(directives) {
        let candidates = match ctx
            .store
            .distinct_values(&expression.table, &expression.column)
            .await
        {
            Ok(values) => values,
            Err(e) => {
                warn!(
                    "Could not read values of {}.{}: {}",
                    expression.table, expression.column, e
                );
                continue;
            }
        };

        match matcher.best_match(&expression.value, &candidates) {
            Some((matched, similarity)) => {
                info!(
                    "Matched '{}' -> '{}' in {}.{} ({:.2})",
                    expression.value, matched, expression.table, expression.column, similarity
                );
                resolved.push(ResolvedFilter {
                    table: expression.table,
                    column: expression.column,
                    requested: expression.value,
                    matched,
                    similarity,
                });
            }
            None => info!(
                "No value in {}.{} close to '{}'",
                expression.table, expression.column, expression.value
            ),
        }
    }

    info!("Fuzz Match Node: Matched {} filter values", resolved.len());
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_decision() {
        assert!(!needs_fuzzy_matching(&parse_directives("[\"no\"]")));
        assert!(!needs_fuzzy_matching(&parse_directives("[]")));
        assert!(!needs_fuzzy_matching(&parse_directives(
            "[['transactions', 'merchant', 'zomato']]"
        )));
        assert!(needs_fuzzy_matching(&parse_directives(
            "['yes', ['transactions', 'merchant', 'zomato']]"
        )));
    }

    #[test]
    fn test_parse_failure_means_no() {
        assert_eq!(parse_directives("hmm, not sure"), vec![Literal::Str("no".into())]);
        assert_eq!(parse_directives("```json\n'no'\n```"), vec![Literal::Str("no".into())]);
        assert_eq!(
            parse_directives("Answer: ['yes', ['budgets', 'category', 'Food']] done").len(),
            2
        );
    }

    #[test]
    fn test_filter_expressions_accept_lists_and_dicts() {
        let directives = parse_directives(
            "['yes', ['transactions', 'merchant', 'zomato'], {'table': 'budgets', 'column': 'category', 'value': 'food'}, ['bad'], 42]",
        );
        assert_eq!(
            filter_expressions(&directives),
            vec![
                FilterExpression {
                    table: "transactions".into(),
                    column: "merchant".into(),
                    value: "zomato".into()
                },
                FilterExpression {
                    table: "budgets".into(),
                    column: "category".into(),
                    value: "food".into()
                },
            ]
        );
    }
}
