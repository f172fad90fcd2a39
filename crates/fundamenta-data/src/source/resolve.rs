//! Resolution of vendor line items into canonical quarterly values.

use super::catalog::{FieldCatalog, FieldSpec, Statement};
use super::{LineItems, RawStatements};
use crate::calendar::quarter_of;
use crate::error::Result;
use chrono::NaiveDate;
use fundamenta_features::QuarterLabel;
use std::collections::{BTreeMap, BTreeSet};

/// Resolved values keyed by `(metric, quarter)`.
pub type QuarterValues = BTreeMap<(String, QuarterLabel), f64>;

/// Lowercase a label and drop everything that is not ASCII alphanumeric.
pub fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Find the row label that best matches a candidate list.
///
/// Tries exact candidates first, then a case/punctuation-insensitive match,
/// then any label containing one of `keywords` (shortest label wins, ties
/// broken alphabetically). Labels whose normalized form is in `claimed` are
/// skipped by the keyword stage.
pub fn find_line<'a>(
    items: &'a LineItems,
    candidates: &[String],
    keywords: &[String],
    claimed: &BTreeSet<String>,
) -> Option<&'a str> {
    for candidate in candidates {
        if let Some((label, _)) = items.get_key_value(candidate.as_str()) {
            return Some(label.as_str());
        }
    }

    let normalized: BTreeMap<String, &str> = items
        .keys()
        .map(|label| (normalize_label(label), label.as_str()))
        .collect();
    for candidate in candidates {
        if let Some(label) = normalized.get(&normalize_label(candidate)) {
            return Some(*label);
        }
    }

    if keywords.is_empty() {
        return None;
    }
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    items
        .keys()
        .filter(|label| !claimed.contains(&normalize_label(label)))
        .filter(|label| {
            let lower = label.to_lowercase();
            keywords.iter().any(|k| lower.contains(k.as_str()))
        })
        .min_by_key(|label| label.len())
        .map(String::as_str)
}

/// Finite observations of a row, sorted by period end.
fn observations(items: &LineItems, label: &str) -> Vec<(NaiveDate, f64)> {
    let mut points: Vec<(NaiveDate, f64)> = items
        .get(label)
        .map(|points| points.iter().copied().filter(|(_, v)| v.is_finite()).collect())
        .unwrap_or_default();
    points.sort_by_key(|(date, _)| *date);
    points
}

/// Resolves raw statements into `(metric, quarter) -> value`.
#[derive(Debug, Clone)]
pub struct FieldResolver {
    catalog: FieldCatalog,
    quarters: BTreeSet<QuarterLabel>,
    claimed: BTreeMap<String, BTreeSet<String>>,
}

impl FieldResolver {
    /// Resolver that keeps only values falling in `quarters`.
    ///
    /// A rule's keyword search never lands on a label that another metric
    /// lists as a candidate, so e.g. `Pretax Income` is not read as tax.
    pub fn new(catalog: FieldCatalog, quarters: &[QuarterLabel]) -> Self {
        let rules: Vec<&FieldSpec> = catalog
            .fields
            .iter()
            .chain([&catalog.pretax, &catalog.net_income])
            .collect();
        let mut claimed: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for spec in &rules {
            let others = rules
                .iter()
                .filter(|other| other.metric != spec.metric)
                .flat_map(|other| other.candidates.iter().map(|c| normalize_label(c)))
                .collect();
            claimed.insert(spec.metric.clone(), others);
        }
        Self {
            catalog,
            quarters: quarters.iter().copied().collect(),
            claimed,
        }
    }

    /// The catalog in use.
    pub const fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Quarters retained by [`resolve`](Self::resolve).
    pub const fn quarters(&self) -> &BTreeSet<QuarterLabel> {
        &self.quarters
    }

    /// Observation series for one rule, trying the fallback statement when
    /// the primary one has nothing.
    pub fn series(&self, statements: &RawStatements, spec: &FieldSpec) -> Vec<(NaiveDate, f64)> {
        let empty = BTreeSet::new();
        let claimed = self.claimed.get(&spec.metric).unwrap_or(&empty);
        let primary = statements.statement(spec.statement);
        let series = find_line(primary, &spec.candidates, &spec.keywords, claimed)
            .map(|label| observations(primary, label))
            .unwrap_or_default();
        if !series.is_empty() {
            return series;
        }
        match spec.fallback_statement {
            Some(statement) => {
                let items = statements.statement(statement);
                find_line(items, &spec.candidates, &spec.fallback_keywords, claimed)
                    .map(|label| observations(items, label))
                    .unwrap_or_default()
            }
            None => series,
        }
    }

    /// Pre-tax income minus net income on the dates both are reported.
    fn derived_tax(&self, statements: &RawStatements) -> Vec<(NaiveDate, f64)> {
        let pretax: BTreeMap<NaiveDate, f64> =
            self.series(statements, &self.catalog.pretax).into_iter().collect();
        if pretax.is_empty() {
            return Vec::new();
        }
        self.series(statements, &self.catalog.net_income)
            .into_iter()
            .filter_map(|(date, net)| pretax.get(&date).map(|p| (date, p - net)))
            .collect()
    }

    /// Resolve every catalog metric.
    ///
    /// Observations are applied in date order, so the latest period end
    /// within a quarter wins.
    ///
    /// # Errors
    /// Fails only when a period end cannot be mapped to a quarter.
    pub fn resolve(&self, statements: &RawStatements) -> Result<QuarterValues> {
        let mut values = QuarterValues::new();
        for spec in &self.catalog.fields {
            let mut series = self.series(statements, spec);
            if series.is_empty() && spec.metric == self.catalog.derived_tax_metric {
                series = self.derived_tax(statements);
                if !series.is_empty() {
                    tracing::debug!(metric = %spec.metric, points = series.len(), "derived from pretax and net income");
                }
            }
            for (date, value) in series {
                let quarter = quarter_of(date)?;
                if self.quarters.contains(&quarter) {
                    values.insert((spec.metric.clone(), quarter), value);
                }
            }
        }
        Ok(values)
    }
}

impl Statement {
    /// Name used in logs and cache keys.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    fn items(rows: &[(&str, &[(&str, f64)])]) -> LineItems {
        rows.iter()
            .map(|(label, points)| {
                (
                    (*label).to_string(),
                    points.iter().map(|(d, v)| (date(d), *v)).collect(),
                )
            })
            .collect()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    fn q(raw: &str) -> QuarterLabel {
        raw.parse().unwrap()
    }

    #[rstest]
    #[case("Total Revenue", "totalrevenue")]
    #[case("Income Tax (Benefit) Expense", "incometaxbenefitexpense")]
    #[case("Short/Long Term Debt", "shortlongtermdebt")]
    fn test_normalize_label(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_label(raw), expected);
    }

    #[test]
    fn test_exact_match_wins_in_candidate_order() {
        let rows = items(&[("Revenue", &[]), ("Total Revenue", &[])]);
        let found = find_line(&rows, &strings(&["Total Revenue", "Revenue"]), &[], &BTreeSet::new());
        assert_eq!(found, Some("Total Revenue"));
    }

    #[test]
    fn test_normalized_match() {
        let rows = items(&[("total_revenue", &[])]);
        let found = find_line(&rows, &strings(&["Total Revenue"]), &[], &BTreeSet::new());
        assert_eq!(found, Some("total_revenue"));
    }

    #[test]
    fn test_keyword_match_prefers_shortest() {
        let rows = items(&[
            ("Reconciled Cost Of Revenue", &[]),
            ("Cost Rev", &[]),
            ("Gross Profit", &[]),
        ]);
        let none = BTreeSet::new();
        let found = find_line(&rows, &strings(&["CostOfGoodsSold"]), &strings(&["cost"]), &none);
        assert_eq!(found, Some("Cost Rev"));
        assert_eq!(find_line(&rows, &strings(&["Nothing"]), &[], &none), None);

        let claimed: BTreeSet<String> = [normalize_label("Cost Rev")].into_iter().collect();
        let found = find_line(&rows, &[], &strings(&["cost"]), &claimed);
        assert_eq!(found, Some("Reconciled Cost Of Revenue"));
    }

    #[test]
    fn test_resolve_keeps_allowed_quarters_and_latest_date() {
        let statements = RawStatements {
            income: items(&[(
                "Total Revenue",
                &[
                    ("2024-06-30", 100.0),
                    ("2024-05-31", 90.0),
                    ("2023-12-31", 80.0),
                    ("2024-09-30", f64::NAN),
                ],
            )]),
            ..RawStatements::default()
        };
        let resolver = FieldResolver::new(FieldCatalog::default(), &[q("2024Q2"), q("2024Q3")]);
        let values = resolver.resolve(&statements).unwrap();

        assert_eq!(values.len(), 1);
        assert_relative_eq!(values[&("Revenue".to_string(), q("2024Q2"))], 100.0);
    }

    #[test]
    fn test_tax_derived_from_pretax_minus_net() {
        let statements = RawStatements {
            income: items(&[
                ("Pretax Income", &[("2024-03-31", 50.0), ("2024-06-30", 60.0)]),
                ("Net Income", &[("2024-03-31", 40.0)]),
            ]),
            ..RawStatements::default()
        };
        let resolver = FieldResolver::new(FieldCatalog::default(), &[q("2024Q1"), q("2024Q2")]);
        let values = resolver.resolve(&statements).unwrap();

        assert_relative_eq!(values[&("IncomeTaxExpense".to_string(), q("2024Q1"))], 10.0);
        assert!(!values.contains_key(&("IncomeTaxExpense".to_string(), q("2024Q2"))));
        assert_relative_eq!(values[&("NetIncome".to_string(), q("2024Q1"))], 40.0);
    }

    #[test]
    fn test_interest_falls_back_to_cash_flow() {
        let statements = RawStatements {
            cash_flow: items(&[("Interest Paid Supplemental Data", &[("2024-03-31", 7.0)])]),
            ..RawStatements::default()
        };
        let resolver = FieldResolver::new(FieldCatalog::default(), &[q("2024Q1")]);
        let values = resolver.resolve(&statements).unwrap();
        assert_relative_eq!(values[&("InterestExpense".to_string(), q("2024Q1"))], 7.0);
    }
}
