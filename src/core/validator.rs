use crate::domain::model::{Batch, FieldWhitelists, Row, RowSet, TargetMonth};
use crate::domain::report::{IncompleteRow, OutOfWindow, RejectionReport};

/// Applies completeness, whitelist and month-window rules to a row set.
///
/// All rules are evaluated and reported together; the batch is accepted only
/// when none fires. There is no partial accept: one bad row rejects the whole
/// submission.
pub fn validate(
    row_set: &RowSet,
    expected_month: TargetMonth,
    whitelists: &FieldWhitelists,
) -> Result<Batch, RejectionReport> {
    let mut report = RejectionReport::new(expected_month);
    report.empty = row_set.is_empty();

    let mut rows = Vec::with_capacity(row_set.len());
    for row in &row_set.rows {
        let mut missing = Vec::new();
        if row.order_id.is_empty() {
            missing.push("order_id");
        }
        if row.provider.is_empty() {
            missing.push("provider");
        }
        if row.amount_minor_units.is_none() {
            missing.push("amount");
        }
        if row.country.is_empty() {
            missing.push("country");
        }
        if !missing.is_empty() {
            report.incomplete_rows.push(IncompleteRow {
                at: row.source.clone(),
                missing,
            });
        }

        match row.date {
            None => report.null_dates.push(row.source.clone()),
            Some(date) if !expected_month.contains(date) => {
                report.out_of_window.push(OutOfWindow {
                    at: row.source.clone(),
                    date,
                })
            }
            Some(_) => {}
        }

        if !row.provider.is_empty() && !whitelists.allows_provider(&row.provider) {
            report.unknown_providers.insert(row.provider.clone());
        }
        if !row.country.is_empty() && !whitelists.allows_country(&row.country) {
            report.unknown_countries.insert(row.country.clone());
        }

        if let (Some(date), Some(amount_minor_units)) = (row.date, row.amount_minor_units) {
            rows.push(Row {
                provider: row.provider.clone(),
                order_id: row.order_id.clone(),
                date,
                amount_minor_units,
                country: row.country.clone(),
            });
        }
    }

    if !report.is_clean() {
        tracing::warn!("Rejected submission for {}: {}", expected_month, report);
        return Err(report);
    }

    tracing::debug!("Validated {} row(s) for {}", rows.len(), expected_month);
    Ok(Batch::validated(expected_month, rows))
}
