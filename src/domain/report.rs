use crate::domain::model::{SourceRef, TargetMonth};
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;

/// 報告中每一類最多列出的位置數
const MAX_LISTED: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteRow {
    pub at: SourceRef,
    pub missing: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutOfWindow {
    pub at: SourceRef,
    pub date: NaiveDate,
}

/// Every reason a row set was refused, collected in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectionReport {
    pub target_month: TargetMonth,
    pub empty: bool,
    pub incomplete_rows: Vec<IncompleteRow>,
    pub null_dates: Vec<SourceRef>,
    pub out_of_window: Vec<OutOfWindow>,
    pub unknown_providers: BTreeSet<String>,
    pub unknown_countries: BTreeSet<String>,
}

impl RejectionReport {
    pub fn new(target_month: TargetMonth) -> Self {
        Self {
            target_month,
            empty: false,
            incomplete_rows: Vec::new(),
            null_dates: Vec::new(),
            out_of_window: Vec::new(),
            unknown_providers: BTreeSet::new(),
            unknown_countries: BTreeSet::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        !self.empty
            && self.incomplete_rows.is_empty()
            && self.null_dates.is_empty()
            && self.out_of_window.is_empty()
            && self.unknown_providers.is_empty()
            && self.unknown_countries.is_empty()
    }
}

fn write_listed<T, F>(f: &mut fmt::Formatter<'_>, items: &[T], mut render: F) -> fmt::Result
where
    F: FnMut(&T) -> String,
{
    let shown: Vec<String> = items.iter().take(MAX_LISTED).map(&mut render).collect();
    write!(f, "{}", shown.join(", "))?;
    if items.len() > MAX_LISTED {
        write!(f, " and {} more", items.len() - MAX_LISTED)?;
    }
    Ok(())
}

fn join_set(values: &BTreeSet<String>) -> String {
    values
        .iter()
        .map(|v| format!("'{}'", v))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for RejectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target month {}", self.target_month)?;
        if self.empty {
            write!(f, "\n  - the submission contains no rows")?;
        }
        if !self.null_dates.is_empty() {
            write!(f, "\n  - {} row(s) without a date: ", self.null_dates.len())?;
            write_listed(f, &self.null_dates, |at| at.to_string())?;
        }
        if !self.out_of_window.is_empty() {
            write!(
                f,
                "\n  - {} row(s) dated outside {}: ",
                self.out_of_window.len(),
                self.target_month
            )?;
            write_listed(f, &self.out_of_window, |o| format!("{} ({})", o.at, o.date))?;
        }
        if !self.incomplete_rows.is_empty() {
            write!(f, "\n  - {} incomplete row(s): ", self.incomplete_rows.len())?;
            write_listed(f, &self.incomplete_rows, |r| {
                format!("{} missing {}", r.at, r.missing.join("/"))
            })?;
        }
        if !self.unknown_providers.is_empty() {
            write!(f, "\n  - unknown providers: {}", join_set(&self.unknown_providers))?;
        }
        if !self.unknown_countries.is_empty() {
            write!(f, "\n  - unknown countries: {}", join_set(&self.unknown_countries))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_summarises_each_category() {
        let mut report = RejectionReport::new("202403".parse().unwrap());
        assert!(report.is_clean());

        report.unknown_providers.insert("venmo".into());
        report.unknown_countries.insert("XX".into());
        for row in 2..10 {
            report.null_dates.push(SourceRef { sheet: None, row });
        }
        assert!(!report.is_clean());

        let text = report.to_string();
        assert!(text.starts_with("target month 202403"));
        assert!(text.contains("8 row(s) without a date: row 2, row 3, row 4, row 5, row 6 and 3 more"));
        assert!(text.contains("unknown providers: 'venmo'"));
        assert!(text.contains("unknown countries: 'XX'"));
    }
}
