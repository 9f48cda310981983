use crate::core::source::{RawSheet, RawSpreadsheet, SourceLayout};
use crate::domain::model::{NormalizedRow, RowSet, SourceRef};
use crate::utils::error::NormalizeError;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const REQUIRED_COLUMNS: [&str; 5] = ["order_id", "provider", "date", "amount", "country"];

/// What to do with amounts carrying more than two decimal places.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExcessPrecisionPolicy {
    /// 四捨五入到分（中間值遠離零）
    #[default]
    Round,
    Reject,
}

#[derive(Debug, Clone, Copy, Default)]
struct ColumnIndex {
    order_id: Option<usize>,
    provider: Option<usize>,
    date: Option<usize>,
    amount: Option<usize>,
    country: Option<usize>,
}

impl ColumnIndex {
    fn locate(headers: &[String]) -> Self {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase() == name)
        };
        Self {
            order_id: find("order_id"),
            provider: find("provider"),
            date: find("date"),
            amount: find("amount"),
            country: find("country"),
        }
    }

    fn has(&self, column: &str, labelled: bool) -> bool {
        match column {
            "order_id" => self.order_id.is_some(),
            // 活頁簿的供應商取自工作表名稱
            "provider" => labelled || self.provider.is_some(),
            "date" => self.date.is_some(),
            "amount" => self.amount.is_some(),
            "country" => self.country.is_some(),
            _ => false,
        }
    }
}

/// Turns raw sheets into one typed row set. Pure; never touches storage.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    excess_precision: ExcessPrecisionPolicy,
}

impl Normalizer {
    pub fn new(excess_precision: ExcessPrecisionPolicy) -> Self {
        Self { excess_precision }
    }

    pub fn normalize(&self, raw: &RawSpreadsheet) -> Result<RowSet, NormalizeError> {
        let indices: Vec<ColumnIndex> = raw
            .sheets
            .iter()
            .map(|sheet| ColumnIndex::locate(&sheet.headers))
            .collect();

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|column| {
                raw.sheets
                    .iter()
                    .zip(&indices)
                    .any(|(sheet, index)| !index.has(column, sheet.label.is_some()))
            })
            .map(|column| column.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(NormalizeError::MissingColumns(missing));
        }

        let mut rows = Vec::new();
        for (sheet, index) in raw.sheets.iter().zip(&indices) {
            for (i, cells) in sheet.rows.iter().enumerate() {
                let at = SourceRef {
                    sheet: sheet.label.clone(),
                    // 標題列佔第 1 列
                    row: i + 2,
                };
                rows.push(self.normalize_row(sheet, index, cells, at, raw.layout)?);
            }
        }

        tracing::debug!(
            "Normalized {} row(s) from {} sheet(s)",
            rows.len(),
            raw.sheets.len()
        );
        Ok(RowSet { rows })
    }

    fn normalize_row(
        &self,
        sheet: &RawSheet,
        index: &ColumnIndex,
        cells: &[String],
        at: SourceRef,
        layout: SourceLayout,
    ) -> Result<NormalizedRow, NormalizeError> {
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| cells.get(i))
                .map(|value| value.trim())
                .unwrap_or("")
        };

        let provider = match &sheet.label {
            Some(label) => label.trim().to_lowercase(),
            None => cell(index.provider).to_lowercase(),
        };
        let date = parse_date(cell(index.date), layout, &at)?;
        let amount_minor_units = self.parse_amount(cell(index.amount), layout, &at)?;

        Ok(NormalizedRow {
            provider,
            order_id: cell(index.order_id).to_string(),
            date,
            amount_minor_units,
            country: cell(index.country).to_string(),
            source: at,
        })
    }

    fn parse_amount(
        &self,
        value: &str,
        layout: SourceLayout,
        at: &SourceRef,
    ) -> Result<Option<i64>, NormalizeError> {
        if value.is_empty() {
            return Ok(None);
        }
        let failure = || NormalizeError::AmountParseFailure {
            at: at.clone(),
            value: value.to_string(),
        };

        if layout == SourceLayout::Canonical {
            return value.parse::<i64>().map(Some).map_err(|_| failure());
        }

        let amount = Decimal::from_str(value).map_err(|_| failure())?;
        if amount.normalize().scale() > 2 {
            match self.excess_precision {
                ExcessPrecisionPolicy::Reject => {
                    return Err(NormalizeError::ExcessPrecision {
                        at: at.clone(),
                        value: value.to_string(),
                    })
                }
                ExcessPrecisionPolicy::Round => {
                    tracing::warn!("Rounding amount {} at {} to two decimal places", value, at);
                }
            }
        }

        amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .map(|minor| minor.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|minor| minor.to_i64())
            .map(Some)
            .ok_or_else(failure)
    }
}

fn parse_date(
    value: &str,
    layout: SourceLayout,
    at: &SourceRef,
) -> Result<Option<NaiveDate>, NormalizeError> {
    if value.is_empty() {
        return Ok(None);
    }

    let (text, format, expected) = match layout {
        // 數值儲存格可能帶有 ".0"
        SourceLayout::Submission => (
            value.strip_suffix(".0").unwrap_or(value),
            "%Y%m%d",
            "YYYYMMDD",
        ),
        SourceLayout::Canonical => (value, "%Y-%m-%d", "YYYY-MM-DD"),
    };

    let well_formed = match layout {
        SourceLayout::Submission => text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()),
        SourceLayout::Canonical => text.len() == 10,
    };

    well_formed
        .then(|| NaiveDate::parse_from_str(text, format).ok())
        .flatten()
        .map(Some)
        .ok_or_else(|| NormalizeError::DateParseFailure {
            at: at.clone(),
            value: value.to_string(),
            expected,
        })
}
