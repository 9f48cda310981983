use crate::utils::error::{ReconError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// 暫存與確認檔案的欄位順序
pub const CANONICAL_COLUMNS: [&str; 5] = ["provider", "order_id", "date", "amount", "country"];

/// 對帳目標月份，文字格式為 `YYYYMM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetMonth {
    year: i32,
    month: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid target month '{0}' (expected YYYYMM)")]
pub struct ParseMonthError(pub String);

impl TargetMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1000..=9999).contains(&year) && (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// `year * 100 + month`
    pub fn as_number(&self) -> i64 {
        i64::from(self.year) * 100 + i64::from(self.month)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// The calendar month before `today`.
    ///
    /// January is refused: whether the batch belongs to December of the
    /// previous year has not been settled, so the caller must name the month.
    pub fn preceding(today: NaiveDate) -> Result<Self> {
        if today.month() == 1 {
            return Err(ReconError::AmbiguousTargetMonth { today });
        }
        Ok(Self {
            year: today.year(),
            month: today.month() - 1,
        })
    }
}

impl fmt::Display for TargetMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

impl FromStr for TargetMonth {
    type Err = ParseMonthError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseMonthError(s.to_string()));
        }
        let year = s[..4].parse().map_err(|_| ParseMonthError(s.to_string()))?;
        let month = s[4..].parse().map_err(|_| ParseMonthError(s.to_string()))?;
        Self::new(year, month).ok_or_else(|| ParseMonthError(s.to_string()))
    }
}

impl Serialize for TargetMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    Received,
    Validated,
    Rejected,
    Staged,
    Confirmed,
    Loaded,
    Cancelled,
}

impl BatchState {
    pub fn allowed_transitions(self) -> &'static [BatchState] {
        use BatchState::*;
        match self {
            Received => &[Validated, Rejected],
            Validated => &[Staged],
            Staged => &[Confirmed, Cancelled],
            Confirmed => &[Loaded],
            Rejected | Loaded | Cancelled => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn transition(self, to: BatchState) -> Result<BatchState> {
        if self.allowed_transitions().contains(&to) {
            Ok(to)
        } else {
            Err(ReconError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchState::Received => "RECEIVED",
            BatchState::Validated => "VALIDATED",
            BatchState::Rejected => "REJECTED",
            BatchState::Staged => "STAGED",
            BatchState::Confirmed => "CONFIRMED",
            BatchState::Loaded => "LOADED",
            BatchState::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// 原始資料中的位置（工作表名稱 + 1 起算的列號，含標題列）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceRef {
    pub sheet: Option<String>,
    pub row: usize,
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sheet {
            Some(sheet) => write!(f, "sheet '{}' row {}", sheet, self.row),
            None => write!(f, "row {}", self.row),
        }
    }
}

/// Normalizer output; empty cells stay `None` until validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRow {
    pub source: SourceRef,
    pub provider: String,
    pub order_id: String,
    pub date: Option<NaiveDate>,
    pub amount_minor_units: Option<i64>,
    pub country: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    pub rows: Vec<NormalizedRow>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub provider: String,
    pub order_id: String,
    pub date: NaiveDate,
    pub amount_minor_units: i64,
    pub country: String,
}

/// One submission's rows plus its lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    target_month: TargetMonth,
    rows: Vec<Row>,
    state: BatchState,
}

impl Batch {
    pub(crate) fn validated(target_month: TargetMonth, rows: Vec<Row>) -> Self {
        Self {
            target_month,
            rows,
            state: BatchState::Validated,
        }
    }

    pub fn target_month(&self) -> TargetMonth {
        self.target_month
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 產生下一個狀態的快照，原批次不變
    pub fn advance(self, to: BatchState) -> Result<Batch> {
        let state = self.state.transition(to)?;
        Ok(Batch { state, ..self })
    }
}

/// 外部提供、可版本化的白名單
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldWhitelists {
    providers: BTreeSet<String>,
    countries: BTreeSet<String>,
}

impl FieldWhitelists {
    pub fn new<P, C>(providers: P, countries: C) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        Self {
            providers: providers
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .collect(),
            countries: countries
                .into_iter()
                .map(|c| c.as_ref().trim().to_string())
                .collect(),
        }
    }

    pub fn allows_provider(&self, provider: &str) -> bool {
        self.providers.contains(provider)
    }

    pub fn allows_country(&self, country: &str) -> bool {
        self.countries.contains(country)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArtifact {
    pub bucket: String,
    pub key: String,
    pub uri: String,
    pub target_month: TargetMonth,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedArtifact {
    pub bucket: String,
    pub key: String,
    pub uri: String,
    pub target_month: TargetMonth,
}

/// 倉儲資料表識別：`[project.]dataset.table`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableId {
    pub project: Option<String>,
    pub dataset: String,
    pub table: String,
}

impl TableId {
    /// Names the table after the confirmed artifact's file stem.
    pub fn for_artifact(project: Option<&str>, dataset: &str, artifact: &ConfirmedArtifact) -> Self {
        let table = Path::new(&artifact.key)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&artifact.key)
            .to_string();
        Self {
            project: project.map(str::to_string),
            dataset: dataset.to_string(),
            table,
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(project) = &self.project {
            write!(f, "{}.", project)?;
        }
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

impl Serialize for TableId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub table: TableId,
    pub source_uri: String,
    pub job_id: String,
    pub rows_loaded: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewResult {
    pub target_month: TargetMonth,
    pub row_count: usize,
    pub rows: Vec<Row>,
    pub bucket: String,
    pub key: String,
    pub uri: String,
    pub state: BatchState,
}
