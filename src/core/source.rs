use crate::utils::error::NormalizeError;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;
use std::path::Path;

/// How dates and amounts are written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLayout {
    /// 供應商上傳：日期 `YYYYMMDD`，金額為十進位主幣單位
    Submission,
    /// 暫存檔格式：日期 `YYYY-MM-DD`，金額為整數分
    Canonical,
}

/// One sheet of raw cells. `label` is the sheet name for workbooks and
/// `None` for flat files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSheet {
    pub label: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSpreadsheet {
    pub sheets: Vec<RawSheet>,
    pub layout: SourceLayout,
}

impl RawSpreadsheet {
    /// 依副檔名判斷是活頁簿還是 CSV
    pub fn from_upload(filename: &str, bytes: &[u8]) -> Result<Self, NormalizeError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        let sheets = match extension.as_deref() {
            Some("csv") => vec![read_csv_sheet(bytes)?],
            Some("xls" | "xlsx" | "xlsm" | "xlsb" | "ods") => read_workbook(bytes)?,
            _ => {
                return Err(NormalizeError::UnsupportedFormat {
                    filename: filename.to_string(),
                })
            }
        };

        tracing::debug!("Read {} sheet(s) from {}", sheets.len(), filename);
        Ok(Self {
            sheets,
            layout: SourceLayout::Submission,
        })
    }

    /// Reads a staged or confirmed artifact back.
    pub fn from_canonical_csv(bytes: &[u8]) -> Result<Self, NormalizeError> {
        Ok(Self {
            sheets: vec![read_csv_sheet(bytes)?],
            layout: SourceLayout::Canonical,
        })
    }
}

pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(v) => v.to_string(),
        // 整數值的浮點數顯示時不帶小數點，例如 20240315
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        Data::Bool(v) => v.to_string(),
        // 日期格式的儲存格轉成與提交檔相同的 `YYYYMMDD`，含 1904 日期系統
        Data::DateTime(v) if v.is_datetime() => v
            .as_datetime()
            .map(|dt| dt.format("%Y%m%d").to_string())
            .unwrap_or_else(|| v.to_string()),
        Data::DateTime(v) => v.to_string(),
        Data::DateTimeIso(v) => v.to_string(),
        Data::DurationIso(v) => v.to_string(),
        Data::Error(v) => format!("{v:?}"),
        Data::Empty => String::new(),
    }
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

fn read_workbook(bytes: &[u8]) -> Result<Vec<RawSheet>, NormalizeError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| NormalizeError::Workbook(e.to_string()))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| NormalizeError::Workbook(format!("sheet '{}': {}", name, e)))?;

        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            tracing::debug!("Skipping empty sheet '{}'", name);
            continue;
        };

        let headers = header.iter().map(cell_to_string).collect();
        let rows = rows
            .map(|r| r.iter().map(cell_to_string).collect::<Vec<_>>())
            .filter(|r| !is_blank(r))
            .collect();

        sheets.push(RawSheet {
            label: Some(name),
            headers,
            rows,
        });
    }

    Ok(sheets)
}

fn read_csv_sheet(bytes: &[u8]) -> Result<RawSheet, NormalizeError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let row: Vec<String> = record?.iter().map(str::to_string).collect();
        if !is_blank(&row) {
            rows.push(row);
        }
    }

    Ok(RawSheet {
        label: None,
        headers,
        rows,
    })
}
