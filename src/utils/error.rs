use crate::domain::model::{BatchState, SourceRef, TargetMonth};
use crate::domain::report::RejectionReport;
use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;

/// 試算表正規化錯誤，使用者可自行修正
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Unsupported file format: {filename} (expected .csv or an Excel/ODS workbook)")]
    UnsupportedFormat { filename: String },

    #[error("Failed to read workbook: {0}")]
    Workbook(String),

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Cannot parse date '{value}' at {at} (expected {expected})")]
    DateParseFailure {
        at: SourceRef,
        value: String,
        expected: &'static str,
    },

    #[error("Cannot parse amount '{value}' at {at}")]
    AmountParseFailure { at: SourceRef, value: String },

    #[error("Amount '{value}' at {at} has more than two decimal places")]
    ExcessPrecision { at: SourceRef, value: String },
}

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Batch rejected: {0}")]
    Rejected(RejectionReport),

    #[error("No staged artifact for {target_month} (expected '{key}')")]
    NoStagedArtifact { target_month: TargetMonth, key: String },

    #[error("No confirmed artifact for {target_month} (expected '{key}')")]
    NoConfirmedArtifact { target_month: TargetMonth, key: String },

    #[error("Illegal batch transition {from} -> {to}")]
    InvalidTransition { from: BatchState, to: BatchState },

    #[error("Cannot derive the month preceding {today} without crossing a year boundary")]
    AmbiguousTargetMonth { today: NaiveDate },

    #[error("Storage operation on '{key}' failed: {message}")]
    Storage { key: String, message: String },

    #[error("Warehouse request failed: {message}")]
    Warehouse { message: String },

    #[error("Load job {job_id} into {table} failed: {message}")]
    Load {
        table: String,
        job_id: String,
        message: String,
    },

    #[error("Load job {job_id} into {table} did not finish within {waited:?}")]
    LoadTimeout {
        table: String,
        job_id: String,
        waited: Duration,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid configuration value for '{field}': '{value}' ({reason})")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfig { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 上傳內容有誤，修正檔案後重新提交
    Validation,
    /// 儲存或倉儲服務無法連線
    Infrastructure,
    /// 生命週期誤用，例如沒有暫存就確認
    State,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ReconError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ReconError::Normalize(_) | ReconError::Rejected(_) => ErrorCategory::Validation,
            ReconError::NoStagedArtifact { .. }
            | ReconError::NoConfirmedArtifact { .. }
            | ReconError::InvalidTransition { .. }
            | ReconError::AmbiguousTargetMonth { .. } => ErrorCategory::State,
            ReconError::Storage { .. }
            | ReconError::Warehouse { .. }
            | ReconError::Load { .. }
            | ReconError::LoadTimeout { .. }
            | ReconError::Http(_)
            | ReconError::Io(_)
            | ReconError::Csv(_) => ErrorCategory::Infrastructure,
            ReconError::Config { .. }
            | ReconError::InvalidConfigValue { .. }
            | ReconError::MissingConfig { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Validation | ErrorCategory::State => ErrorSeverity::High,
            ErrorCategory::Infrastructure => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            ReconError::Normalize(NormalizeError::MissingColumns(_)) => {
                "Every sheet needs the columns order_id, date, amount and country (plus provider in a flat CSV)".to_string()
            }
            ReconError::Normalize(NormalizeError::UnsupportedFormat { .. }) => {
                "Upload an .xlsx/.xls workbook with one sheet per provider, or a flat .csv".to_string()
            }
            ReconError::Normalize(_) => {
                "Fix the offending cell and submit the file again".to_string()
            }
            ReconError::Rejected(_) => {
                "Correct the listed rows or extend the whitelists, then submit again".to_string()
            }
            ReconError::NoStagedArtifact { .. } => {
                "Submit the spreadsheet for this month before confirming it".to_string()
            }
            ReconError::NoConfirmedArtifact { .. } => {
                "Nothing was confirmed for this month; run confirm instead of load".to_string()
            }
            ReconError::InvalidTransition {
                from: BatchState::Confirmed,
                ..
            } => "The artifact is already confirmed; retry the load only".to_string(),
            ReconError::InvalidTransition { .. } => {
                "Start a new submission for this month".to_string()
            }
            ReconError::AmbiguousTargetMonth { .. } => {
                "Pass the target month explicitly with --month YYYYMM".to_string()
            }
            ReconError::Load { .. } | ReconError::LoadTimeout { .. } => {
                "The artifact stays confirmed; inspect the warehouse job and retry the load only"
                    .to_string()
            }
            ReconError::Storage { .. } | ReconError::Io(_) => {
                "Check blob store connectivity and permissions, then retry".to_string()
            }
            ReconError::Warehouse { .. } | ReconError::Http(_) => {
                "Check warehouse connectivity and credentials, then retry".to_string()
            }
            ReconError::Csv(_) => "Report this failure; the staged CSV could not be written".to_string(),
            ReconError::Config { .. }
            | ReconError::InvalidConfigValue { .. }
            | ReconError::MissingConfig { .. } => {
                "Review the configuration file and environment variables".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ReconError::Rejected(report) => format!("The submission was rejected:\n{}", report),
            ReconError::Normalize(e) => format!("The spreadsheet could not be read: {}", e),
            ReconError::NoStagedArtifact { target_month, .. } => {
                format!("Nothing is staged for {}", target_month)
            }
            ReconError::Load { table, message, .. } => {
                format!("Loading into {} failed: {}", table, message)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_follow_taxonomy() {
        let missing = ReconError::from(NormalizeError::MissingColumns(vec!["country".into()]));
        assert_eq!(missing.category(), ErrorCategory::Validation);
        assert_eq!(missing.to_string(), "Normalization failed: Missing required columns: country");

        let month: TargetMonth = "202403".parse().unwrap();
        let no_staged = ReconError::NoStagedArtifact {
            target_month: month,
            key: "tmp/refund_payments_202403.csv".into(),
        };
        assert_eq!(no_staged.category(), ErrorCategory::State);
        assert_eq!(no_staged.severity(), ErrorSeverity::High);

        let storage = ReconError::Storage {
            key: "tmp/x.csv".into(),
            message: "timeout".into(),
        };
        assert_eq!(storage.category(), ErrorCategory::Infrastructure);
        assert_eq!(storage.severity(), ErrorSeverity::Medium);

        let config = ReconError::MissingConfig {
            field: "warehouse.project".into(),
        };
        assert_eq!(config.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_confirmed_transition_suggests_load_retry() {
        let err = ReconError::InvalidTransition {
            from: BatchState::Confirmed,
            to: BatchState::Confirmed,
        };
        assert!(err.recovery_suggestion().contains("retry the load"));
    }
}
