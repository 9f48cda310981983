use crate::domain::model::TargetMonth;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "refund-recon")]
#[command(about = "Stage, confirm and load monthly refund reconciliation submissions")]
pub struct CliArgs {
    #[arg(long, global = true, default_value = "refund-recon.toml")]
    pub config: PathBuf,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    #[arg(long, global = true, help = "Print results as JSON")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Normalize, validate and stage a spreadsheet, then print a preview
    Submit {
        file: PathBuf,
        /// 目標月份 YYYYMM，預設為上個月
        #[arg(long)]
        month: Option<TargetMonth>,
    },
    /// Promote the staged artifact and load it into the warehouse
    Confirm {
        #[arg(long)]
        month: Option<TargetMonth>,
    },
    /// Retry the warehouse load of an already confirmed artifact
    Load {
        #[arg(long)]
        month: Option<TargetMonth>,
    },
    /// Delete everything under the staging prefix
    Cancel,
}

impl Command {
    pub fn month(&self) -> Option<TargetMonth> {
        match self {
            Command::Submit { month, .. } | Command::Confirm { month } | Command::Load { month } => *month,
            Command::Cancel => None,
        }
    }
}
