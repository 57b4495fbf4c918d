use std::path::PathBuf;

use chrono::{Days, Local, NaiveDate};
use clap::Parser;
use log::kv::{ToValue, Value};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Parser, Debug, PartialEq)]
#[command(version, about = "Sync Nasdaq Data Link tables into Parquet on object storage")]
pub struct CliArgs {
    /// Optional TOML config file.
    #[arg(short, long)]
    pub config: Option<String>,

    /// The date to update for (YYYY-MM-DD). Defaults to T-1.
    #[arg(short, long, value_parser = parse_date)]
    pub date: Option<NaiveDate>,

    /// Directory holding the dataset YAML specs; overrides `schemas_dir`.
    #[arg(short, long)]
    pub schemas: Option<PathBuf>,

    /// Exit non-zero when any table failed to refresh.
    #[arg(long)]
    pub strict: bool,
}

impl CliArgs {
    pub fn as_of_date(&self) -> NaiveDate {
        self.date
            .unwrap_or_else(|| yesterday(Local::now().date_naive()))
    }
}

pub fn yesterday(today: NaiveDate) -> NaiveDate {
    today.checked_sub_days(Days::new(1)).unwrap_or(today)
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| format!("expected YYYY-MM-DD, got '{s}': {e}"))
}

impl ToValue for CliArgs {
    fn to_value(&self) -> Value<'_> {
        Value::from_debug(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = CliArgs::parse_from(["self", "--config", "foo", "--date", "2024-03-01"]);
        assert_eq!(
            args,
            CliArgs {
                config: Some("foo".to_string()),
                date: NaiveDate::from_ymd_opt(2024, 3, 1),
                schemas: None,
                strict: false,
            }
        );
        assert_eq!(args.as_of_date().to_string(), "2024-03-01");
    }

    #[test]
    fn test_args_reject_bad_date() {
        let res = CliArgs::try_parse_from(["self", "--date", "03/01/2024"]);
        assert!(res.is_err());
    }

    #[test]
    fn test_yesterday() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(yesterday(today).to_string(), "2024-02-29");
    }
}
