//! Run configuration, loaded once at startup from the environment

use chrono::NaiveDate;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_OPEN_DATA_BASE_URL: &str = "https://data.cityofnewyork.us/resource";
pub const DEFAULT_CENSUS_BASE_URL: &str = "https://api.census.gov/data";
pub const DEFAULT_GAZETTEER_URL: &str = "https://download.geonames.org/export/zip/US.zip";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub open_data_token: Option<String>,
    pub census_key: Option<String>,
    pub open_data_base_url: String,
    pub census_base_url: String,
    pub census_year: i32,
    pub inspection_year: i32,
    pub inspection_type: String,
    pub inspection_limit: u64,
    pub covariate_limit: u64,
    pub gazetteer_url: String,
    pub gazetteer_path: Option<PathBuf>,
    pub temp_dir: PathBuf,
    pub output_path: PathBuf,
    pub request_timeout: Duration,
}

impl Config {
    /// Read configuration from the process environment.
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from any variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Config {
            open_data_token: get("NYC_OPEN_DATA_TOKEN"),
            census_key: get("CENSUS_API_KEY"),

            open_data_base_url: get("OPEN_DATA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPEN_DATA_BASE_URL.to_string()),

            census_base_url: get("CENSUS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_CENSUS_BASE_URL.to_string()),

            census_year: parse_var("CENSUS_YEAR", get("CENSUS_YEAR"), "year", 2022)?,
            inspection_year: parse_var("INSPECTION_YEAR", get("INSPECTION_YEAR"), "year", 2023)?,

            inspection_type: get("INSPECTION_TYPE").unwrap_or_else(|| "Initial".to_string()),

            inspection_limit: parse_var(
                "INSPECTION_LIMIT",
                get("INSPECTION_LIMIT"),
                "row count",
                1_000_000,
            )?,
            covariate_limit: parse_var(
                "COVARIATE_LIMIT",
                get("COVARIATE_LIMIT"),
                "row count",
                50_000,
            )?,

            gazetteer_url: get("GAZETTEER_URL").unwrap_or_else(|| DEFAULT_GAZETTEER_URL.to_string()),
            gazetteer_path: get("GAZETTEER_PATH").map(PathBuf::from),

            temp_dir: get("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("rodent_zip_dataset")),

            output_path: get("OUTPUT_PATH")
                .unwrap_or_else(|| "project_data.csv".to_string())
                .into(),

            request_timeout: Duration::from_secs(parse_var(
                "REQUEST_TIMEOUT_SECS",
                get("REQUEST_TIMEOUT_SECS"),
                "number of seconds",
                120,
            )?),
        };

        config.inspection_window()?;
        Ok(config)
    }

    /// Half-open `[Jan 1 of year, Jan 1 of next year)` date range for inspections
    pub fn inspection_window(&self) -> Result<(NaiveDate, NaiveDate), ConfigError> {
        let year = self.inspection_year;
        let bounds = year.checked_add(1).and_then(|next| {
            Some((
                NaiveDate::from_ymd_opt(year, 1, 1)?,
                NaiveDate::from_ymd_opt(next, 1, 1)?,
            ))
        });

        bounds.ok_or_else(|| ConfigError::Invalid {
            name: "INSPECTION_YEAR",
            expected: "calendar year",
            value: year.to_string(),
        })
    }
}

fn parse_var<T: FromStr>(
    name: &'static str,
    value: Option<String>,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value: raw,
        }),
    }
}
