//! Fetch functions - retrieve raw rows from the open-data and census APIs

use crate::config::{Config, ConfigError};
use crate::ingestion::error::FetchError;
use crate::ingestion::parse;
use crate::ingestion::types::{FacilityKind, RegressionInputs, Rows};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

pub const INSPECTIONS_DATASET: &str = "p937-wjvj";
pub const GARAGES_DATASET: &str = "xw3j-2yxf";
pub const FOOD_SCRAP_DATASET: &str = "if26-z6xq";
pub const LITTER_BASKETS_DATASET: &str = "8znf-7b2c";
pub const PARKS_DATASET: &str = "enfh-gkve";

/// One GET against a tabular endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRequest {
    /// Label used in logs and error messages
    pub dataset: String,
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl SourceRequest {
    pub fn new(dataset: impl Into<String>, url: impl Into<String>) -> Self {
        SourceRequest {
            dataset: dataset.into(),
            url: url.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }
}

/// Anything that can answer a request with a JSON array of rows
#[async_trait]
pub trait TabularSource {
    async fn fetch(&self, request: &SourceRequest) -> Result<Rows, FetchError>;
}

/// reqwest-backed source shared by every dataset
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.open_data_token {
            headers.insert("X-App-Token", HeaderValue::from_str(token)?);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(HttpSource { client })
    }
}

#[async_trait]
impl TabularSource for HttpSource {
    async fn fetch(&self, request: &SourceRequest) -> Result<Rows, FetchError> {
        info!("Fetching {} from {}", request.dataset, request.url);
        debug!("Query parameters: {:?}", request.params);

        let request_error = |error: reqwest::Error| FetchError::Request {
            dataset: request.dataset.clone(),
            url: request.url.clone(),
            error,
        };

        let response = self
            .client
            .get(&request.url)
            .query(&request.params)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                dataset: request.dataset.clone(),
                url: request.url.clone(),
                status,
            });
        }

        let body = response.bytes().await.map_err(request_error)?;
        let rows = rows_from_body(&request.dataset, &body)?;

        info!("Fetched {} {} rows", rows.len(), request.dataset);
        Ok(rows)
    }
}

/// Decode a response body that must be a JSON array
pub fn rows_from_body(dataset: &str, body: &[u8]) -> Result<Rows, FetchError> {
    let malformed = |detail: String| FetchError::Malformed {
        dataset: dataset.to_string(),
        detail,
    };

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Array(rows)) => Ok(rows),
        Ok(other) => Err(malformed(format!("expected a JSON array, got {}", kind_of(&other)))),
        Err(e) => Err(malformed(e.to_string())),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn open_data_url(config: &Config, dataset_id: &str) -> String {
    format!(
        "{}/{}.json",
        config.open_data_base_url.trim_end_matches('/'),
        dataset_id
    )
}

/// Initial inspections for one calendar year
pub fn inspections_request(config: &Config) -> Result<SourceRequest, ConfigError> {
    let (start, end) = config.inspection_window()?;
    let stamp = "%Y-%m-%dT00:00:00";

    let filter = format!(
        "inspection_date >= '{}' AND inspection_date < '{}' AND inspection_type='{}'",
        start.format(stamp),
        end.format(stamp),
        config.inspection_type.replace('\'', "''"),
    );

    Ok(
        SourceRequest::new("inspections", open_data_url(config, INSPECTIONS_DATASET))
            .param("$limit", config.inspection_limit)
            .param("$where", filter)
            .param("$select", "zip_code,inspection_date,inspection_type"),
    )
}

/// ACS 5-year total population for every ZCTA
pub fn population_request(config: &Config) -> SourceRequest {
    let url = format!(
        "{}/{}/acs/acs5",
        config.census_base_url.trim_end_matches('/'),
        config.census_year
    );

    let request = SourceRequest::new("population", url)
        .param("get", "NAME,B01003_001E")
        .param("for", "zip code tabulation area:*");

    match &config.census_key {
        Some(key) => request.param("key", key),
        None => request,
    }
}

/// Covariate datasets are fetched whole, up to the row limit
pub fn facility_request(config: &Config, kind: FacilityKind) -> SourceRequest {
    let dataset_id = match kind {
        FacilityKind::Garage => GARAGES_DATASET,
        FacilityKind::Dropoff => FOOD_SCRAP_DATASET,
        FacilityKind::LitterBasket => LITTER_BASKETS_DATASET,
        FacilityKind::Park => PARKS_DATASET,
    };

    SourceRequest::new(kind.to_string(), open_data_url(config, dataset_id))
        .param("$limit", config.covariate_limit)
}

/// Fetch and parse every source, one after another. The first failure aborts.
pub async fn fetch_all<S: TabularSource + ?Sized>(
    source: &S,
    config: &Config,
) -> Result<RegressionInputs> {
    let request = inspections_request(config)?;
    let rows = source.fetch(&request).await?;
    let inspections = parse::parse_inspections(&rows);

    let rows = source.fetch(&population_request(config)).await?;
    let population = parse::parse_population(&rows)?;

    let rows = source.fetch(&facility_request(config, FacilityKind::Garage)).await?;
    let garages = parse::parse_garages(&rows);

    let rows = source.fetch(&facility_request(config, FacilityKind::Dropoff)).await?;
    let dropoffs = parse::parse_dropoffs(&rows);

    let rows = source
        .fetch(&facility_request(config, FacilityKind::LitterBasket))
        .await?;
    let litter_baskets = parse::parse_litter_baskets(&rows);

    let rows = source.fetch(&facility_request(config, FacilityKind::Park)).await?;
    let parks = parse::parse_parks(&rows);

    info!(
        "Fetched {} inspections, {} population rows and {} facility rows",
        inspections.len(),
        population.len(),
        garages.len() + dropoffs.len() + litter_baskets.len() + parks.len()
    );

    Ok(RegressionInputs {
        inspections,
        population,
        garages,
        dropoffs,
        litter_baskets,
        parks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> Config {
        let vars: HashMap<&str, String> = [
            ("OPEN_DATA_BASE_URL", base_url.to_string()),
            ("CENSUS_BASE_URL", format!("{}/census", base_url)),
            ("NYC_OPEN_DATA_TOKEN", "token-123".to_string()),
        ]
        .into_iter()
        .collect();
        Config::from_lookup(|name| vars.get(name).cloned()).unwrap()
    }

    /// Serves canned rows by dataset label and records what was asked for
    struct StaticSource {
        rows: HashMap<String, Rows>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TabularSource for StaticSource {
        async fn fetch(&self, request: &SourceRequest) -> Result<Rows, FetchError> {
            self.seen.lock().unwrap().push(request.dataset.clone());
            self.rows
                .get(&request.dataset)
                .cloned()
                .ok_or_else(|| FetchError::Malformed {
                    dataset: request.dataset.clone(),
                    detail: "no canned rows".to_string(),
                })
        }
    }

    #[test]
    fn test_inspections_request() {
        let request = inspections_request(&test_config("https://example.org/resource")).unwrap();

        assert_eq!(request.url, "https://example.org/resource/p937-wjvj.json");
        assert!(request
            .params
            .contains(&("$limit".to_string(), "1000000".to_string())));
        assert!(request.params.contains(&(
            "$where".to_string(),
            "inspection_date >= '2023-01-01T00:00:00' AND inspection_date < '2024-01-01T00:00:00' AND inspection_type='Initial'".to_string()
        )));
    }

    #[test]
    fn test_inspections_request_rejects_unrepresentable_year() {
        let mut config = test_config("https://example.org/resource");
        config.inspection_year = i32::MAX;

        let err = inspections_request(&config).unwrap_err();
        assert!(err.to_string().contains("INSPECTION_YEAR"));
    }

    #[test]
    fn test_population_request_key_is_optional() {
        let mut config = test_config("https://example.org");
        let request = population_request(&config);
        assert_eq!(request.url, "https://example.org/census/2022/acs/acs5");
        assert!(!request.params.iter().any(|(k, _)| k == "key"));

        config.census_key = Some("census-key".to_string());
        let request = population_request(&config);
        assert!(request
            .params
            .contains(&("key".to_string(), "census-key".to_string())));
    }

    #[test]
    fn test_rows_from_body_rejects_non_arrays() {
        assert_eq!(rows_from_body("parks", b"[{\"a\":1}]").unwrap().len(), 1);

        let err = rows_from_body("parks", b"{\"error\":true}").unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
        assert!(err.to_string().starts_with("parks:"));

        let err = rows_from_body("parks", b"<html>").unwrap_err();
        assert_eq!(err.dataset(), "parks");
    }

    #[tokio::test]
    async fn test_http_source_sends_token_and_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/xw3j-2yxf.json"))
            .and(query_param("$limit", "50000"))
            .and(header("X-App-Token", "token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"zip": "10001"}])))
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let source = HttpSource::new(&config).unwrap();
        let rows = source
            .fetch(&facility_request(&config, FacilityKind::Garage))
            .await
            .unwrap();

        assert_eq!(rows, vec![json!({"zip": "10001"})]);
    }

    #[tokio::test]
    async fn test_http_source_status_error_names_dataset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/enfh-gkve.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let source = HttpSource::new(&config).unwrap();
        let err = source
            .fetch(&facility_request(&config, FacilityKind::Park))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { .. }));
        assert_eq!(err.dataset(), "parks");
    }

    #[tokio::test]
    async fn test_fetch_all_runs_every_source_in_order() {
        let rows: HashMap<String, Rows> = [
            ("inspections", json!([{"zip_code": "10001"}, {"zip_code": "10002"}])),
            (
                "population",
                json!([
                    ["NAME", "B01003_001E", "zip code tabulation area"],
                    ["ZCTA5 10001", "21000", "10001"]
                ]),
            ),
            ("garages", json!([{"zip": "10001"}])),
            ("food scrap drop-offs", json!([])),
            ("litter baskets", json!([])),
            ("parks", json!([{"zipcode": "10001", "acres": "1.5"}])),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.as_array().unwrap().clone()))
        .collect();

        let source = StaticSource {
            rows,
            seen: Mutex::new(Vec::new()),
        };
        let inputs = fetch_all(&source, &test_config("https://example.org"))
            .await
            .unwrap();

        assert_eq!(inputs.inspections.len(), 2);
        assert_eq!(inputs.population.len(), 1);
        assert_eq!(inputs.garages.len(), 1);
        assert_eq!(inputs.parks.len(), 1);
        assert_eq!(
            *source.seen.lock().unwrap(),
            vec![
                "inspections",
                "population",
                "garages",
                "food scrap drop-offs",
                "litter baskets",
                "parks"
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_all_aborts_on_first_failure() {
        let source = StaticSource {
            rows: HashMap::new(),
            seen: Mutex::new(Vec::new()),
        };

        let err = fetch_all(&source, &test_config("https://example.org"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("inspections"));
        assert_eq!(*source.seen.lock().unwrap(), vec!["inspections"]);
    }

    #[tokio::test]
    async fn test_fetch_all_bad_year_fetches_nothing() {
        let source = StaticSource {
            rows: HashMap::new(),
            seen: Mutex::new(Vec::new()),
        };
        let mut config = test_config("https://example.org");
        config.inspection_year = 300_000;

        let err = fetch_all(&source, &config).await.unwrap_err();

        assert!(err.to_string().contains("INSPECTION_YEAR"));
        assert!(source.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore] // Ignore by default since it hits real API
    async fn test_fetch_live_garages() {
        let config = Config::from_lookup(|_| None).unwrap();
        let source = HttpSource::new(&config).unwrap();

        let rows = source
            .fetch(&facility_request(&config, FacilityKind::Garage))
            .await
            .unwrap();
        assert!(!rows.is_empty());
    }
}
