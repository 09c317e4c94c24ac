use std::sync::OnceLock;
use std::time::Duration;

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::json::LineDelimitedWriter;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue};
use sluice_schemas::ClickHouseConfig;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{ClickHouseError, Result};

const EXCEPTION_CODE_HEADER: &str = "X-ClickHouse-Exception-Code";

/// HTTP client bound to one ClickHouse database
#[derive(Debug, Clone)]
pub struct ClickHouseClient {
    http: reqwest::Client,
    url: Url,
    database: String,
}

impl ClickHouseClient {
    /// Create a client from the pipeline configuration, no request is sent
    pub fn new(config: &ClickHouseConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-ClickHouse-User",
            HeaderValue::from_str(config.username.as_str())
                .map_err(|_| ClickHouseError::InvalidIdentifier(config.username.clone()))?,
        );

        let mut key = HeaderValue::from_str(config.password.as_str())
            .map_err(|_| ClickHouseError::InvalidIdentifier("<password>".to_string()))?;
        key.set_sensitive(true);
        headers.insert("X-ClickHouse-Key", key);

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            http: builder.build()?,
            url: config.url.clone(),
            database: validate_identifier(config.database.as_str())?.to_string(),
        })
    }

    /// Health check against `/ping`
    pub async fn ping(&self) -> Result<()> {
        let url = self.url.join("ping")?;
        let response = self.http.get(url).send().await?;

        check_response(response).await.map(|_| ())
    }

    /// Run a statement that returns no rows (DDL and the like)
    #[instrument(skip(self, sql), err)]
    pub async fn command(&self, sql: &str) -> Result<()> {
        debug!("Sending command: {sql}");

        let response = self
            .http
            .post(self.endpoint(None)?)
            .body(sql.to_string())
            .send()
            .await?;

        check_response(response).await.map(|_| ())
    }

    /// Run a query and return the raw response body
    pub async fn query_text(&self, sql: &str) -> Result<String> {
        let response = self
            .http
            .post(self.endpoint(None)?)
            .body(sql.to_string())
            .send()
            .await?;

        check_response(response).await
    }

    /// Insert the named columns of `batch` into `table` in one request.
    ///
    /// Columns not listed are filled from the table defaults by the server.
    /// Parallel parsing is switched off for the request, so the server builds
    /// blocks by row count only and an insert below `max_insert_block_size`
    /// rows is applied as a whole or not at all. When the connection breaks
    /// after the body went out the server may still have committed the rows,
    /// that case is reported as [`ClickHouseError::InsertOutcomeUnknown`].
    #[instrument(skip(self, batch, column_names), fields(rows = batch.num_rows()), err)]
    pub async fn insert(
        &self,
        table: &str,
        column_names: &[&str],
        batch: &RecordBatch,
    ) -> Result<u64> {
        let table = validate_identifier(table)?;
        let body = json_each_row_body(batch, column_names)?;
        let rows = batch.num_rows() as u64;

        let query = format!(
            "INSERT INTO {table} ({}) FORMAT JSONEachRow",
            column_names.join(", ")
        );
        debug!("{query} ({} bytes)", body.len());

        let mut url = self.endpoint(Some(query.as_str()))?;
        url.query_pairs_mut()
            .append_pair("input_format_parallel_parsing", "0");

        let response = self
            .http
            .post(url)
            .body(body)
            .send()
            .await
            .map_err(|err| classify_send_error(rows, err))?;

        if response.status().is_success() {
            return Ok(rows);
        }

        Err(server_error(response).await)
    }

    fn endpoint(&self, query: Option<&str>) -> Result<Url> {
        let mut url = self.url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("database", self.database.as_str());
            if let Some(query) = query {
                pairs.append_pair("query", query);
            }
        }

        Ok(url)
    }
}

async fn check_response(response: reqwest::Response) -> Result<String> {
    if response.status().is_success() {
        return Ok(response.text().await?);
    }

    Err(server_error(response).await)
}

async fn server_error(response: reqwest::Response) -> ClickHouseError {
    let status = response.status();
    let header_code = response
        .headers()
        .get(EXCEPTION_CODE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u32>().ok());

    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => return ClickHouseError::Transport(err),
    };

    ClickHouseError::Server {
        status: status.as_u16(),
        code: header_code.or_else(|| parse_exception_code(body.as_str())),
        message: body.trim().to_string(),
    }
}

/// A request that never reached the server is safe to report as a plain transport failure
fn classify_send_error(rows: u64, err: reqwest::Error) -> ClickHouseError {
    if err.is_connect() || err.is_builder() {
        ClickHouseError::Transport(err)
    } else {
        ClickHouseError::InsertOutcomeUnknown {
            rows,
            source: Box::new(err),
        }
    }
}

/// Project `batch` onto `column_names` and encode it as `JSONEachRow` lines
pub fn json_each_row_body(batch: &RecordBatch, column_names: &[&str]) -> Result<Vec<u8>> {
    let indices = column_names
        .iter()
        .map(|name| {
            let name = validate_identifier(name)?;
            batch
                .schema()
                .index_of(name)
                .map_err(|_| ClickHouseError::MissingColumn(name.to_string()))
        })
        .collect::<Result<Vec<usize>>>()?;
    let projected = batch.project(&indices)?;

    let mut writer = LineDelimitedWriter::new(Vec::new());
    writer.write_batches(&[&projected])?;
    writer.finish()?;

    Ok(writer.into_inner())
}

/// Extract the numeric code from a `Code: 60. DB::Exception: ...` message
pub fn parse_exception_code(message: &str) -> Option<u32> {
    static CODE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = CODE_REGEX.get_or_init(|| Regex::new(r"Code:\s*(\d+)").expect("invalid regex"));

    regex
        .captures(message)
        .and_then(|captures| captures.get(1))
        .and_then(|code| code.as_str().parse::<u32>().ok())
}

/// Reject anything that is not a plain identifier
pub fn validate_identifier(name: &str) -> Result<&str> {
    static IDENT_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = IDENT_REGEX
        .get_or_init(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("invalid regex"));

    if regex.is_match(name) {
        Ok(name)
    } else {
        Err(ClickHouseError::InvalidIdentifier(name.to_string()))
    }
}
