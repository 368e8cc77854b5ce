/// Google Earth Engine REST API Client
///
/// Builds the whole query → mask → mosaic → reduce chain as one lazy
/// expression and hands it to the service only at export time. The export
/// creates a table resource under the project; its `getFeatures` URL is the
/// signed CSV download.
///
/// API Documentation: https://developers.google.com/earth-engine/reference/rest

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{PipelineError, Result};
use crate::ingest::expression::{self, Expr};
use crate::ingest::service::ImageryService;
use crate::model::{Aoi, CollectionQuery};
use crate::scl::SclMask;

// ============================================================================
// API Response Structures
// ============================================================================

/// Table resource returned by `projects.tables.create`.
#[derive(Debug, Deserialize)]
pub struct TableResponse {
    /// `projects/{project}/tables/{table_id}`
    pub name: String,
}

/// Google API error envelope.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

// ============================================================================
// Client
// ============================================================================

pub struct EarthEngineClient {
    http: reqwest::blocking::Client,
    base_url: String,
    project: String,
    access_token: String,
}

impl EarthEngineClient {
    pub fn new(
        http: reqwest::blocking::Client,
        base_url: &str,
        project: &str,
        access_token: &str,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            project: project.to_string(),
            access_token: access_token.to_string(),
        }
    }

    pub fn tables_url(&self) -> String {
        format!("{}/v1/projects/{}/tables", self.base_url, self.project)
    }

    /// Download URL of a created table.
    pub fn download_url(&self, table_name: &str) -> String {
        format!("{}/v1/{}:getFeatures", self.base_url, table_name)
    }
}

/// Request body for `projects.tables.create` with CSV output.
pub fn build_table_request(table: &Expr) -> Value {
    json!({
        "expression": table.to_graph(),
        "fileFormat": "CSV",
    })
}

/// Turn a non-2xx body into the most specific error available.
fn remote_error(status: u16, body: &str) -> PipelineError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => {
            let message = if parsed.error.status.is_empty() {
                parsed.error.message
            } else {
                format!("{}: {}", parsed.error.status, parsed.error.message)
            };
            PipelineError::Remote { status, message }
        }
        Err(_) if body.trim().is_empty() => PipelineError::HttpStatus(status),
        Err(_) => PipelineError::Remote { status, message: body.trim().to_string() },
    }
}

impl ImageryService for EarthEngineClient {
    type Collection = Expr;
    type Table = Expr;

    fn query(&self, query: &CollectionQuery) -> Result<Expr> {
        Ok(expression::filtered_collection(query))
    }

    fn apply_mask(&self, collection: Expr, mask: &SclMask) -> Result<Expr> {
        Ok(expression::masked(collection, mask))
    }

    fn mosaic_by_date(&self, collection: Expr) -> Result<Expr> {
        Ok(expression::daily_mosaics(collection))
    }

    fn reduce_means(&self, collection: Expr, aoi: &Aoi, scale_m: f64) -> Result<Expr> {
        Ok(expression::mean_features(collection, aoi, scale_m))
    }

    fn export_csv(&self, table: Expr) -> Result<String> {
        let response = self
            .http
            .post(self.tables_url())
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
            .json(&build_table_request(&table))
            .send()?;

        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(remote_error(status.as_u16(), &body));
        }

        let created: TableResponse = serde_json::from_str(&body)?;
        Ok(self.download_url(&created.name))
    }
}

// ============================================================================
// Tests
// ============================================================================
