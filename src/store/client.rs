//! HTTP client wrapper for reading and enriching documents held in Qdrant.

use crate::config::Config;
use crate::store::{
    DocumentStore, DocumentStream,
    filters::build_eligibility_filter,
    scroller::stream_documents,
    types::{
        BatchUpdateResponse, BulkWriteFailure, BulkWriteReport, CountResponse, EligibilityFilter,
        FieldUpdate, ScanQuery, StoreError,
    },
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::{Map, Value, json};

/// Lightweight HTTP client for the Qdrant operations used by the pipeline.
pub struct QdrantStore {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) collection: String,
}

impl QdrantStore {
    /// Construct a client for `collection` on the Qdrant instance at `url`.
    pub fn new(
        url: &str,
        collection: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().user_agent("rusty-enrich/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(StoreError::InvalidUrl)?;
        let collection = collection.into();
        tracing::debug!(
            url = %base_url,
            collection = %collection,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
            collection,
        })
    }

    /// Construct a client from loaded configuration, optionally overriding the collection.
    pub fn from_config(config: &Config, collection: Option<&str>) -> Result<Self, StoreError> {
        Self::new(
            &config.qdrant_url,
            collection.unwrap_or(&config.qdrant_collection_name),
            config.qdrant_api_key.clone(),
        )
    }

    /// Name of the collection this store reads and writes.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn fail(&self, response: reqwest::Response, operation: &str) -> StoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = StoreError::UnexpectedStatus { status, body };
        tracing::error!(
            collection = %self.collection,
            operation,
            error = %error,
            "Qdrant request failed"
        );
        error
    }
}

#[async_trait]
impl DocumentStore for QdrantStore {
    fn scan(&self, query: ScanQuery) -> DocumentStream<'_> {
        Box::pin(stream_documents(self, query))
    }

    async fn count_matching(&self, filter: &EligibilityFilter) -> Result<u64, StoreError> {
        let body = json!({
            "filter": build_eligibility_filter(filter),
            "exact": true,
        });
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/count", self.collection),
            )
            .json(&body)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(self.fail(response, "count").await);
        }
        let CountResponse { result } = response.json().await?;
        Ok(result.count)
    }

    async fn bulk_upsert(&self, updates: Vec<FieldUpdate>) -> Result<BulkWriteReport, StoreError> {
        if updates.is_empty() {
            return Ok(BulkWriteReport::default());
        }

        let operations: Vec<Value> = updates
            .iter()
            .map(|update| {
                let mut payload = Map::new();
                payload.insert(update.field.clone(), update.value.clone());
                json!({
                    "set_payload": {
                        "payload": payload,
                        "points": [update.id.to_point_id()]
                    }
                })
            })
            .collect();

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/batch", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "operations": operations }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.fail(response, "bulk_upsert").await);
        }

        let BatchUpdateResponse { result } = response.json().await?;
        let mut report = BulkWriteReport::default();
        for (index, update) in updates.into_iter().enumerate() {
            match result.get(index).map(|outcome| outcome.status.as_str()) {
                Some("completed" | "acknowledged") => report.modified_count += 1,
                Some(status) => report.errors.push(BulkWriteFailure {
                    id: update.id,
                    message: format!("operation status {status}"),
                }),
                None => report.errors.push(BulkWriteFailure {
                    id: update.id,
                    message: "no operation result returned".into(),
                }),
            }
        }

        tracing::debug!(
            collection = %self.collection,
            modified = report.modified_count,
            failed = report.errors.len(),
            "Bulk payload update applied"
        );
        Ok(report)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

pub(crate) fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
