//! Streaming helpers for iterating Qdrant scroll endpoints without manual loops.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::Method;
use serde_json::{Value, json};
use tokio::time::Instant;

use super::client::QdrantStore;
use super::filters::build_eligibility_filter;
use super::types::{Document, DocumentId, ScanQuery, ScrollResponse, StoreError};

/// Stream eligible documents ascending by point id using the scroll API.
///
/// Qdrant scroll offsets are inclusive, so a resumed scan starts at the checkpoint and drops
/// every id at or below it. The scan expires once it has been open for
/// `query.max_scan_duration`; the next page request then yields
/// [`StoreError::ScanInvalidated`] instead of data.
pub fn stream_documents(
    store: &QdrantStore,
    query: ScanQuery,
) -> impl Stream<Item = Result<Document, StoreError>> + Send + '_ {
    try_stream! {
        let opened_at = Instant::now();
        let filter_body = build_eligibility_filter(&query.filter);
        let floor = query.exclude_up_to.clone();
        let mut offset: Option<Value> = floor.as_ref().map(DocumentId::to_point_id);
        let path = format!("collections/{}/points/scroll", store.collection);

        loop {
            let elapsed = opened_at.elapsed();
            if elapsed >= query.max_scan_duration {
                tracing::warn!(
                    collection = %store.collection,
                    ?elapsed,
                    "Scan exceeded its maximum duration"
                );
                Err(StoreError::ScanInvalidated { elapsed })?;
            }

            let body = json!({
                "with_payload": true,
                "with_vector": false,
                "limit": query.batch_size,
                "filter": filter_body.clone(),
                "offset": offset.clone().unwrap_or(Value::Null),
            });

            let response = store.request(Method::POST, &path).json(&body).send().await?;

            let status = response.status();
            if status.is_success() {
                let ScrollResponse { result } = response.json().await?;
                for point in result.points {
                    let id = DocumentId::from_point_id(&point.id)?;
                    if let Some(floor) = &floor
                        && id <= *floor
                    {
                        continue;
                    }
                    yield Document {
                        id,
                        payload: point.payload.unwrap_or_default(),
                    };
                }

                match result.next_page_offset {
                    Some(next) if !next.is_null() => offset = Some(next),
                    _ => break,
                }
            } else {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(
                    collection = %store.collection,
                    status = %status,
                    "Failed to scroll documents via stream"
                );
                Err(StoreError::UnexpectedStatus { status, body })?;
            }
        }
    }
}
