//! Single-document call into the configured enricher.

use super::{EnrichmentResult, WorkItem};
use crate::enrichment::Enricher;
use crate::inference::InferenceError;

/// Reads a work item's input field and hands it to the enricher.
///
/// Faults are returned untouched; classification happens in the retry layer.
pub struct InferenceInvoker<'a> {
    enricher: &'a dyn Enricher,
}

impl<'a> InferenceInvoker<'a> {
    /// Wrap `enricher`.
    pub fn new(enricher: &'a dyn Enricher) -> Self {
        Self { enricher }
    }

    /// Input text for `item`.
    ///
    /// A blank field yields the enricher's fallback input, or [`InferenceError::MissingInput`]
    /// when it has none.
    pub fn input<'d>(&self, item: &'d WorkItem) -> Result<&'d str, InferenceError> {
        let field = self.enricher.input_field();
        item.document
            .text_field(field)
            .or_else(|| self.enricher.input_fallback())
            .ok_or_else(|| InferenceError::MissingInput {
                field: field.to_string(),
            })
    }

    /// Enrich `item` once.
    pub async fn invoke(&self, item: &WorkItem) -> Result<EnrichmentResult, InferenceError> {
        let input = self.input(item)?;
        let value = self.enricher.enrich(input).await?;
        Ok(EnrichmentResult {
            id: item.document.id.clone(),
            value,
        })
    }
}
