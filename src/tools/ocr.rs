//! OCR Capability
//!
//! The extraction stage only sees raw recognized text; which engine produced
//! it is a gateway concern.

use async_trait::async_trait;
use std::collections::HashMap;

use super::ToolError;

/// Text recognition over a document location
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Extract raw text from the document at `s3_uri`
    async fn extract(&self, s3_uri: &str) -> Result<String, ToolError>;
}

/// Canned OCR output keyed by document URI.
///
/// Stands in for a real engine (Textract etc.) in demos and tests; unknown
/// URIs fall back to a clean sample document.
#[derive(Debug, Clone, Default)]
pub struct FixtureOcr {
    documents: HashMap<String, String>,
}

impl FixtureOcr {
    /// Sample recognized text for an ID card with full field coverage
    pub const SAMPLE_TEXT: &'static str = "Name: Ada Lovelace\nDOB: 1990-04-12\nAddress: 10 Bayes Rd, Cambridge\nID: SG1234567\nEmail: ada@example.com\nFace: YES";

    pub fn new() -> Self {
        Self::default()
    }

    /// Register canned text for a specific document URI
    pub fn with_document(mut self, s3_uri: impl Into<String>, text: impl Into<String>) -> Self {
        self.documents.insert(s3_uri.into(), text.into());
        self
    }
}

#[async_trait]
impl OcrEngine for FixtureOcr {
    async fn extract(&self, s3_uri: &str) -> Result<String, ToolError> {
        Ok(self
            .documents
            .get(s3_uri)
            .cloned()
            .unwrap_or_else(|| Self::SAMPLE_TEXT.to_string()))
    }
}
