pub mod content;
pub mod metadata;

pub use content::Content;
pub use metadata::Metadata;

use serde::{Deserialize, Serialize};

/// Whether a document is still in its native format or already decoded to
/// plain UTF-8 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    PreParse,
    PostParse,
}

impl Phase {
    pub fn is_parsed(self) -> bool {
        matches!(self, Phase::PostParse)
    }
}

/// A document travelling through the pipeline. Owns its content and metadata
/// exclusively for the lifetime of its processing.
#[derive(Debug, Clone)]
pub struct Document {
    reference: String,
    content: Content,
    metadata: Metadata,
}

impl Document {
    pub fn new(reference: impl Into<String>, content: impl Into<Content>) -> Self {
        Self::with_metadata(reference, content, Metadata::new())
    }

    pub fn with_metadata(
        reference: impl Into<String>,
        content: impl Into<Content>,
        metadata: Metadata,
    ) -> Self {
        Self {
            reference: reference.into(),
            content: content.into(),
            metadata,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn set_content(&mut self, content: impl Into<Content>) {
        self.content = content.into();
    }

    /// Split borrow used while a handler runs.
    pub fn parts_mut(&mut self) -> (&str, &Content, &mut Metadata) {
        (&self.reference, &self.content, &mut self.metadata)
    }

    pub fn into_parts(self) -> (String, Content, Metadata) {
        (self.reference, self.content, self.metadata)
    }
}
