use encoding_rs::{Encoding, UTF_8};
use tokio_util::sync::CancellationToken;

use crate::charset::{CharsetDetector, SNIFF_LENGTH};
use crate::doc::{Content, Metadata, Phase};
use crate::handler::HandlerError;

/// Everything a handler body gets to see of the document it runs on.
pub struct HandlerContext<'a> {
    reference: &'a str,
    content: &'a Content,
    metadata: &'a mut Metadata,
    phase: Phase,
    cancel: &'a CancellationToken,
    charset_detector: &'a dyn CharsetDetector,
}

impl<'a> HandlerContext<'a> {
    pub fn new(
        reference: &'a str,
        content: &'a Content,
        metadata: &'a mut Metadata,
        phase: Phase,
        cancel: &'a CancellationToken,
        charset_detector: &'a dyn CharsetDetector,
    ) -> Self {
        Self {
            reference,
            content,
            metadata,
            phase,
            cancel,
            charset_detector,
        }
    }

    pub fn reference(&self) -> &str {
        self.reference
    }

    pub fn content(&self) -> &Content {
        self.content
    }

    pub fn metadata(&self) -> &Metadata {
        &*self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut *self.metadata
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        self.cancel
    }

    /// Effective content encoding: the handler's configured source charset,
    /// UTF-8 once parsed, otherwise whatever the charset detector decides.
    pub fn resolve_encoding(
        &self,
        source_charset: Option<&'static Encoding>,
    ) -> Result<&'static Encoding, HandlerError> {
        if let Some(encoding) = source_charset {
            return Ok(encoding);
        }
        if self.phase.is_parsed() {
            return Ok(UTF_8);
        }
        let head = self
            .content
            .read_prefix(SNIFF_LENGTH)
            .map_err(|e| self.io_error(e))?;
        Ok(self
            .charset_detector
            .detect(&head, self.metadata.declared_charset(), self.phase))
    }

    pub fn io_error(&self, source: std::io::Error) -> HandlerError {
        HandlerError::Io {
            reference: self.reference.to_string(),
            source,
        }
    }

    pub fn check_cancelled(&self) -> Result<(), HandlerError> {
        if self.cancel.is_cancelled() {
            return Err(HandlerError::Timeout {
                reference: self.reference.to_string(),
            });
        }
        Ok(())
    }
}
