pub mod charset;
pub mod config;
pub mod doc;
pub mod handler;
pub mod merge;
pub mod pipeline;
pub mod restriction;

pub use doc::{Content, Document, Metadata, Phase};
pub use handler::{Handler, HandlerError, Outcome};
pub use pipeline::{Pipeline, PipelineError, PipelineOutcome};
pub use restriction::{Restriction, Restrictions};
