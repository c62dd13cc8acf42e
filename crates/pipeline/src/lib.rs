//! # IAM Pipeline
//!
//! Infers a least-privilege AWS IAM policy from repository source files:
//!
//! 1. [`RelevanceFilter`] ranks files against a fixed SDK-usage query
//! 2. [`FileExtractor`] asks the model which services, then which calls, each file uses
//! 3. [`validate_calls`] drops actions the [`iam_catalog::ActionCatalog`] does not list
//! 4. [`StatementAggregator`] merges calls into one statement per resource
//! 5. [`PolicyRefiner`] tidies the draft without widening it
//!
//! [`PolicyPipeline`] runs all five.

mod aggregator;
mod error;
mod extractor;
pub mod limits;
mod pipeline;
pub mod prompts;
mod refiner;
mod relevance;
mod validator;

#[cfg(test)]
mod testing;

pub use aggregator::{aggregate, StatementAggregator};
pub use error::{PipelineError, Result};
pub use extractor::{FileExtractor, SdkCalls, ServiceNames};
pub use pipeline::{PipelineConfig, PipelineReport, PolicyOutcome, PolicyPipeline};
pub use refiner::{
    constrain_to_draft, has_placeholder, replace_placeholders, OneOrMany, PolicyDocument,
    PolicyRefiner, PolicyStatement, RefinedPolicyDocument,
};
pub use relevance::{
    render_document, RelevanceFilter, DEFAULT_RELEVANCE_THRESHOLD, DEFAULT_TOP_N, RELEVANCE_QUERY,
};
pub use validator::{is_valid_action, validate_calls, RejectedCall, ValidatedCalls};
