//! submit-core: FHIR submission assembly and outcome reconciliation
//!
//! This crate turns parsed assessment records into FHIR transaction bundles,
//! classifies the server's response as PASS or FAIL, and decodes failures
//! into section-addressed write-back instructions. It performs no I/O apart
//! from loading the element catalog.

pub mod assemble;
pub mod bundle;
pub mod catalog;
pub mod error;
pub mod evaluate;
pub mod identity;
pub mod operation;
pub mod outcome;
pub mod reconcile;
pub mod record;
pub mod xml;

pub use assemble::{AssemblerOptions, BundleAssembler};
pub use bundle::{Bundle, BundleEntry, BundleRequest, BundleType, HttpVerb};
pub use catalog::{CatalogEntry, ElementCatalog};
pub use error::{SubmitError, SubmitResult};
pub use evaluate::{
    ClassificationBasis, EmptyResponsePolicy, Evaluation, EvaluatorOptions, OutcomeEvaluator,
};
pub use identity::{
    IdOrigin, IdentityCache, IdentityResolver, NormalizedMetadata, ResolvedResource, ReturnedIds,
};
pub use operation::{Operation, ResourceKind};
pub use outcome::{Issue, IssueCoding, IssueSeverity};
pub use reconcile::{ErrorReconciler, WriteBackInstruction};
pub use record::{AssessmentType, Fields, ParsedRecord, RecordMetadata};
pub use xml::bundle_to_xml;
