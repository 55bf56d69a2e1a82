//! Sequential submission pipeline
//!
//! One record at a time: resolve identity, assemble, submit, evaluate, then
//! write back. The identity cache is owned by the pipeline and lives for the
//! whole batch. Persistence failures are logged and never change a record's
//! classification.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use submit_core::{
    AssemblerOptions, BundleAssembler, ElementCatalog, ErrorReconciler, EvaluatorOptions,
    IdentityCache, IdentityResolver, OutcomeEvaluator, ParsedRecord, RecordMetadata, ReturnedIds,
    WriteBackInstruction, bundle_to_xml,
};

use crate::client::Submitter;
use crate::db::{PersistenceGateway, SubmittedIds};
use crate::error::RunnerError;
use crate::metrics;

/// A parsed record together with its submission metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub record: ParsedRecord,
    #[serde(default)]
    pub metadata: RecordMetadata,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    Many(Vec<SubmissionRecord>),
    One(Box<SubmissionRecord>),
}

impl SubmissionRecord {
    /// Read a JSON file holding one record or an array of records
    pub fn load(path: &Path) -> Result<Vec<SubmissionRecord>, RunnerError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn from_json_str(json: &str) -> Result<Vec<SubmissionRecord>, RunnerError> {
        Ok(match serde_json::from_str(json)? {
            RecordFile::Many(records) => records,
            RecordFile::One(record) => vec![*record],
        })
    }
}

/// Final classification of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Passed {
        record_id: String,
        returned: ReturnedIds,
    },
    Failed {
        record_id: String,
        notes: usize,
    },
    /// Validation failed before anything was submitted
    Rejected { record_id: String, reason: String },
    /// The submission never produced a response
    TransportError { record_id: String, reason: String },
}

impl RecordOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RecordOutcome::Passed { .. } => "pass",
            RecordOutcome::Failed { .. } => "fail",
            RecordOutcome::Rejected { .. } => "rejected",
            RecordOutcome::TransportError { .. } => "transport_error",
        }
    }

    pub fn record_id(&self) -> &str {
        match self {
            RecordOutcome::Passed { record_id, .. }
            | RecordOutcome::Failed { record_id, .. }
            | RecordOutcome::Rejected { record_id, .. }
            | RecordOutcome::TransportError { record_id, .. } => record_id,
        }
    }
}

/// Counts for one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub passed: usize,
    pub failed: usize,
    pub rejected: usize,
    pub transport_errors: usize,
    /// Records not started because the run was cancelled
    pub skipped: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &RecordOutcome) {
        self.processed += 1;
        match outcome {
            RecordOutcome::Passed { .. } => self.passed += 1,
            RecordOutcome::Failed { .. } => self.failed += 1,
            RecordOutcome::Rejected { .. } => self.rejected += 1,
            RecordOutcome::TransportError { .. } => self.transport_errors += 1,
        }
    }
}

pub struct Pipeline<S, G> {
    catalog: ElementCatalog,
    assembler: BundleAssembler,
    evaluator: OutcomeEvaluator,
    submitter: S,
    gateway: G,
    cache: IdentityCache,
}

impl<S, G> Pipeline<S, G>
where
    S: Submitter,
    G: PersistenceGateway,
{
    pub fn new(
        catalog: ElementCatalog,
        assembler: AssemblerOptions,
        evaluator: EvaluatorOptions,
        submitter: S,
        gateway: G,
    ) -> Self {
        Self {
            catalog,
            assembler: BundleAssembler::new(assembler),
            evaluator: OutcomeEvaluator::new(evaluator),
            submitter,
            gateway,
            cache: IdentityCache::new(),
        }
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Process records in order until done or `cancel` is raised.
    ///
    /// Cancellation is checked between records only; a record already
    /// submitted always runs to completion.
    pub async fn run_batch<'r, I>(&mut self, records: I, cancel: &AtomicBool) -> BatchSummary
    where
        I: IntoIterator<Item = &'r SubmissionRecord>,
    {
        let mut summary = BatchSummary::default();
        let mut records = records.into_iter();

        while let Some(submission) = records.next() {
            if cancel.load(Ordering::SeqCst) {
                summary.skipped = 1 + records.by_ref().count();
                tracing::warn!(
                    skipped = summary.skipped,
                    "Batch cancelled, not starting remaining records"
                );
                break;
            }
            let outcome = self.process_record(submission).await;
            summary.record(&outcome);
        }

        tracing::info!(
            processed = summary.processed,
            passed = summary.passed,
            failed = summary.failed,
            rejected = summary.rejected,
            transport_errors = summary.transport_errors,
            skipped = summary.skipped,
            "Batch complete"
        );
        summary
    }

    /// Run one record end-to-end
    pub async fn process_record(&mut self, submission: &SubmissionRecord) -> RecordOutcome {
        let started = Instant::now();
        let outcome = self.run_record(submission).await;

        metrics::record_submission(outcome.label(), started.elapsed());
        tracing::info!(
            target: "audit",
            record_id = %outcome.record_id(),
            outcome = outcome.label(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Submission processed"
        );
        outcome
    }

    async fn run_record(&mut self, submission: &SubmissionRecord) -> RecordOutcome {
        let key = submission.metadata.assessment_key.trim().to_string();
        let rejected = |record_id: String, reason: String| {
            tracing::warn!(record_id = %record_id, reason = %reason, "Record rejected");
            RecordOutcome::Rejected { record_id, reason }
        };

        let metadata = match IdentityResolver::new(&mut self.cache).normalize(&submission.metadata)
        {
            Ok(metadata) => metadata,
            Err(e) => return rejected(key, e.to_string()),
        };
        let record_id = metadata.record_id().to_string();

        let bundle = match self.assembler.build(&submission.record, &metadata) {
            Ok(bundle) => bundle,
            Err(e) => return rejected(record_id, e.to_string()),
        };
        let xml = match bundle_to_xml(&bundle) {
            Ok(xml) => xml,
            Err(e) => {
                tracing::error!(record_id = %record_id, error = %e, "Failed to serialize bundle");
                return rejected(record_id, e.to_string());
            }
        };

        let raw = match self.submitter.submit(&xml).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(record_id = %record_id, error = %e, "Submission transport failed");
                return RecordOutcome::TransportError {
                    record_id,
                    reason: e.to_string(),
                };
            }
        };

        let evaluation = self.evaluator.evaluate(&raw);
        tracing::debug!(
            record_id = %record_id,
            passed = evaluation.passed,
            basis = ?evaluation.basis,
            issues = evaluation.issues.len(),
            "Response classified"
        );

        if evaluation.passed {
            IdentityResolver::new(&mut self.cache).update_cache(&metadata, &evaluation.returned);

            let ids = SubmittedIds::new(&metadata, &evaluation.returned);
            if let Err(e) = self.gateway.store_pass(&record_id, &ids).await {
                tracing::error!(record_id = %record_id, error = %e, "Failed to store PASS result");
            }
            return RecordOutcome::Passed {
                record_id,
                returned: evaluation.returned,
            };
        }

        let reconciler = ErrorReconciler::new(&self.catalog);
        let operation = metadata.assessment.operation;
        let instructions = reconciler
            .reconcile(&raw, &record_id, operation)
            .unwrap_or_else(|e| {
                tracing::debug!(
                    record_id = %record_id,
                    error = %e,
                    "Response not decodable, no section notes"
                );
                reconciler.reconcile_issues(&evaluation.issues, &record_id, operation)
            });
        let notes = instructions
            .iter()
            .filter(|i| matches!(i, WriteBackInstruction::AppendNote { .. }))
            .count();

        if let Err(e) = self.gateway.store_fail(&record_id).await {
            tracing::error!(record_id = %record_id, error = %e, "Failed to store FAIL result");
        }
        if let Err(e) = self.gateway.apply(&instructions).await {
            tracing::error!(
                record_id = %record_id,
                error = %e,
                "Failed to apply write-back instructions"
            );
        }

        RecordOutcome::Failed { record_id, notes }
    }
}
