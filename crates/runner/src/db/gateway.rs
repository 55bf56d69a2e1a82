use async_trait::async_trait;
use deadpool_postgres::Pool;
use submit_core::{NormalizedMetadata, ReturnedIds, WriteBackInstruction};

use crate::error::RunnerError;

pub const STATUS_PASS: &str = "PASS";
pub const STATUS_FAIL: &str = "FAIL";

/// Tables the gateway writes to. Created on startup when missing.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS submission_records (
    record_id     TEXT PRIMARY KEY,
    status        TEXT,
    patient_id    TEXT,
    encounter_id  TEXT,
    assessment_id TEXT,
    complete      BOOLEAN NOT NULL DEFAULT TRUE,
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS submission_sections (
    record_id  TEXT NOT NULL,
    section    TEXT NOT NULL,
    state      TEXT,
    notes      TEXT NOT NULL DEFAULT '',
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (record_id, section)
);
"#;

const UPSERT_STATUS: &str = "INSERT INTO submission_records (record_id, status) VALUES ($1, $2) \
     ON CONFLICT (record_id) DO UPDATE SET status = EXCLUDED.status, updated_at = now()";

const STORE_PASS: &str = "INSERT INTO submission_records \
     (record_id, status, patient_id, encounter_id, assessment_id) VALUES ($1, $2, $3, $4, $5) \
     ON CONFLICT (record_id) DO UPDATE SET status = EXCLUDED.status, \
     patient_id = EXCLUDED.patient_id, encounter_id = EXCLUDED.encounter_id, \
     assessment_id = EXCLUDED.assessment_id, updated_at = now()";

const APPEND_NOTE: &str = "INSERT INTO submission_sections (record_id, section, notes) \
     VALUES ($1, $2, $3) \
     ON CONFLICT (record_id, section) DO UPDATE \
     SET notes = submission_sections.notes || EXCLUDED.notes, updated_at = now()";

const SET_SECTION_STATE: &str = "INSERT INTO submission_sections (record_id, section, state) \
     VALUES ($1, $2, $3) \
     ON CONFLICT (record_id, section) DO UPDATE SET state = EXCLUDED.state, updated_at = now()";

const MARK_INCOMPLETE: &str = "INSERT INTO submission_records (record_id, complete) \
     VALUES ($1, FALSE) \
     ON CONFLICT (record_id) DO UPDATE SET complete = FALSE, updated_at = now()";

/// Resource ids stored for a PASS record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedIds {
    pub patient: String,
    pub encounter: String,
    pub assessment: String,
}

impl SubmittedIds {
    /// Server-returned ids win over the ids the record was submitted with
    pub fn new(metadata: &NormalizedMetadata, returned: &ReturnedIds) -> Self {
        let pick = |resolved: &str, returned: Option<&String>| {
            returned.cloned().unwrap_or_else(|| resolved.to_string())
        };
        Self {
            patient: pick(&metadata.patient.id, returned.patient.as_ref()),
            encounter: pick(&metadata.encounter.id, returned.encounter.as_ref()),
            assessment: pick(&metadata.assessment.id, returned.assessment.as_ref()),
        }
    }
}

/// Write-back boundary to the source system
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn store_pass(&self, record_id: &str, ids: &SubmittedIds) -> Result<(), RunnerError>;

    async fn store_fail(&self, record_id: &str) -> Result<(), RunnerError>;

    /// Apply reconciler output in order, atomically
    async fn apply(&self, instructions: &[WriteBackInstruction]) -> Result<(), RunnerError>;
}

/// PostgreSQL-backed gateway
#[derive(Clone)]
pub struct PgGateway {
    pool: Pool,
}

impl PgGateway {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create the write-back tables if they do not exist
    pub async fn ensure_schema(&self) -> Result<(), RunnerError> {
        let client = self.pool.get().await?;
        client.batch_execute(SCHEMA).await?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for PgGateway {
    async fn store_pass(&self, record_id: &str, ids: &SubmittedIds) -> Result<(), RunnerError> {
        let client = self.pool.get().await?;
        client
            .execute(
                STORE_PASS,
                &[
                    &record_id,
                    &STATUS_PASS,
                    &ids.patient,
                    &ids.encounter,
                    &ids.assessment,
                ],
            )
            .await?;
        Ok(())
    }

    async fn store_fail(&self, record_id: &str) -> Result<(), RunnerError> {
        let client = self.pool.get().await?;
        client
            .execute(UPSERT_STATUS, &[&record_id, &STATUS_FAIL])
            .await?;
        Ok(())
    }

    async fn apply(&self, instructions: &[WriteBackInstruction]) -> Result<(), RunnerError> {
        if instructions.is_empty() {
            return Ok(());
        }

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        for instruction in instructions {
            match instruction {
                WriteBackInstruction::AppendNote {
                    record_id,
                    section,
                    note,
                } => {
                    tx.execute(APPEND_NOTE, &[record_id, section, note]).await?;
                }
                WriteBackInstruction::SetSectionState {
                    record_id,
                    section,
                    state,
                } => {
                    tx.execute(SET_SECTION_STATE, &[record_id, section, state])
                        .await?;
                }
                WriteBackInstruction::MarkIncomplete { record_id } => {
                    tx.execute(MARK_INCOMPLETE, &[record_id]).await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
