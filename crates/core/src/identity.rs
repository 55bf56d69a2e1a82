//! Identity resolution: ids, operation verbs and the natural-key cache
//!
//! The cache lives for one batch run and is passed into the resolver for
//! every record. Records are processed sequentially, so it needs no locking.
//! Parallel submission across records would need per-key synchronization that
//! keeps "last PASS wins" for the same key.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::{SubmitError, SubmitResult};
use crate::operation::{Operation, ResourceKind};
use crate::record::{AssessmentType, RecordMetadata, non_blank};

/// Natural key → previously issued resource id, scoped to one batch run
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: HashMap<(ResourceKind, String), String>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ResourceKind, key: &str) -> Option<&str> {
        let key = non_blank(key)?;
        self.entries
            .get(&(kind, key.to_string()))
            .map(String::as_str)
    }

    /// Insert or overwrite. Blank keys and blank ids are never stored.
    pub fn insert(&mut self, kind: ResourceKind, key: &str, id: &str) -> bool {
        let (Some(key), Some(id)) = (non_blank(key), non_blank(id)) else {
            return false;
        };
        self.entries.insert((kind, key.to_string()), id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where a resolved id came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdOrigin {
    Supplied,
    Cached,
    Generated,
}

/// Id, natural key and operation for one resource kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub kind: ResourceKind,
    pub id: String,
    pub origin: IdOrigin,
    pub key: String,
    pub operation: Operation,
}

impl ResolvedResource {
    /// Whether the id refers to a resource the server already knows
    pub fn is_known(&self) -> bool {
        self.origin != IdOrigin::Generated
    }
}

/// Metadata after ids are assigned and operations defaulted
#[derive(Debug, Clone)]
pub struct NormalizedMetadata {
    pub bundle_id: String,
    pub patient: ResolvedResource,
    pub encounter: ResolvedResource,
    pub assessment: ResolvedResource,
    pub assessment_type: AssessmentType,
    pub return_assessment: bool,
    pub fiscal_year: Option<i32>,
    pub fiscal_quarter: Option<u8>,
}

impl NormalizedMetadata {
    /// Id the source system uses for write-back
    pub fn record_id(&self) -> &str {
        &self.assessment.key
    }

    /// Whether the encounter period starts at the return date
    pub fn is_return(&self) -> bool {
        self.return_assessment || self.assessment_type == AssessmentType::Return
    }
}

/// Ids returned by the server for a PASS submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnedIds {
    pub patient: Option<String>,
    pub encounter: Option<String>,
    pub assessment: Option<String>,
}

impl ReturnedIds {
    pub fn get(&self, kind: ResourceKind) -> Option<&str> {
        match kind {
            ResourceKind::Patient => self.patient.as_deref(),
            ResourceKind::Encounter => self.encounter.as_deref(),
            ResourceKind::Assessment => self.assessment.as_deref(),
        }
    }

    pub fn set(&mut self, kind: ResourceKind, id: String) {
        match kind {
            ResourceKind::Patient => self.patient = Some(id),
            ResourceKind::Encounter => self.encounter = Some(id),
            ResourceKind::Assessment => self.assessment = Some(id),
        }
    }
}

/// Resolves ids and operations for one record against the batch cache
pub struct IdentityResolver<'a> {
    cache: &'a mut IdentityCache,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(cache: &'a mut IdentityCache) -> Self {
        Self { cache }
    }

    /// Assign or reuse ids, default operations and validate id requirements
    pub fn normalize(&self, metadata: &RecordMetadata) -> SubmitResult<NormalizedMetadata> {
        let assessment_type = AssessmentType::parse(&metadata.assessment_type);
        let follow_up = assessment_type.is_follow_up();

        let patient = self.resolve(
            ResourceKind::Patient,
            &metadata.patient_id,
            &metadata.patient_key,
            &metadata.patient_operation,
            follow_up,
        )?;
        let encounter = self.resolve(
            ResourceKind::Encounter,
            &metadata.encounter_id,
            &metadata.encounter_key,
            &metadata.encounter_operation,
            follow_up,
        )?;
        let assessment = self.resolve(
            ResourceKind::Assessment,
            &metadata.assessment_id,
            &metadata.assessment_key,
            &metadata.assessment_operation,
            follow_up,
        )?;

        let bundle_id = non_blank(&metadata.bundle_id)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(NormalizedMetadata {
            bundle_id,
            patient,
            encounter,
            assessment,
            assessment_type,
            return_assessment: metadata.return_assessment,
            fiscal_year: metadata.fiscal_year,
            fiscal_quarter: metadata.fiscal_quarter,
        })
    }

    fn resolve(
        &self,
        kind: ResourceKind,
        raw_id: &str,
        raw_key: &str,
        raw_operation: &str,
        follow_up: bool,
    ) -> SubmitResult<ResolvedResource> {
        let operation = Operation::parse(kind, raw_operation)?;
        let key = raw_key.trim().to_string();

        let mut resolved = match non_blank(raw_id) {
            Some(id) => (id.to_string(), IdOrigin::Supplied),
            None => (Uuid::new_v4().to_string(), IdOrigin::Generated),
        };

        if follow_up {
            if let Some(cached) = self.cache.get(kind, &key) {
                tracing::debug!(
                    kind = %kind,
                    key = %key,
                    id = cached,
                    "Reusing cached resource id"
                );
                resolved = (cached.to_string(), IdOrigin::Cached);
            }
        }

        let (id, origin) = resolved;
        if operation.requires_known_id() && origin == IdOrigin::Generated {
            return Err(SubmitError::MissingIdentifier { kind, operation });
        }

        Ok(ResolvedResource {
            kind,
            id,
            origin,
            key,
            operation,
        })
    }

    /// Store ids returned by a PASS submission under their natural keys
    pub fn update_cache(&mut self, metadata: &NormalizedMetadata, returned: &ReturnedIds) {
        for resource in [&metadata.patient, &metadata.encounter, &metadata.assessment] {
            if let Some(id) = returned.get(resource.kind) {
                if self.cache.insert(resource.kind, &resource.key, id) {
                    tracing::debug!(
                        kind = %resource.kind,
                        key = %resource.key,
                        id,
                        "Cached returned resource id"
                    );
                }
            }
        }
    }
}
