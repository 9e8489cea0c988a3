//! Audit log of released reports
//!
//! Every report that passes verification is recorded with a SHA-256 hash
//! of its JSON form. Records are immutable once stored; the hash lets a
//! copy held elsewhere (an exported file, an API response) be checked
//! against what was released.

use crate::execution::StageRecord;
use crate::models::FinalReport;
use crate::verification::VerificationResult;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub audit_id: Uuid,
    pub report_id: Uuid,
    pub vertical_name: String,
    pub regions: Vec<String>,
    pub report_hash: String,
    pub report: Arc<FinalReport>,
    pub verification: VerificationResult,
    pub stage_trace: Vec<StageRecord>,
    pub created_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

impl RunRecord {
    pub fn new(
        report: Arc<FinalReport>,
        verification: VerificationResult,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            audit_id: Uuid::new_v4(),
            report_id: report.report_id,
            vertical_name: report.vertical.name.clone(),
            regions: report.markets.iter().map(|m| m.region.clone()).collect(),
            report_hash: compute_report_hash(&report),
            stage_trace: report.stage_trace.clone(),
            report,
            verification,
            created_at: Utc::now(),
            execution_time_ms,
        }
    }
}

/// Audit trail storage; clones share the same records
#[derive(Clone)]
pub struct AuditLog {
    records: Arc<RwLock<HashMap<Uuid, RunRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn record(&self, record: RunRecord) -> Result<Uuid> {
        let audit_id = record.audit_id;
        let mut records = self.records.write().await;
        records.insert(audit_id, record);
        Ok(audit_id)
    }

    pub async fn get(&self, audit_id: Uuid) -> Result<Option<RunRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&audit_id).cloned())
    }

    pub async fn get_by_report(&self, report_id: Uuid) -> Result<Option<RunRecord>> {
        let records = self.records.read().await;
        Ok(records.values().find(|r| r.report_id == report_id).cloned())
    }

    /// Audit IDs of runs for a vertical (case-insensitive), oldest first
    pub async fn list_for_vertical(&self, vertical_name: &str) -> Result<Vec<Uuid>> {
        let records = self.records.read().await;
        let wanted = vertical_name.trim().to_lowercase();

        let mut items: Vec<_> = records
            .iter()
            .filter(|(_, record)| record.vertical_name.to_lowercase() == wanted)
            .map(|(id, record)| (*id, record.created_at))
            .collect();

        items.sort_by_key(|(_, created_at)| *created_at);

        Ok(items.into_iter().map(|(id, _)| id).collect())
    }

    /// Is `report` byte-for-byte the report recorded under `audit_id`?
    pub async fn matches(&self, audit_id: Uuid, report: &FinalReport) -> Result<bool> {
        let records = self.records.read().await;

        Ok(records
            .get(&audit_id)
            .map(|record| compute_report_hash(report) == record.report_hash)
            .unwrap_or(false))
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 of the report's JSON, streamed straight into the hasher
pub fn compute_report_hash(report: &FinalReport) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), report).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::create_default_verification_engine;
    use crate::verification::tests::sample_report;

    fn record_for(report: FinalReport) -> RunRecord {
        let (_, context) = sample_report();
        let verification = create_default_verification_engine().verify(&report, &context);
        RunRecord::new(Arc::new(report), verification, 42)
    }

    #[tokio::test]
    async fn test_record_and_lookup() {
        let log = AuditLog::new();
        let (report, _) = sample_report();
        let report_id = report.report_id;

        let audit_id = log.record(record_for(report)).await.unwrap();

        let stored = log.get(audit_id).await.unwrap().unwrap();
        assert_eq!(stored.report_id, report_id);
        assert_eq!(stored.regions, vec!["Finland", "Sweden"]);
        assert_eq!(log.get_by_report(report_id).await.unwrap().unwrap().audit_id, audit_id);
        assert_eq!(log.list_for_vertical("smart agriculture").await.unwrap(), vec![audit_id]);
        assert!(log.list_for_vertical("Smart Cities").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_altered_copy_no_longer_matches() {
        let log = AuditLog::new();
        let (report, _) = sample_report();
        let audit_id = log.record(record_for(report.clone())).await.unwrap();

        assert!(log.matches(audit_id, &report).await.unwrap());

        let mut tampered = report.clone();
        tampered.disclaimer = String::new();
        assert!(!log.matches(audit_id, &tampered).await.unwrap());

        let mut reranked = report.clone();
        reranked.ranked_segments.reverse();
        assert!(!log.matches(audit_id, &reranked).await.unwrap());

        assert!(!log.matches(Uuid::new_v4(), &report).await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_matches_only_its_own_record() {
        let log = AuditLog::new();
        let (first, _) = sample_report();
        let (mut second, _) = sample_report();
        second.report_id = Uuid::new_v4();

        let first_id = log.record(record_for(first.clone())).await.unwrap();
        let second_id = log.record(record_for(second.clone())).await.unwrap();

        assert!(log.matches(first_id, &first).await.unwrap());
        assert!(!log.matches(second_id, &first).await.unwrap());
        assert!(log.matches(second_id, &second).await.unwrap());
    }

    #[test]
    fn test_hash_is_stable_for_same_report() {
        let (report, _) = sample_report();
        let first = compute_report_hash(&report);

        assert_eq!(first.len(), 64);
        assert_eq!(first, compute_report_hash(&report.clone()));
    }
}
