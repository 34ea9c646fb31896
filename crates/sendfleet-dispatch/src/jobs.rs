//! Durable campaign jobs — lifecycle record, progress counters, and the
//! one-directional state machine backing every dispatch.
//!
//! `pending → processing → completed | failed` (plus `retrying`, reserved
//! for a future automatic-retry path). Progress and status always move in
//! the same statement so a concurrent reader never sees one without the
//! other.

use rusqlite::{Connection, OptionalExtension, params};
use sendfleet_core::error::{Result, SendFleetError};
use sendfleet_core::types::{ChannelKind, ChannelPayload};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "retrying" => Some(Self::Retrying),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Monotonically non-decreasing within a job's lifetime; `total` is fixed
/// once the job enters processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total: u32,
    pub sent: u32,
    pub failed: u32,
}

impl JobProgress {
    pub fn attempted(&self) -> u32 {
        self.sent + self.failed
    }
}

/// One logical bulk-send request and its tracked lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignJob {
    pub id: String,
    pub company_id: String,
    pub channel: ChannelKind,
    pub campaign_name: String,
    pub payload: ChannelPayload,
    /// Vendor selected for the whole job by the router.
    pub provider: Option<String>,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub last_error: Option<String>,
    pub created_by: String,
    pub created_at: String,
}

impl CampaignJob {
    pub fn new(
        company_id: &str,
        campaign_name: &str,
        payload: ChannelPayload,
        total: u32,
        created_by: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            company_id: company_id.to_string(),
            channel: payload.channel(),
            campaign_name: campaign_name.to_string(),
            payload,
            provider: None,
            status: JobStatus::Pending,
            progress: JobProgress {
                total,
                sent: 0,
                failed: 0,
            },
            last_error: None,
            created_by: created_by.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// SQLite-backed job store.
pub struct JobStore {
    conn: Mutex<Connection>,
}

const JOB_SELECT: &str = "SELECT id, company_id, channel, campaign_name, payload_json, provider, \
     status, total, sent, failed, last_error, created_by, created_at FROM campaign_jobs";

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<CampaignJob> {
    let channel: String = row.get(2)?;
    let payload_json: String = row.get(4)?;
    let status: String = row.get(6)?;
    Ok(CampaignJob {
        id: row.get(0)?,
        company_id: row.get(1)?,
        channel: ChannelKind::parse(&channel).unwrap_or(ChannelKind::Email),
        campaign_name: row.get(3)?,
        payload: serde_json::from_str(&payload_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        provider: row.get(5)?,
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
        progress: JobProgress {
            total: row.get(7)?,
            sent: row.get(8)?,
            failed: row.get(9)?,
        },
        last_error: row.get(10)?,
        created_by: row.get(11)?,
        created_at: row.get(12)?,
    })
}

impl JobStore {
    /// Open or create the job database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| SendFleetError::Store(format!("Job DB open: {e}")))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| SendFleetError::Store(format!("Job DB pragma: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS campaign_jobs (
                id TEXT PRIMARY KEY,
                company_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                campaign_name TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                provider TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                total INTEGER NOT NULL,
                sent INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_company ON campaign_jobs(company_id, created_at);
            ",
        )
        .map_err(|e| SendFleetError::Store(format!("Job migration: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SendFleetError::Store(format!("Job DB lock: {e}")))
    }

    /// Persist a freshly created job (status pending).
    pub fn create(&self, job: &CampaignJob) -> Result<()> {
        let payload_json = serde_json::to_string(&job.payload)
            .map_err(|e| SendFleetError::Store(format!("Serialize payload: {e}")))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO campaign_jobs
                 (id, company_id, channel, campaign_name, payload_json, provider,
                  status, total, sent, failed, last_error, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                job.id,
                job.company_id,
                job.channel.as_str(),
                job.campaign_name,
                payload_json,
                job.provider,
                job.status.as_str(),
                job.progress.total,
                job.progress.sent,
                job.progress.failed,
                job.last_error,
                job.created_by,
                job.created_at,
            ],
        )
        .map_err(|e| SendFleetError::Store(format!("Job insert: {e}")))?;
        tracing::info!(
            "📋 Job created: {} ({} {} recipients for {})",
            job.id,
            job.progress.total,
            job.channel,
            job.company_id
        );
        Ok(())
    }

    /// Record the vendor the router selected for the whole job.
    pub fn set_provider(&self, job_id: &str, vendor: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaign_jobs SET provider = ?2 WHERE id = ?1",
            params![job_id, vendor],
        )
        .map_err(|e| SendFleetError::Store(format!("Job update: {e}")))?;
        Ok(())
    }

    /// Atomic claim: `pending → processing`, gated on the current status.
    /// Returns false when another invocation already owns the job — the
    /// caller must not dispatch.
    pub fn claim(&self, job_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE campaign_jobs SET status = 'processing'
                 WHERE id = ?1 AND status = 'pending'",
                params![job_id],
            )
            .map_err(|e| SendFleetError::Store(format!("Job claim: {e}")))?;
        Ok(n == 1)
    }

    /// Stream progress counters while the job is processing. Counters only
    /// ever grow; the status guard keeps a finished job immutable.
    pub fn update_progress(&self, job_id: &str, sent: u32, failed: u32) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaign_jobs SET sent = ?2, failed = ?3
             WHERE id = ?1 AND status = 'processing'
               AND sent <= ?2 AND failed <= ?3",
            params![job_id, sent, failed],
        )
        .map_err(|e| SendFleetError::Store(format!("Job progress: {e}")))?;
        Ok(())
    }

    /// Terminal transition with final counters, in one statement.
    pub fn finish(
        &self,
        job_id: &str,
        sent: u32,
        failed: u32,
        status: JobStatus,
        last_error: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaign_jobs
             SET status = ?2, sent = ?3, failed = ?4, last_error = ?5
             WHERE id = ?1 AND status = 'processing'",
            params![job_id, status.as_str(), sent, failed, last_error],
        )
        .map_err(|e| SendFleetError::Store(format!("Job finish: {e}")))?;
        Ok(())
    }

    /// Router produced no candidates: straight `pending → failed`, the
    /// dispatcher is never invoked.
    pub fn fail_before_dispatch(&self, job_id: &str, error: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaign_jobs SET status = 'failed', last_error = ?2
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![job_id, error],
        )
        .map_err(|e| SendFleetError::Store(format!("Job fail: {e}")))?;
        Ok(())
    }

    pub fn get(&self, job_id: &str) -> Result<Option<CampaignJob>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{JOB_SELECT} WHERE id = ?1"),
            params![job_id],
            row_to_job,
        )
        .optional()
        .map_err(|e| SendFleetError::Store(format!("Job read: {e}")))
    }

    /// Most recent jobs for a tenant.
    pub fn list(&self, company_id: &str, limit: u32) -> Result<Vec<CampaignJob>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{JOB_SELECT} WHERE company_id = ?1 ORDER BY created_at DESC LIMIT ?2"
            ))
            .map_err(|e| SendFleetError::Store(format!("Job query: {e}")))?;
        let rows = stmt
            .query_map(params![company_id, limit], row_to_job)
            .map_err(|e| SendFleetError::Store(format!("Job query: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| SendFleetError::Store(format!("Job rows: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (JobStore, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "sendfleet-jobs-test-{}-{}.db",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .subsec_nanos()
        ));
        (JobStore::open(&path).unwrap(), path)
    }

    fn email_job(total: u32) -> CampaignJob {
        CampaignJob::new(
            "acme",
            "spring-sale",
            ChannelPayload::Email {
                subject: "Hello".into(),
                body: "World".into(),
                from_name: None,
            },
            total,
            "pat@acme.test",
        )
    }

    #[test]
    fn create_and_read_back() {
        let (store, path) = temp_store();
        let job = email_job(120);
        store.create(&job).unwrap();

        let loaded = store.get(&job.id).unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.progress.total, 120);
        assert_eq!(loaded.channel, ChannelKind::Email);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn claim_admits_exactly_one_dispatcher() {
        let (store, path) = temp_store();
        let job = email_job(10);
        store.create(&job).unwrap();

        assert!(store.claim(&job.id).unwrap());
        assert!(!store.claim(&job.id).unwrap());
        assert_eq!(
            store.get(&job.id).unwrap().unwrap().status,
            JobStatus::Processing
        );
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn progress_and_status_move_together() {
        let (store, path) = temp_store();
        let job = email_job(10);
        store.create(&job).unwrap();

        // Progress writes before the claim are no-ops: never `pending`
        // with nonzero counters.
        store.update_progress(&job.id, 5, 0).unwrap();
        assert_eq!(store.get(&job.id).unwrap().unwrap().progress.sent, 0);

        store.claim(&job.id).unwrap();
        store.update_progress(&job.id, 5, 1).unwrap();
        let mid = store.get(&job.id).unwrap().unwrap();
        assert_eq!(mid.status, JobStatus::Processing);
        assert_eq!(mid.progress.attempted(), 6);

        // Counters never go backwards.
        store.update_progress(&job.id, 3, 0).unwrap();
        assert_eq!(store.get(&job.id).unwrap().unwrap().progress.sent, 5);

        store
            .finish(&job.id, 9, 1, JobStatus::Failed, Some("mailbox full"))
            .unwrap();
        let done = store.get(&job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.progress.attempted(), done.progress.total);
        assert_eq!(done.last_error.as_deref(), Some("mailbox full"));

        // Terminal jobs are immutable.
        store.update_progress(&job.id, 99, 99).unwrap();
        assert_eq!(store.get(&job.id).unwrap().unwrap().progress.sent, 9);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn router_failure_goes_straight_to_failed() {
        let (store, path) = temp_store();
        let job = email_job(10);
        store.create(&job).unwrap();
        store
            .fail_before_dispatch(&job.id, "No email provider configured")
            .unwrap();

        let failed = store.get(&job.id).unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.progress.sent, 0);
        assert!(failed.last_error.unwrap().contains("provider"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn list_is_tenant_scoped() {
        let (store, path) = temp_store();
        store.create(&email_job(1)).unwrap();
        let mut other = email_job(1);
        other.company_id = "globex".into();
        store.create(&other).unwrap();

        assert_eq!(store.list("acme", 10).unwrap().len(), 1);
        assert_eq!(store.list("globex", 10).unwrap().len(), 1);
        assert!(store.list("initech", 10).unwrap().is_empty());
        std::fs::remove_file(&path).ok();
    }
}
