//! Tenant-scoped suppression list — addresses that must never receive
//! further sends (unsubscribed, bounced, complained).
//!
//! Populated by inbound provider webhooks and manual ops; consulted by the
//! resolver before every dispatch. A suppressed address is a pre-send skip,
//! never a provider failure.

use rusqlite::{Connection, params};
use sendfleet_core::error::{Result, SendFleetError};
use sendfleet_core::types::ChannelKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use crate::resolver;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionEntry {
    pub company_id: String,
    pub channel: ChannelKind,
    pub address: String,
    /// "bounce", "complaint", "unsubscribe", "manual".
    pub reason: String,
    /// Which vendor's webhook (or which operator) reported it.
    pub source: String,
    pub created_at: String,
}

pub struct SuppressionStore {
    conn: Mutex<Connection>,
}

impl SuppressionStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| SendFleetError::Store(format!("Suppression DB open: {e}")))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| SendFleetError::Store(format!("Suppression DB pragma: {e}")))?;
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
            CREATE TABLE IF NOT EXISTS suppressions (
                company_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                address TEXT NOT NULL,
                reason TEXT NOT NULL DEFAULT 'manual',
                source TEXT NOT NULL DEFAULT 'manual',
                created_at TEXT NOT NULL,
                PRIMARY KEY (company_id, channel, address)
            );
            ",
        )
        .map_err(|e| SendFleetError::Store(format!("Suppression migration: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SendFleetError::Store(format!("Suppression DB lock: {e}")))
    }

    /// Add an address. The address is normalized the same way the resolver
    /// normalizes recipients so lookups always compare canonical forms;
    /// an unparseable address is rejected rather than stored unmatchable.
    pub fn add(
        &self,
        company_id: &str,
        channel: ChannelKind,
        address: &str,
        reason: &str,
        source: &str,
    ) -> Result<()> {
        let normalized = resolver::normalize_address(channel, address).ok_or_else(|| {
            SendFleetError::Validation(format!("Cannot normalize {channel} address: {address}"))
        })?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO suppressions (company_id, channel, address, reason, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(company_id, channel, address) DO UPDATE SET
                 reason = excluded.reason,
                 source = excluded.source",
            params![
                company_id,
                channel.as_str(),
                normalized,
                reason,
                source,
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| SendFleetError::Store(format!("Suppression insert: {e}")))?;
        tracing::info!("🚫 Suppressed {channel} address for {company_id} ({reason})");
        Ok(())
    }

    pub fn remove(&self, company_id: &str, channel: ChannelKind, address: &str) -> Result<bool> {
        let normalized =
            resolver::normalize_address(channel, address).unwrap_or_else(|| address.to_string());
        let conn = self.lock()?;
        let n = conn
            .execute(
                "DELETE FROM suppressions
                 WHERE company_id = ?1 AND channel = ?2 AND address = ?3",
                params![company_id, channel.as_str(), normalized],
            )
            .map_err(|e| SendFleetError::Store(format!("Suppression delete: {e}")))?;
        Ok(n > 0)
    }

    /// The full suppressed-address set for one tenant + channel, fetched
    /// once per dispatch and checked in memory.
    pub fn suppressed_set(&self, company_id: &str, channel: ChannelKind) -> Result<HashSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT address FROM suppressions WHERE company_id = ?1 AND channel = ?2",
            )
            .map_err(|e| SendFleetError::Store(format!("Suppression query: {e}")))?;
        let rows = stmt
            .query_map(params![company_id, channel.as_str()], |row| row.get(0))
            .map_err(|e| SendFleetError::Store(format!("Suppression query: {e}")))?;
        rows.collect::<rusqlite::Result<HashSet<String>>>()
            .map_err(|e| SendFleetError::Store(format!("Suppression rows: {e}")))
    }

    pub fn list(&self, company_id: &str) -> Result<Vec<SuppressionEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT company_id, channel, address, reason, source, created_at
                 FROM suppressions WHERE company_id = ?1 ORDER BY created_at DESC",
            )
            .map_err(|e| SendFleetError::Store(format!("Suppression query: {e}")))?;
        let rows = stmt
            .query_map(params![company_id], |row| {
                Ok(SuppressionEntry {
                    company_id: row.get(0)?,
                    channel: ChannelKind::parse(&row.get::<_, String>(1)?)
                        .unwrap_or(ChannelKind::Email),
                    address: row.get(2)?,
                    reason: row.get(3)?,
                    source: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .map_err(|e| SendFleetError::Store(format!("Suppression query: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| SendFleetError::Store(format!("Suppression rows: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (SuppressionStore, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "sendfleet-supp-test-{}-{}.db",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .subsec_nanos()
        ));
        (SuppressionStore::open(&path).unwrap(), path)
    }

    #[test]
    fn add_normalizes_before_storing() {
        let (store, path) = temp_store();
        store
            .add("acme", ChannelKind::Email, " Bounced@Example.COM ", "bounce", "resend")
            .unwrap();

        let set = store.suppressed_set("acme", ChannelKind::Email).unwrap();
        assert!(set.contains("bounced@example.com"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unparseable_address_is_rejected() {
        let (store, path) = temp_store();
        let err = store
            .add("acme", ChannelKind::Sms, "not-a-number", "bounce", "twilio")
            .unwrap_err();
        assert!(matches!(err, SendFleetError::Validation(_)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn scoped_by_tenant_and_channel() {
        let (store, path) = temp_store();
        store
            .add("acme", ChannelKind::Email, "a@example.com", "unsubscribe", "manual")
            .unwrap();

        assert!(store
            .suppressed_set("globex", ChannelKind::Email)
            .unwrap()
            .is_empty());
        assert!(store
            .suppressed_set("acme", ChannelKind::Sms)
            .unwrap()
            .is_empty());
        assert_eq!(store.list("acme").unwrap().len(), 1);

        assert!(store.remove("acme", ChannelKind::Email, "A@example.com").unwrap());
        assert!(store
            .suppressed_set("acme", ChannelKind::Email)
            .unwrap()
            .is_empty());
        std::fs::remove_file(&path).ok();
    }
}
