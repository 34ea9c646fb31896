//! Per-tenant provider credentials, encrypted at rest.
//!
//! Credential bundles are stored as AES-256 encrypted JSON blobs keyed by
//! (tenant, channel, vendor), with a machine-specific key derived from
//! hostname + username. Decryption happens lazily, per send operation —
//! plaintext secrets never live longer than the adapter built from them.

use aes::Aes256;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rusqlite::{Connection, params};
use sendfleet_core::error::{Result, SendFleetError};
use sendfleet_core::types::ChannelKind;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// One configured (tenant, channel, vendor) entry — secrets omitted.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CredentialRecord {
    pub company_id: String,
    pub channel: ChannelKind,
    pub vendor: String,
    /// Lower sorts earlier within the own-key / shared bands.
    pub priority: u32,
    /// Platform-shared key; always orders after tenant-owned keys.
    pub shared: bool,
    pub enabled: bool,
    pub updated_at: String,
}

/// SQLite-backed credential store.
pub struct CredentialStore {
    conn: Mutex<Connection>,
    encrypt: bool,
    key: [u8; 32],
}

impl CredentialStore {
    /// Open or create the credential database.
    pub fn open(path: &Path, encrypt: bool) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| SendFleetError::Store(format!("Credential DB open: {e}")))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| SendFleetError::Store(format!("Credential DB pragma: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
            encrypt,
            key: derive_machine_key(),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS provider_credentials (
                company_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                vendor TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 100,
                shared INTEGER NOT NULL DEFAULT 0,
                enabled INTEGER NOT NULL DEFAULT 1,
                secrets_enc TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (company_id, channel, vendor)
            );
            ",
        )
        .map_err(|e| SendFleetError::Store(format!("Credential migration: {e}")))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SendFleetError::Store(format!("Credential DB lock: {e}")))
    }

    /// Insert or replace a credential bundle.
    pub fn upsert(
        &self,
        company_id: &str,
        channel: ChannelKind,
        vendor: &str,
        priority: u32,
        shared: bool,
        secrets: &HashMap<String, String>,
    ) -> Result<()> {
        let blob = self.seal(secrets)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO provider_credentials
                 (company_id, channel, vendor, priority, shared, enabled, secrets_enc, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)
             ON CONFLICT(company_id, channel, vendor) DO UPDATE SET
                 priority = excluded.priority,
                 shared = excluded.shared,
                 secrets_enc = excluded.secrets_enc,
                 updated_at = excluded.updated_at",
            params![
                company_id,
                channel.as_str(),
                vendor,
                priority,
                shared,
                blob,
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| SendFleetError::Store(format!("Credential upsert: {e}")))?;
        tracing::info!("🔐 Credentials stored: {company_id}/{channel}/{vendor}");
        Ok(())
    }

    /// Remove one (channel, vendor) entry for a tenant.
    pub fn remove(&self, company_id: &str, channel: ChannelKind, vendor: &str) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "DELETE FROM provider_credentials
                 WHERE company_id = ?1 AND channel = ?2 AND vendor = ?3",
                params![company_id, channel.as_str(), vendor],
            )
            .map_err(|e| SendFleetError::Store(format!("Credential delete: {e}")))?;
        Ok(n > 0)
    }

    /// Enable or disable an entry without touching its secrets.
    pub fn set_enabled(
        &self,
        company_id: &str,
        channel: ChannelKind,
        vendor: &str,
        enabled: bool,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE provider_credentials SET enabled = ?4, updated_at = ?5
             WHERE company_id = ?1 AND channel = ?2 AND vendor = ?3",
            params![
                company_id,
                channel.as_str(),
                vendor,
                enabled,
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| SendFleetError::Store(format!("Credential update: {e}")))?;
        Ok(())
    }

    /// Enabled entries for a tenant on one channel, in routing order:
    /// own-key entries before platform-shared, then by priority.
    pub fn routing_order(&self, company_id: &str, channel: ChannelKind) -> Result<Vec<CredentialRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT company_id, channel, vendor, priority, shared, enabled, updated_at
                 FROM provider_credentials
                 WHERE company_id = ?1 AND channel = ?2 AND enabled = 1
                 ORDER BY shared ASC, priority ASC, vendor ASC",
            )
            .map_err(|e| SendFleetError::Store(format!("Credential query: {e}")))?;
        let rows = stmt
            .query_map(params![company_id, channel.as_str()], |row| {
                Ok(CredentialRecord {
                    company_id: row.get(0)?,
                    channel: ChannelKind::parse(&row.get::<_, String>(1)?)
                        .unwrap_or(ChannelKind::Email),
                    vendor: row.get(2)?,
                    priority: row.get(3)?,
                    shared: row.get(4)?,
                    enabled: row.get(5)?,
                    updated_at: row.get(6)?,
                })
            })
            .map_err(|e| SendFleetError::Store(format!("Credential query: {e}")))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| SendFleetError::Store(format!("Credential rows: {e}")))
    }

    /// Decrypt one entry's secret bundle. Call at send time, drop with the
    /// adapter — the map must not be cached.
    pub fn decrypt_secrets(
        &self,
        company_id: &str,
        channel: ChannelKind,
        vendor: &str,
    ) -> Result<HashMap<String, String>> {
        let blob: String = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT secrets_enc FROM provider_credentials
                 WHERE company_id = ?1 AND channel = ?2 AND vendor = ?3",
                params![company_id, channel.as_str(), vendor],
                |row| row.get(0),
            )
            .map_err(|e| SendFleetError::Store(format!("Credential read: {e}")))?
        };
        self.unseal(&blob)
    }

    fn seal(&self, secrets: &HashMap<String, String>) -> Result<String> {
        let json = serde_json::to_string(secrets)
            .map_err(|e| SendFleetError::Secrets(format!("Serialize secrets: {e}")))?;
        if self.encrypt {
            Ok(BASE64.encode(encrypt_aes256(json.as_bytes(), &self.key)))
        } else {
            Ok(json)
        }
    }

    fn unseal(&self, blob: &str) -> Result<HashMap<String, String>> {
        let json = if self.encrypt {
            let encrypted = BASE64
                .decode(blob.trim())
                .map_err(|e| SendFleetError::Secrets(format!("Base64 decode: {e}")))?;
            let decrypted = decrypt_aes256(&encrypted, &self.key);
            String::from_utf8(decrypted)
                .map_err(|e| SendFleetError::Secrets(format!("Decryption produced invalid UTF-8: {e}")))?
        } else {
            blob.to_string()
        };
        serde_json::from_str(&json)
            .map_err(|e| SendFleetError::Secrets(format!("Parse secrets: {e}")))
    }
}

/// Derive a machine-specific AES-256 key from hostname + username.
fn derive_machine_key() -> [u8; 32] {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "sendfleet".into());
    let username = whoami::username();
    let salt = format!("sendfleet::{username}@{hostname}::credentials");

    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    let result = hasher.finalize();

    let mut key = [0u8; 32];
    key.copy_from_slice(&result);
    key
}

/// AES-256-ECB encrypt with PKCS7 padding.
fn encrypt_aes256(data: &[u8], key: &[u8; 32]) -> Vec<u8> {
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let block_size = 16;

    let padding_len = block_size - (data.len() % block_size);
    let mut padded = data.to_vec();
    padded.extend(std::iter::repeat_n(padding_len as u8, padding_len));

    let mut encrypted = Vec::with_capacity(padded.len());
    for chunk in padded.chunks(block_size) {
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.encrypt_block(&mut block);
        encrypted.extend_from_slice(&block);
    }

    encrypted
}

/// AES-256-ECB decrypt with PKCS7 unpadding.
fn decrypt_aes256(data: &[u8], key: &[u8; 32]) -> Vec<u8> {
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let block_size = 16;

    let mut decrypted = Vec::with_capacity(data.len());
    for chunk in data.chunks(block_size) {
        if chunk.len() == block_size {
            let mut block = GenericArray::clone_from_slice(chunk);
            cipher.decrypt_block(&mut block);
            decrypted.extend_from_slice(&block);
        }
    }

    if let Some(&pad_len) = decrypted.last() {
        let pad_len = pad_len as usize;
        if pad_len <= block_size && pad_len <= decrypted.len() {
            let valid = decrypted[decrypted.len() - pad_len..]
                .iter()
                .all(|&b| b == pad_len as u8);
            if valid {
                decrypted.truncate(decrypted.len() - pad_len);
            }
        }
    }

    decrypted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (CredentialStore, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "sendfleet-cred-test-{}.db",
            std::process::id() as u64 + rand_suffix()
        ));
        let store = CredentialStore::open(&path, true).unwrap();
        (store, path)
    }

    fn rand_suffix() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as u64
    }

    fn secrets(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = derive_machine_key();
        let data = b"twilio auth token";
        let encrypted = encrypt_aes256(data, &key);
        assert_ne!(&encrypted[..], &data[..]);
        assert_eq!(decrypt_aes256(&encrypted, &key), data);
    }

    #[test]
    fn upsert_and_lazy_decrypt() {
        let (store, path) = temp_store();
        store
            .upsert(
                "acme",
                ChannelKind::Sms,
                "twilio",
                10,
                false,
                &secrets(&[("account_sid", "AC1"), ("auth_token", "tok")]),
            )
            .unwrap();

        let decrypted = store
            .decrypt_secrets("acme", ChannelKind::Sms, "twilio")
            .unwrap();
        assert_eq!(decrypted.get("auth_token").map(String::as_str), Some("tok"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn routing_order_puts_own_keys_before_shared() {
        let (store, path) = temp_store();
        store
            .upsert("acme", ChannelKind::Email, "resend", 1, true, &secrets(&[("api_key", "re")]))
            .unwrap();
        store
            .upsert(
                "acme",
                ChannelKind::Email,
                "smtp",
                50,
                false,
                &secrets(&[("smtp_host", "smtp.acme.com")]),
            )
            .unwrap();

        let order = store.routing_order("acme", ChannelKind::Email).unwrap();
        let vendors: Vec<&str> = order.iter().map(|r| r.vendor.as_str()).collect();
        // Own-key SMTP (priority 50) still beats shared Resend (priority 1).
        assert_eq!(vendors, vec!["smtp", "resend"]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn disabled_entries_are_not_routed() {
        let (store, path) = temp_store();
        store
            .upsert("acme", ChannelKind::Sms, "vonage", 1, false, &secrets(&[("api_key", "k")]))
            .unwrap();
        store
            .set_enabled("acme", ChannelKind::Sms, "vonage", false)
            .unwrap();
        assert!(store.routing_order("acme", ChannelKind::Sms).unwrap().is_empty());
        std::fs::remove_file(&path).ok();
    }
}
