//! Record Store — JSON-file backed, append-only event log.
//!
//! Layout on disk is a single document `{"traders": [...]}`. Every write
//! rewrites the whole document through a temp file + rename so a crash
//! never leaves a torn file behind.
//!
//! Reads fail open (missing or corrupt file → empty collection). Writes
//! never clobber a file they could not parse.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::types::{EventRecord, NewEvent, TraderDb};
use crate::error::{RelayError, RelayResult};

pub struct RecordStore {
    path: PathBuf,
    /// Serializes every read-modify-write of the backing file.
    write_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ─────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────

    /// Full collection in append order. Empty if the file is unreadable.
    pub async fn all_records(&self) -> Vec<EventRecord> {
        match self.load().await {
            Ok(db) => db.traders,
            Err(e) => {
                warn!("🗄️ Store read failed, serving empty collection: {}", e);
                Vec::new()
            }
        }
    }

    /// Records of one trader, in append order.
    pub async fn find_by_trader_id(&self, trader_id: &str) -> Vec<EventRecord> {
        self.all_records()
            .await
            .into_iter()
            .filter(|r| r.trader_id == trader_id)
            .collect()
    }

    /// Raw persisted document, or the empty document if nothing was written yet.
    pub async fn snapshot_json(&self) -> RelayResult<Vec<u8>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if !is_blank(&bytes) => Ok(bytes),
            Ok(_) => empty_document(),
            Err(e) if e.kind() == ErrorKind::NotFound => empty_document(),
            Err(e) => Err(e.into()),
        }
    }

    // ─────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────

    /// Stamp and append one event. Durable before returning.
    pub async fn append(&self, event: NewEvent) -> RelayResult<EventRecord> {
        let _guard = self.write_lock.lock().await;
        let mut db = self.load().await?;

        // Wall clock may step back; never hand out an earlier stamp.
        let now = Utc::now();
        let time = match db.traders.last() {
            Some(prev) if prev.time > now => prev.time,
            _ => now,
        };

        let record = event.into_record(time);
        db.traders.push(record.clone());
        self.persist(&db).await?;

        debug!(
            "🗄️ Appended trader={} status={} payout={} (total records={})",
            record.trader_id,
            record.status,
            record.payout,
            db.traders.len()
        );
        Ok(record)
    }

    /// Attach `link` to the trader's anchor record unless a link for
    /// `destination` is already there. Returns whichever link is stored.
    pub async fn set_invite_if_absent(
        &self,
        trader_id: &str,
        destination: &str,
        link: &str,
    ) -> RelayResult<String> {
        let _guard = self.write_lock.lock().await;
        let mut db = self.load().await?;

        let anchor = db
            .traders
            .iter_mut()
            .find(|r| r.trader_id == trader_id)
            .ok_or_else(|| RelayError::UnknownTrader(trader_id.to_string()))?;

        if let Some(existing) = anchor.invites.get(destination) {
            return Ok(existing.clone());
        }
        anchor
            .invites
            .insert(destination.to_string(), link.to_string());
        self.persist(&db).await?;

        info!("🔗 Invite stored: trader={} destination={}", trader_id, destination);
        Ok(link.to_string())
    }

    // ─────────────────────────────────────────────────
    // Backing file
    // ─────────────────────────────────────────────────

    /// Strict load: missing/blank file is an empty db, anything else that
    /// fails is an error.
    async fn load(&self) -> RelayResult<TraderDb> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TraderDb::default()),
            Err(e) => return Err(e.into()),
        };
        if is_blank(&bytes) {
            return Ok(TraderDb::default());
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            RelayError::StoreUnavailable(format!("corrupt {}: {}", self.path.display(), e))
        })
    }

    async fn persist(&self, db: &TraderDb) -> RelayResult<()> {
        let bytes = serde_json::to_vec_pretty(db)
            .map_err(|e| RelayError::StoreUnavailable(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.tmp_path();
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "data.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| b.is_ascii_whitespace())
}

fn empty_document() -> RelayResult<Vec<u8>> {
    serde_json::to_vec_pretty(&TraderDb::default())
        .map_err(|e| RelayError::StoreUnavailable(e.to_string()))
}
