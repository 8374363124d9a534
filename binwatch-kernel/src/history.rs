/**
 * HISTORY LOG - Journal des alertes envoyées, avec rétention glissante
 *
 * RÔLE : Trace d'audit des notifications (une entrée par épisode ouvert).
 *
 * FONCTIONNEMENT :
 * - append = ajout + purge + persist
 * - purge au chargement aussi : un fichier resté sur disque pendant un arrêt
 *   ne dépasse jamais la fenêtre de rétention
 * - ordre = ordre d'ajout, pas de tri chronologique
 */

use crate::models::HistoryRecord;
use crate::store::{JsonSlot, StoreError};
use time::{Duration, OffsetDateTime};
use tracing::{error, info};

pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Millisecondes depuis l'epoch Unix
pub fn epoch_ms(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

pub struct HistoryLog {
    records: Vec<HistoryRecord>,
    retention: Duration,
    slot: JsonSlot,
}

impl HistoryLog {
    /// Charge puis purge immédiatement les entrées expirées
    pub fn load(slot: JsonSlot, retention: Duration, now: OffsetDateTime) -> Self {
        let records: Vec<HistoryRecord> = slot.load();
        let mut log = Self { records, retention, slot };

        let pruned = log.prune(now);
        if pruned > 0 {
            if let Err(e) = log.persist() {
                error!("[history] failed to persist after load-time prune: {}", e);
            }
        }
        info!("[history] loaded {} records ({} expired)", log.records.len(), pruned);
        log
    }

    pub fn persist(&self) -> Result<(), StoreError> {
        self.slot.persist(&self.records)
    }

    /// Retire toute entrée telle que `now - created_at > retention`.
    /// Retourne le nombre d'entrées supprimées.
    pub fn prune(&mut self, now: OffsetDateTime) -> usize {
        let now_ms = epoch_ms(now);
        let limit_ms = self.retention.whole_milliseconds() as i64;
        let before = self.records.len();
        self.records.retain(|r| now_ms - r.created_at <= limit_ms);
        before - self.records.len()
    }

    /// Ajoute, purge, persiste. L'entrée reste en mémoire même si le disque échoue.
    pub fn append(&mut self, record: HistoryRecord, now: OffsetDateTime) -> Result<(), StoreError> {
        info!("[history] recorded alert for {} at {}%", record.bin_id, record.percent_full);
        self.records.push(record);
        self.prune(now);
        self.persist()
    }

    pub fn list(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
