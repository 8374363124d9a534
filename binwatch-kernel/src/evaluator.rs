/*
 * ALERT EVALUATOR - Machine à états d'alerte par poubelle
 *
 * RÔLE :
 * Pour chaque poubelle du registre (dans l'ordre du registre) : lecture du
 * niveau, classification contre le seuil, mise à jour de l'état d'épisode,
 * ajout à l'historique et notification à l'ouverture d'un épisode.
 *
 * ÉTATS : CLEAR / ALERTED (seuil inclusif, 85% par défaut)
 * - CLEAR   + niveau >= seuil → ALERTED (historique + notification)
 * - ALERTED + niveau >= seuil → ALERTED (rien : pas de spam)
 * - *       + niveau <  seuil → CLEAR
 * - lecture absente          → aucun changement, poubelle ignorée
 *
 * Les passes sont déclenchées de l'extérieur (API), jamais sur timer, et
 * traitent les poubelles une par une, sans parallélisme.
 */

use crate::alert_state::AlertStateStore;
use crate::config::KernelConfig;
use crate::health::{HealthTracker, StoreCounts};
use crate::history::{epoch_ms, HistoryLog};
use crate::models::{Bin, BinLevel, FillBand, HistoryRecord, LevelReading, Transition};
use crate::notify::{format_alert_text, map_link, AlertMessage, Outbox};
use crate::registry::{BinRegistry, RegistryError};
use crate::source::LevelSource;
use crate::store::JsonSlot;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    /// toutes les poubelles lues
    Levels,
    /// seulement les poubelles au-dessus du seuil
    Alerts,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub kind: PassKind,
    #[serde(with = "time::serde::rfc3339")]
    pub ran_at: OffsetDateTime,
    pub bins: Vec<BinLevel>,
    /// poubelles dont la lecture a échoué pendant la passe
    pub unavailable: Vec<String>,
    pub notifications_queued: usize,
}

#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    pub alert_level: u8,
    pub map_link_base: String,
}

impl EvaluatorSettings {
    pub fn from_config(cfg: &KernelConfig) -> Self {
        Self {
            alert_level: cfg.alert_level,
            map_link_base: cfg.map_link_base.clone(),
        }
    }
}

pub struct AlertEvaluator<S> {
    registry: BinRegistry,
    states: AlertStateStore,
    history: HistoryLog,
    source: S,
    outbox: Outbox,
    settings: EvaluatorSettings,
    health: HealthTracker,
}

impl<S: LevelSource> AlertEvaluator<S> {
    pub fn new(
        registry: BinRegistry,
        states: AlertStateStore,
        history: HistoryLog,
        source: S,
        outbox: Outbox,
        settings: EvaluatorSettings,
        health: HealthTracker,
    ) -> Self {
        Self { registry, states, history, source, outbox, settings, health }
    }

    /// Charge les trois stores depuis `cfg.data_dir`
    pub fn open(cfg: &KernelConfig, source: S, outbox: Outbox, health: HealthTracker, now: OffsetDateTime) -> Self {
        let dir = &cfg.data_dir;
        let registry = BinRegistry::load(JsonSlot::in_dir(dir, "bins"));
        let states = AlertStateStore::load(JsonSlot::in_dir(dir, "alert_states"));
        let history = HistoryLog::load(JsonSlot::in_dir(dir, "history"), cfg.retention(), now);
        let evaluator = Self::new(registry, states, history, source, outbox, EvaluatorSettings::from_config(cfg), health);
        evaluator.publish_counts();
        evaluator
    }

    pub fn registry(&self) -> &BinRegistry {
        &self.registry
    }

    pub fn states(&self) -> &AlertStateStore {
        &self.states
    }

    pub fn settings(&self) -> &EvaluatorSettings {
        &self.settings
    }

    pub fn store_counts(&self) -> StoreCounts {
        StoreCounts {
            bins: self.registry.len(),
            alerted: self.states.snapshot().values().filter(|s| s.is_alerted()).count(),
            history: self.history.len(),
        }
    }

    fn publish_counts(&self) {
        self.health.record_counts(self.store_counts());
    }

    pub fn add_bin(&mut self, bin: Bin) -> Result<(), RegistryError> {
        self.registry.add(bin)?;
        self.publish_counts();
        Ok(())
    }

    /// Supprime la poubelle et oublie son état d'alerte : un id réenregistré repart CLEAR
    pub fn remove_bin(&mut self, id: &str) -> Result<Bin, RegistryError> {
        let removed = self.registry.remove(id)?;
        if let Err(e) = self.states.forget(&removed.id) {
            error!("[evaluator] failed to persist alert states after removing {}: {}", removed.id, e);
        }
        self.publish_counts();
        Ok(removed)
    }

    /// Purge puis liste l'historique (ordre d'ajout)
    pub fn history_at(&mut self, now: OffsetDateTime) -> &[HistoryRecord] {
        if self.history.prune(now) > 0 {
            if let Err(e) = self.history.persist() {
                error!("[evaluator] failed to persist pruned history: {}", e);
            }
            self.publish_counts();
        }
        self.history.list()
    }

    /// Applique une lecture à la machine à états. Les erreurs disque sont
    /// journalisées : l'état en mémoire fait foi pour la suite de la passe.
    pub fn apply_reading(&mut self, bin: &Bin, reading: LevelReading<'_>, now: OffsetDateTime) -> Transition {
        let Some(level) = reading.percent_full else {
            return Transition::Skipped;
        };

        if level < self.settings.alert_level {
            return match self.states.clear(&bin.id) {
                Ok(true) => Transition::Cleared,
                Ok(false) => Transition::StayedClear,
                Err(e) => {
                    error!("[evaluator] failed to persist cleared state for {}: {}", bin.id, e);
                    Transition::Cleared
                }
            };
        }

        if self.states.is_alerted(&bin.id) {
            return Transition::Sustained;
        }

        if let Err(e) = self.states.mark_alerted(&bin.id, epoch_ms(now)) {
            error!("[evaluator] failed to persist alert state for {}: {}", bin.id, e);
        }

        let record = self.build_record(bin, level, now);
        let message = AlertMessage::from_record(&record);
        if let Err(e) = self.history.append(record, now) {
            error!("[evaluator] failed to persist history for {}: {}", bin.id, e);
        }
        self.outbox.queue(message);

        info!("[evaluator] bin {} reached {}% (threshold {}%), alert fired", bin.id, level, self.settings.alert_level);
        Transition::Opened
    }

    fn build_record(&self, bin: &Bin, level: u8, now: OffsetDateTime) -> HistoryRecord {
        let link = map_link(&self.settings.map_link_base, bin.lat, bin.lon);
        let message = format_alert_text(&bin.id, level, bin.lat, bin.lon, &link, now);
        HistoryRecord {
            id: Uuid::new_v4(),
            bin_id: bin.id.clone(),
            percent_full: level,
            lat: bin.lat,
            lon: bin.lon,
            map_link: link,
            message,
            fired_at: now,
            created_at: epoch_ms(now),
        }
    }

    /// Passe complète sur le registre, séquentielle, sans annulation possible
    pub async fn run_pass(&mut self, kind: PassKind, now: OffsetDateTime) -> PassReport {
        let bins = self.registry.list().to_vec();
        let mut report = PassReport {
            kind,
            ran_at: now,
            bins: Vec::new(),
            unavailable: Vec::new(),
            notifications_queued: 0,
        };

        for bin in &bins {
            let percent_full = self.source.fetch_level(bin).await;
            let reading = LevelReading { bin_id: &bin.id, percent_full };
            let transition = self.apply_reading(bin, reading, now);

            let Some(level) = percent_full else {
                report.unavailable.push(bin.id.clone());
                continue;
            };

            if transition == Transition::Opened {
                report.notifications_queued += 1;
            }

            let alerting = level >= self.settings.alert_level;
            if kind == PassKind::Alerts && !alerting {
                continue;
            }
            report.bins.push(BinLevel {
                bin_id: bin.id.clone(),
                percent_full: level,
                lat: bin.lat,
                lon: bin.lon,
                band: FillBand::classify(level),
                alerting,
                transition,
            });
        }

        if !report.unavailable.is_empty() {
            warn!("[evaluator] {} of {} bins unavailable this pass", report.unavailable.len(), bins.len());
        }
        info!(
            "[evaluator] {:?} pass done: {} shown, {} alerts queued",
            kind,
            report.bins.len(),
            report.notifications_queued
        );
        self.health.record_pass(now);
        self.publish_counts();
        report
    }

    pub async fn levels_pass(&mut self) -> PassReport {
        self.run_pass(PassKind::Levels, OffsetDateTime::now_utc()).await
    }

    pub async fn alerts_pass(&mut self) -> PassReport {
        self.run_pass(PassKind::Alerts, OffsetDateTime::now_utc()).await
    }
}
