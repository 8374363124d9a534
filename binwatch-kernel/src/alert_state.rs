/**
 * ALERT STATE STORE - Mémoire des épisodes d'alerte
 *
 * RÔLE : Pour chaque poubelle, retient si la notification de l'épisode en
 * cours a déjà été envoyée. C'est ce qui évite de spammer tant qu'une
 * poubelle reste pleine.
 *
 * Les mutations sont appliquées en mémoire d'abord, puis persistées :
 * une erreur disque est remontée à l'appelant mais ne défait pas l'état.
 */

use crate::models::AlertState;
use crate::store::{JsonSlot, StoreError};
use std::collections::HashMap;
use tracing::{debug, info};

pub type AlertStatesMap = HashMap<String, AlertState>;

pub struct AlertStateStore {
    states: AlertStatesMap,
    slot: JsonSlot,
}

impl AlertStateStore {
    pub fn load(slot: JsonSlot) -> Self {
        let states: AlertStatesMap = slot.load();
        let alerted = states.values().filter(|s| s.is_alerted()).count();
        info!("[alerts] loaded {} alert states ({} alerted)", states.len(), alerted);
        Self { states, slot }
    }

    pub fn persist(&self) -> Result<(), StoreError> {
        self.slot.persist(&self.states)
    }

    /// Entrée absente = `Clear`
    pub fn state(&self, bin_id: &str) -> AlertState {
        self.states.get(bin_id).copied().unwrap_or_default()
    }

    pub fn is_alerted(&self, bin_id: &str) -> bool {
        self.state(bin_id).is_alerted()
    }

    /// Ouvre un épisode. Retourne `Ok(false)` si déjà en alerte (rien à faire).
    pub fn mark_alerted(&mut self, bin_id: &str, now_ms: i64) -> Result<bool, StoreError> {
        if self.is_alerted(bin_id) {
            return Ok(false);
        }
        self.states.insert(bin_id.to_string(), AlertState::Alerted { since_ms: now_ms });
        debug!("[alerts] episode opened for {}", bin_id);
        self.persist()?;
        Ok(true)
    }

    /// Ferme l'épisode en cours. Idempotent : `Ok(false)` si déjà clear.
    pub fn clear(&mut self, bin_id: &str) -> Result<bool, StoreError> {
        if !self.is_alerted(bin_id) {
            return Ok(false);
        }
        self.states.insert(bin_id.to_string(), AlertState::Clear);
        debug!("[alerts] episode closed for {}", bin_id);
        self.persist()?;
        Ok(true)
    }

    /// Oublie une poubelle supprimée du registre
    pub fn forget(&mut self, bin_id: &str) -> Result<(), StoreError> {
        if self.states.remove(bin_id).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> &AlertStatesMap {
        &self.states
    }
}
