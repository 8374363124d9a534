/**
 * BIN REGISTRY - Registre durable des poubelles surveillées
 *
 * RÔLE : Enregistrement / suppression / listing des poubelles, avec leurs
 * identifiants ThingSpeak et coordonnées GPS.
 *
 * INVARIANT : un `id` n'apparaît jamais deux fois dans le registre.
 * L'ordre d'insertion est conservé (affichage stable des cartes et marqueurs).
 */

use crate::models::Bin;
use crate::store::{JsonSlot, StoreError};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Bin id already exists: {0}")]
    DuplicateId(String),
    #[error("Bin not found: {0}")]
    NotFound(String),
    #[error("Invalid bin: {0}")]
    InvalidBin(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct BinRegistry {
    bins: Vec<Bin>,
    slot: JsonSlot,
}

impl BinRegistry {
    /// Charge le registre depuis son fichier (vide si absent/corrompu)
    pub fn load(slot: JsonSlot) -> Self {
        let bins: Vec<Bin> = slot.load();
        info!("[bins] loaded {} bins from {:?}", bins.len(), slot.path());
        Self { bins, slot }
    }

    pub fn persist(&self) -> Result<(), StoreError> {
        self.slot.persist(&self.bins)
    }

    /// Ajoute une poubelle après validation. Les champs texte sont trimés.
    pub fn add(&mut self, bin: Bin) -> Result<(), RegistryError> {
        let bin = normalize(bin)?;

        if self.bins.iter().any(|b| b.id == bin.id) {
            return Err(RegistryError::DuplicateId(bin.id));
        }

        self.bins.push(bin);
        if let Err(e) = self.persist() {
            self.bins.pop();
            return Err(e.into());
        }
        if let Some(bin) = self.bins.last() {
            info!("[bins] registered bin {} ({}, {})", bin.id, bin.lat, bin.lon);
        }
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<Bin, RegistryError> {
        let id = id.trim();
        let Some(pos) = self.bins.iter().position(|b| b.id == id) else {
            return Err(RegistryError::NotFound(id.to_string()));
        };

        let removed = self.bins.remove(pos);
        if let Err(e) = self.persist() {
            self.bins.insert(pos, removed);
            return Err(e.into());
        }
        info!("[bins] deleted bin {}", removed.id);
        Ok(removed)
    }

    pub fn list(&self) -> &[Bin] {
        &self.bins
    }

    pub fn get(&self, id: &str) -> Option<&Bin> {
        self.bins.iter().find(|b| b.id == id)
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

fn normalize(mut bin: Bin) -> Result<Bin, RegistryError> {
    bin.id = bin.id.trim().to_string();
    bin.source.channel_id = bin.source.channel_id.trim().to_string();
    bin.source.read_key = bin.source.read_key.trim().to_string();

    if bin.id.is_empty() {
        return Err(RegistryError::InvalidBin("id is empty".into()));
    }
    if bin.source.channel_id.is_empty() {
        return Err(RegistryError::InvalidBin("channel_id is empty".into()));
    }
    if bin.source.read_key.is_empty() {
        return Err(RegistryError::InvalidBin("read_key is empty".into()));
    }
    if !bin.lat.is_finite() || !bin.lon.is_finite() {
        return Err(RegistryError::InvalidBin("coordinates must be numbers".into()));
    }
    Ok(bin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> BinRegistry {
        BinRegistry::load(JsonSlot::in_dir(dir.path(), "bins"))
    }

    #[test]
    fn test_add_rejects_duplicate_id() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry(&dir);

        reg.add(Bin::new("B1", "100", "KEY", 12.9, 77.6)).unwrap();
        let err = reg.add(Bin::new("B1", "200", "KEY2", 1.0, 2.0)).unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateId(id) if id == "B1"));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.list()[0].source.channel_id, "100");
    }

    #[test]
    fn test_add_trims_before_uniqueness_check() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry(&dir);

        reg.add(Bin::new("B1", "100", "KEY", 0.0, 0.0)).unwrap();
        let err = reg.add(Bin::new("  B1 ", "100", "KEY", 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateId(_)));
    }

    #[test]
    fn test_add_validates_fields() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry(&dir);

        assert!(matches!(reg.add(Bin::new("", "1", "k", 0.0, 0.0)), Err(RegistryError::InvalidBin(_))));
        assert!(matches!(reg.add(Bin::new("B", " ", "k", 0.0, 0.0)), Err(RegistryError::InvalidBin(_))));
        assert!(matches!(reg.add(Bin::new("B", "1", "", 0.0, 0.0)), Err(RegistryError::InvalidBin(_))));
        assert!(matches!(reg.add(Bin::new("B", "1", "k", f64::NAN, 0.0)), Err(RegistryError::InvalidBin(_))));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_remove_unknown_id() {
        let dir = TempDir::new().unwrap();
        let mut reg = registry(&dir);
        reg.add(Bin::new("B1", "1", "k", 0.0, 0.0)).unwrap();

        assert!(matches!(reg.remove("B2"), Err(RegistryError::NotFound(_))));
        assert_eq!(reg.len(), 1);

        let removed = reg.remove("B1").unwrap();
        assert_eq!(removed.id, "B1");
        assert!(reg.is_empty());
    }

    #[test]
    fn test_round_trip_keeps_order() {
        let dir = TempDir::new().unwrap();
        {
            let mut reg = registry(&dir);
            reg.add(Bin::new("C", "3", "k", 3.0, 3.5)).unwrap();
            reg.add(Bin::new("A", "1", "k", 1.0, 1.5)).unwrap();
            reg.add(Bin::new("B", "2", "k", 2.0, 2.5)).unwrap();
            reg.remove("A").unwrap();
        }

        let reloaded = registry(&dir);
        let ids: Vec<&str> = reloaded.list().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["C", "B"]);
        assert_eq!(reloaded.get("B").unwrap().lon, 2.5);
    }
}
