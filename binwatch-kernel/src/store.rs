/**
 * STORE - Emplacements JSON durables du kernel
 *
 * RÔLE :
 * Chaque store métier (bins, états d'alerte, historique) possède un fichier
 * JSON dans le data_dir. Ce module gère le chargement tolérant et la
 * réécriture complète à chaque mutation.
 *
 * FONCTIONNEMENT :
 * - Fichier absent → valeur par défaut (pas d'erreur)
 * - Fichier corrompu → valeur par défaut + warning (le fichier est écrasé au prochain persist)
 * - Persist = écriture dans `<fichier>.tmp` puis rename (pas de fichier à moitié écrit)
 */

use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Erreurs de persistance
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Un emplacement clé-valeur durable = un fichier JSON
#[derive(Debug, Clone)]
pub struct JsonSlot {
    path: PathBuf,
}

impl JsonSlot {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Emplacement `<dir>/<name>.json`
    pub fn in_dir<P: AsRef<Path>>(dir: P, name: &str) -> Self {
        Self::new(dir.as_ref().join(format!("{name}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Charge la valeur, ou `T::default()` si absente/illisible
    pub fn load<T: DeserializeOwned + Default>(&self) -> T {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("[store] {:?} absent, starting empty", self.path);
                return T::default();
            }
            Err(e) => {
                warn!("[store] failed to read {:?}: {}", self.path, e);
                return T::default();
            }
        };

        if content.trim().is_empty() {
            return T::default();
        }

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("[store] corrupt JSON in {:?}, starting empty: {}", self.path, e);
            T::default()
        })
    }

    /// Réécrit la structure complète
    pub fn persist<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(value)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
