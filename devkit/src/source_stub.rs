/*!
Source de niveaux scriptée

Remplace ThingSpeak dans les tests : chaque poubelle a une file de lectures
(`Some(niveau)` ou `None` = lecture indisponible). Une file vide donne `None`.
Enregistre aussi l'ordre des appels pour vérifier le parcours séquentiel.
*/

use binwatch_kernel::models::Bin;
use binwatch_kernel::source::LevelSource;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ScriptedSource {
    queues: Arc<Mutex<HashMap<String, VecDeque<Option<u8>>>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute des lectures à la file d'une poubelle
    pub fn script(&self, bin_id: &str, readings: &[Option<u8>]) {
        self.queues
            .lock()
            .entry(bin_id.to_string())
            .or_default()
            .extend(readings.iter().copied());
    }

    /// Raccourci : uniquement des lectures valides
    pub fn script_levels(&self, bin_id: &str, levels: &[u8]) {
        let readings: Vec<Option<u8>> = levels.iter().map(|l| Some(*l)).collect();
        self.script(bin_id, &readings);
    }

    /// Ids des poubelles interrogées, dans l'ordre
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn remaining(&self, bin_id: &str) -> usize {
        self.queues.lock().get(bin_id).map(|q| q.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        self.queues.lock().clear();
        self.calls.lock().clear();
    }
}

impl LevelSource for ScriptedSource {
    async fn fetch_level(&self, bin: &Bin) -> Option<u8> {
        self.calls.lock().push(bin.id.clone());
        self.queues.lock().get_mut(&bin.id).and_then(|q| q.pop_front()).flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_readings_in_order() {
        let source = ScriptedSource::new();
        source.script("B1", &[Some(10), None, Some(90)]);
        let bin = Bin::new("B1", "1", "k", 0.0, 0.0);

        assert_eq!(source.fetch_level(&bin).await, Some(10));
        assert_eq!(source.fetch_level(&bin).await, None);
        assert_eq!(source.fetch_level(&bin).await, Some(90));
        // file épuisée
        assert_eq!(source.fetch_level(&bin).await, None);
        assert_eq!(source.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_clones_share_script() {
        let source = ScriptedSource::new();
        let handle = source.clone();
        handle.script_levels("B2", &[55]);

        let bin = Bin::new("B2", "2", "k", 0.0, 0.0);
        assert_eq!(source.remaining("B2"), 1);
        assert_eq!(source.fetch_level(&bin).await, Some(55));
        assert_eq!(handle.calls(), vec!["B2".to_string()]);
    }
}
