/*!
Notifier enregistreur

Remplace Telegram/MQTT : garde chaque tentative d'envoi en mémoire et peut
simuler un endpoint en panne pour vérifier qu'un échec ne touche pas l'état.
*/

use binwatch_kernel::notify::{AlertMessage, Notifier, NotifyError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    attempts: Arc<Mutex<Vec<AlertMessage>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifier dont chaque envoi échoue (HTTP 503 simulé)
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.set_failing(true);
        notifier
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Toutes les tentatives, réussies ou non
    pub fn attempts(&self) -> Vec<AlertMessage> {
        self.attempts.lock().clone()
    }

    pub fn attempted_bins(&self) -> Vec<String> {
        self.attempts.lock().iter().map(|m| m.bin_id.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        self.attempts.lock().push(message.clone());
        if self.failing.load(Ordering::Relaxed) {
            info!("📤 [MOCK] delivery refused for {}", message.bin_id);
            return Err(NotifyError::Status(503));
        }
        info!("📤 [MOCK] delivered alert for {}", message.bin_id);
        Ok(())
    }
}
