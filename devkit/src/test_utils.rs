/*!
Test Harness pour le kernel BinWatch

Facilite l'écriture de tests avec :
- Stores (bins, états, historique) dans un répertoire temporaire
- Source de niveaux scriptée partagée avec l'évaluateur
- Outbox inspectable : les alertes mises en file sont récupérables sans dispatcher
- Rechargement depuis le disque pour tester la persistance
*/

use crate::source_stub::ScriptedSource;
use anyhow::Result;
use binwatch_kernel::config::KernelConfig;
use binwatch_kernel::evaluator::{AlertEvaluator, PassKind, PassReport};
use binwatch_kernel::health::HealthTracker;
use binwatch_kernel::http::{ApiKey, AppState};
use binwatch_kernel::models::{AlertState, Bin, HistoryRecord};
use binwatch_kernel::notify::{AlertMessage, Outbox};
use binwatch_kernel::registry::RegistryError;
use binwatch_kernel::state::{new_evaluator, new_state, SharedEvaluator};
use tempfile::TempDir;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::info;

/// Harness de test complet autour d'un `AlertEvaluator<ScriptedSource>`
pub struct TestHarness {
    dir: TempDir,
    pub cfg: KernelConfig,
    pub source: ScriptedSource,
    pub health: HealthTracker,
    pub evaluator: SharedEvaluator<ScriptedSource>,
    outbox: Outbox,
    outbox_rx: mpsc::UnboundedReceiver<AlertMessage>,
}

impl TestHarness {
    /// Crée un harness avec la config par défaut
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Crée un harness en ajustant la config (seuil, rétention...)
    pub fn with_config(adjust: impl FnOnce(&mut KernelConfig)) -> Self {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("debug")
            .try_init()
            .ok(); // Init logging pour tests

        let dir = TempDir::new().expect("temp dir");
        let mut cfg = KernelConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
            ..KernelConfig::default()
        };
        adjust(&mut cfg);

        let source = ScriptedSource::new();
        let health = HealthTracker::new();
        let (outbox, outbox_rx) = Outbox::channel();
        let evaluator = AlertEvaluator::open(&cfg, source.clone(), outbox.clone(), health.clone(), OffsetDateTime::now_utc());

        Self {
            dir,
            cfg,
            source,
            health,
            evaluator: new_evaluator(evaluator),
            outbox,
            outbox_rx,
        }
    }

    pub fn data_dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Enregistre une poubelle (canal et clé factices)
    pub async fn register(&self, id: &str, lat: f64, lon: f64) -> Result<(), RegistryError> {
        let bin = Bin::new(id, format!("ch-{id}"), "READKEY", lat, lon);
        self.evaluator.lock().await.add_bin(bin)
    }

    /// Scripte les prochaines lectures d'une poubelle
    pub fn script(&self, bin_id: &str, readings: &[Option<u8>]) {
        self.source.script(bin_id, readings);
    }

    pub async fn pass(&self, kind: PassKind, at: OffsetDateTime) -> PassReport {
        let report = self.evaluator.lock().await.run_pass(kind, at).await;
        info!("🧪 {:?} pass: {} bins shown, {} alerts queued", kind, report.bins.len(), report.notifications_queued);
        report
    }

    /// Vide l'outbox : alertes mises en file depuis le dernier appel
    pub fn queued_alerts(&mut self) -> Vec<AlertMessage> {
        let mut out = Vec::new();
        while let Ok(message) = self.outbox_rx.try_recv() {
            out.push(message);
        }
        out
    }

    /// Vérifie le nombre d'alertes en file
    pub fn expect_alerts(&mut self, count: usize) -> Result<Vec<AlertMessage>> {
        let alerts = self.queued_alerts();
        if alerts.len() != count {
            anyhow::bail!("expected {} queued alerts, got {}: {:?}", count, alerts.len(),
                alerts.iter().map(|a| &a.bin_id).collect::<Vec<_>>());
        }
        Ok(alerts)
    }

    pub async fn history(&self, at: OffsetDateTime) -> Vec<HistoryRecord> {
        self.evaluator.lock().await.history_at(at).to_vec()
    }

    pub async fn state(&self, bin_id: &str) -> AlertState {
        self.evaluator.lock().await.states().state(bin_id)
    }

    pub async fn bin_ids(&self) -> Vec<String> {
        self.evaluator.lock().await.registry().list().iter().map(|b| b.id.clone()).collect()
    }

    /// Recharge les trois stores depuis le disque (simule un redémarrage)
    pub async fn reopen(&self, at: OffsetDateTime) {
        let fresh = AlertEvaluator::open(&self.cfg, self.source.clone(), self.outbox.clone(), self.health.clone(), at);
        *self.evaluator.lock().await = fresh;
        info!("🔄 evaluator reloaded from {:?}", self.dir.path());
    }

    /// État Axum partageant l'évaluateur du harness
    pub fn app_state(&self, api_key: Option<&str>) -> AppState<ScriptedSource> {
        AppState {
            evaluator: self.evaluator.clone(),
            cfg: new_state(self.cfg.clone()),
            health: self.health.clone(),
            api_key: ApiKey::new(api_key.map(str::to_string)),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
