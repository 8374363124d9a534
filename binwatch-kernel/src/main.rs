/**
 * BINWATCH KERNEL - Point d'entrée principal du serveur
 *
 * RÔLE : Orchestration de tous les modules : config, stores, source
 * ThingSpeak, canaux de notification, API HTTP.
 *
 * ARCHITECTURE : API REST (déclencheur des passes) + outbox de notifications
 * consommée par une tâche dédiée.
 */

use binwatch_kernel::config::load_config;
use binwatch_kernel::evaluator::AlertEvaluator;
use binwatch_kernel::health::HealthTracker;
use binwatch_kernel::http::{self, ApiKey, AppState};
use binwatch_kernel::mqtt::spawn_mqtt_client;
use binwatch_kernel::notify::{spawn_dispatcher, Channels, Outbox};
use binwatch_kernel::source::ThingSpeakSource;
use binwatch_kernel::state::{new_evaluator, new_state};

use anyhow::Context;
use std::net::SocketAddr;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;

    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("failed to create data dir {}", cfg.data_dir))?;

    let health = HealthTracker::new();

    // canaux de notification + dispatcher (délai propre, distinct de ThingSpeak)
    let http_client = reqwest::Client::builder()
        .timeout(cfg.notify_timeout())
        .build()
        .context("failed to build HTTP client")?;
    let mqtt_link = cfg.mqtt.as_ref().map(spawn_mqtt_client);
    let channels = Channels::from_config(&cfg, http_client, mqtt_link);
    info!("[kernel] notification channels: {:?}", channels.names());

    let (outbox, rx) = Outbox::channel();
    let _dispatcher = spawn_dispatcher(channels, rx, health.clone());

    // source ThingSpeak + stores
    let source = ThingSpeakSource::new(&cfg.thingspeak).context("failed to build ThingSpeak client")?;
    let evaluator = AlertEvaluator::open(&cfg, source, outbox, health.clone(), OffsetDateTime::now_utc());
    info!(
        "[kernel] {} bins registered, alert level {}%, history kept {} days",
        evaluator.registry().len(),
        cfg.alert_level,
        cfg.history_retention_days
    );

    let addr: SocketAddr = cfg.listen.parse().with_context(|| format!("invalid listen address {}", cfg.listen))?;

    // fabrique l'état unique pour Axum
    let app_state = AppState {
        evaluator: new_evaluator(evaluator),
        cfg: new_state(cfg),
        health,
        api_key: ApiKey::from_env(),
    };

    let app = http::build_router(app_state);

    info!("[kernel] listening on http://{addr}");
    let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
