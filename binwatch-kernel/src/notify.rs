/**
 * NOTIFICATIONS - Envoi des alertes vers l'extérieur (Telegram, MQTT)
 *
 * RÔLE :
 * L'évaluateur dépose un `AlertMessage` dans l'outbox et continue sa passe.
 * Une tâche de dispatch dédiée consomme l'outbox et appelle le `Notifier`.
 *
 * CONTRAT :
 * - fire-and-forget : l'échec d'envoi est journalisé et compté, jamais remonté
 * - aucun rollback de l'état d'alerte ou de l'historique
 * - aucun retry
 * - chaque canal a son propre délai : un canal bloqué n'empêche pas les autres
 */

use crate::config::{KernelConfig, TelegramConf};
use crate::health::HealthTracker;
use crate::models::HistoryRecord;
use crate::mqtt::MqttLink;
use rumqttc::QoS;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint answered {0}")]
    Status(u16),
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("MQTT broker not connected")]
    Disconnected,
    #[error("{0} channel timed out after {1:?}")]
    Timeout(&'static str, Duration),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Intention de notification produite à l'ouverture d'un épisode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertMessage {
    pub bin_id: String,
    pub percent_full: u8,
    pub lat: f64,
    pub lon: f64,
    pub map_link: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub fired_at: OffsetDateTime,
}

impl AlertMessage {
    pub fn from_record(record: &HistoryRecord) -> Self {
        Self {
            bin_id: record.bin_id.clone(),
            percent_full: record.percent_full,
            lat: record.lat,
            lon: record.lon,
            map_link: record.map_link.clone(),
            text: record.message.clone(),
            fired_at: record.fired_at,
        }
    }
}

pub fn map_link(base: &str, lat: f64, lon: f64) -> String {
    format!("{base}{lat},{lon}")
}

pub fn format_fired_at(t: OffsetDateTime) -> String {
    t.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC"))
        .unwrap_or_else(|_| t.to_string())
}

/// Texte fixe : en-tête + id, niveau, position, lien carte, heure
pub fn format_alert_text(bin_id: &str, percent_full: u8, lat: f64, lon: f64, map_link: &str, fired_at: OffsetDateTime) -> String {
    format!(
        "🚨 BIN ALERT 🚨\nBin ID : {bin_id}\nLevel  : {percent_full}%\nLocation : {lat}, {lon}\nMap : {map_link}\nTime : {}",
        format_fired_at(fired_at)
    )
}

/// Port de notification : un seul appel, un résultat
pub trait Notifier: Send + Sync {
    fn send(&self, message: &AlertMessage) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

// ============ CANAUX ============

pub struct TelegramNotifier {
    client: reqwest::Client,
    conf: TelegramConf,
}

#[derive(Serialize)]
struct TelegramPayload<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramNotifier {
    pub fn new(client: reqwest::Client, conf: TelegramConf) -> Self {
        Self { client, conf }
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.conf.api_base.trim_end_matches('/'), self.conf.bot_token)
    }
}

impl Notifier for TelegramNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        let payload = TelegramPayload { chat_id: &self.conf.chat_id, text: &message.text };
        let response = self.client.post(self.endpoint()).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

pub struct MqttNotifier {
    link: MqttLink,
    topic: String,
}

impl MqttNotifier {
    pub fn new(link: MqttLink, topic: impl Into<String>) -> Self {
        Self { link, topic: topic.into() }
    }
}

impl Notifier for MqttNotifier {
    /// Refuse quand le broker est injoignable ; `try_publish` échoue au lieu
    /// d'attendre quand la file rumqttc est pleine.
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        if !self.link.is_connected() {
            return Err(NotifyError::Disconnected);
        }
        let payload = serde_json::to_string(message)?;
        self.link.client.try_publish(&self.topic, QoS::AtLeastOnce, false, payload)?;
        Ok(())
    }
}

/// Aucun canal configuré : l'alerte est seulement journalisée
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        info!("[notify] (no channel) {}", message.text.replace('\n', " | "));
        Ok(())
    }
}

pub enum Channel {
    Telegram(TelegramNotifier),
    Mqtt(MqttNotifier),
    Log(LogNotifier),
}

impl Channel {
    fn name(&self) -> &'static str {
        match self {
            Channel::Telegram(_) => "telegram",
            Channel::Mqtt(_) => "mqtt",
            Channel::Log(_) => "log",
        }
    }

    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        match self {
            Channel::Telegram(n) => n.send(message).await,
            Channel::Mqtt(n) => n.send(message).await,
            Channel::Log(n) => n.send(message).await,
        }
    }
}

/// Envoie sur tous les canaux configurés ; échoue si au moins un canal échoue
pub struct Channels {
    channels: Vec<Channel>,
    timeout: Duration,
}

impl Channels {
    pub fn new(channels: Vec<Channel>, timeout: Duration) -> Self {
        let channels = if channels.is_empty() { vec![Channel::Log(LogNotifier)] } else { channels };
        Self { channels, timeout }
    }

    /// Construit les canaux depuis la config. Le client MQTT est fourni par l'appelant
    /// (sa boucle d'événements doit déjà tourner).
    pub fn from_config(cfg: &KernelConfig, http: reqwest::Client, mqtt: Option<MqttLink>) -> Self {
        let mut channels = Vec::new();
        if let Some(tg) = &cfg.telegram {
            channels.push(Channel::Telegram(TelegramNotifier::new(http, tg.clone())));
        }
        if let (Some(link), Some(conf)) = (mqtt, &cfg.mqtt) {
            channels.push(Channel::Mqtt(MqttNotifier::new(link, conf.topic.clone())));
        }
        Self::new(channels, cfg.notify_timeout())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.channels.iter().map(Channel::name).collect()
    }
}

impl Notifier for Channels {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        let mut first_error = None;
        for channel in &self.channels {
            let outcome = match tokio::time::timeout(self.timeout, channel.send(message)).await {
                Ok(result) => result,
                Err(_) => Err(NotifyError::Timeout(channel.name(), self.timeout)),
            };
            if let Err(e) = outcome {
                warn!("[notify] {} delivery failed for {}: {}", channel.name(), message.bin_id, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ============ OUTBOX + DISPATCH ============

/// Côté évaluateur : dépôt non bloquant des intentions de notification
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<AlertMessage>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AlertMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Ne bloque jamais. Si le dispatcher est arrêté, l'alerte est perdue (journalisé).
    pub fn queue(&self, message: AlertMessage) -> bool {
        match self.tx.send(message) {
            Ok(()) => true,
            Err(mpsc::error::SendError(message)) => {
                error!("[notify] dispatcher gone, dropping alert for {}", message.bin_id);
                false
            }
        }
    }
}

/// Démarre la tâche de dispatch. Elle s'arrête quand toutes les `Outbox` sont fermées.
pub fn spawn_dispatcher<N>(notifier: N, mut rx: mpsc::UnboundedReceiver<AlertMessage>, health: HealthTracker) -> JoinHandle<()>
where
    N: Notifier + 'static,
{
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match notifier.send(&message).await {
                Ok(()) => {
                    health.record_delivery(true);
                    info!("[notify] alert sent for {} ({}%)", message.bin_id, message.percent_full);
                }
                Err(e) => {
                    health.record_delivery(false);
                    warn!("[notify] alert for {} not delivered: {}", message.bin_id, e);
                }
            }
        }
        info!("[notify] dispatcher stopped");
    })
}
