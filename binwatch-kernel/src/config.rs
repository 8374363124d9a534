use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

use crate::history::DEFAULT_RETENTION_DAYS;

pub const DEFAULT_ALERT_LEVEL: u8 = 85;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: String,
    pub data_dir: String,
    /// seuil inclusif en %
    pub alert_level: u8,
    pub history_retention_days: i64,
    pub map_link_base: String,
    /// délai max d'un envoi, par canal de notification
    pub notify_timeout_secs: u64,
    pub thingspeak: ThingSpeakConf,
    pub telegram: Option<TelegramConf>,
    pub mqtt: Option<MqttConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ThingSpeakConf {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TelegramConf {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_alert_topic")]
    pub topic: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".into()
}

fn default_alert_topic() -> String {
    "binwatch/alerts@v1".into()
}

fn default_client_id() -> String {
    "binwatch-kernel".into()
}

impl Default for ThingSpeakConf {
    fn default() -> Self {
        Self {
            base_url: "https://api.thingspeak.com".into(),
            timeout_secs: 10,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            data_dir: "./data".into(),
            alert_level: DEFAULT_ALERT_LEVEL,
            history_retention_days: DEFAULT_RETENTION_DAYS,
            map_link_base: "https://www.google.com/maps?q=".into(),
            notify_timeout_secs: 10,
            thingspeak: ThingSpeakConf::default(),
            telegram: None,
            mqtt: None,
        }
    }
}

impl KernelConfig {
    pub fn retention(&self) -> time::Duration {
        time::Duration::days(self.history_retention_days)
    }

    pub fn notify_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.notify_timeout_secs)
    }

    /// Parse du YAML ; les champs absents prennent leur valeur par défaut
    pub fn from_yaml(txt: &str) -> Result<Self, serde_yaml::Error> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(txt)
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("BINWATCH_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    load_config_from(&path).await
}

/// Fichier absent, illisible ou invalide → config par défaut (avec warning)
pub async fn load_config_from(path: &str) -> KernelConfig {
    if !Path::new(path).exists() {
        warn!("[kernel] no {} found, using default config", path);
        return KernelConfig::default();
    }
    let txt = match fs::read_to_string(path).await {
        Ok(txt) => txt,
        Err(e) => {
            warn!("[kernel] cannot read config {}: {}, using default config", path, e);
            return KernelConfig::default();
        }
    };
    KernelConfig::from_yaml(&txt).unwrap_or_else(|e| {
        warn!("[kernel] invalid config {}: {}", path, e);
        KernelConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.alert_level, 85);
        assert_eq!(cfg.history_retention_days, 7);
        assert!(cfg.telegram.is_none());
        assert_eq!(cfg.retention(), time::Duration::days(7));
        assert_eq!(cfg.notify_timeout(), std::time::Duration::from_secs(10));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = KernelConfig::from_yaml(
            r#"
alert_level: 90
telegram:
  bot_token: "123:abc"
  chat_id: "-100"
mqtt:
  host: broker.local
  port: 1883
"#,
        )
        .unwrap();

        assert_eq!(cfg.alert_level, 90);
        assert_eq!(cfg.data_dir, "./data");
        assert_eq!(cfg.thingspeak.timeout_secs, 10);
        let tg = cfg.telegram.unwrap();
        assert_eq!(tg.api_base, "https://api.telegram.org");
        assert_eq!(cfg.mqtt.unwrap().topic, "binwatch/alerts@v1");
    }

    #[test]
    fn test_notify_timeout_is_separate_from_thingspeak() {
        let cfg = KernelConfig::from_yaml("notify_timeout_secs: 3\nthingspeak:\n  timeout_secs: 20\n").unwrap();
        assert_eq!(cfg.notify_timeout(), std::time::Duration::from_secs(3));
        assert_eq!(cfg.thingspeak.timeout_secs, 20);
    }

    #[tokio::test]
    async fn test_unreadable_config_falls_back_to_default() {
        // un répertoire existe mais ne se lit pas comme un fichier
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = load_config_from(&dir.path().to_string_lossy()).await;
        assert_eq!(cfg.alert_level, DEFAULT_ALERT_LEVEL);
        assert_eq!(cfg.listen, "0.0.0.0:8080");
    }

    #[tokio::test]
    async fn test_config_file_is_read() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kernel.yaml");
        std::fs::write(&path, "alert_level: 70\n").unwrap();

        let cfg = load_config_from(&path.to_string_lossy()).await;
        assert_eq!(cfg.alert_level, 70);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let cfg = KernelConfig::from_yaml("  \n").unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:8080");
    }
}
