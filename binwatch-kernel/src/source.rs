/**
 * LEVEL SOURCE - Lecture du niveau de remplissage d'une poubelle
 *
 * RÔLE : Une requête vers le canal ThingSpeak de la poubelle, dernière mesure
 * (`field1`). Toute erreur (réseau, timeout, statut HTTP, payload non entier)
 * donne une lecture absente : la panne d'une poubelle n'interrompt jamais une passe.
 *
 * Pas de retry dans une passe.
 */

use crate::config::ThingSpeakConf;
use crate::models::Bin;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Port de lecture des niveaux. `None` = lecture indisponible.
pub trait LevelSource: Send + Sync {
    fn fetch_level(&self, bin: &Bin) -> impl Future<Output = Option<u8>> + Send;
}

/// Raisons d'une lecture indisponible (journalisées puis ramenées à `None`)
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("field {0} missing from feed")]
    MissingField(String),
    #[error("not an integer: {0:?}")]
    NotInteger(String),
    #[error("level out of range: {0}")]
    OutOfRange(i64),
}

/// Dernière entrée d'un feed ThingSpeak (seuls les champs utiles)
#[derive(Debug, Deserialize)]
struct LastFeed {
    field1: Option<serde_json::Value>,
}

pub struct ThingSpeakSource {
    client: reqwest::Client,
    base_url: String,
}

impl ThingSpeakSource {
    pub fn new(conf: &ThingSpeakConf) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(conf.timeout_secs))
            .user_agent("binwatch-kernel")
            .build()?;
        Ok(Self {
            client,
            base_url: conf.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn feed_url(&self, bin: &Bin) -> String {
        format!("{}/channels/{}/feeds/last.json", self.base_url, bin.source.channel_id)
    }

    async fn try_fetch(&self, bin: &Bin) -> Result<u8, FetchError> {
        let response = self
            .client
            .get(self.feed_url(bin))
            .query(&[("api_key", bin.source.read_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let feed: LastFeed = response.json().await?;
        let raw = feed.field1.ok_or_else(|| FetchError::MissingField("field1".into()))?;
        parse_level(&raw)
    }
}

impl LevelSource for ThingSpeakSource {
    async fn fetch_level(&self, bin: &Bin) -> Option<u8> {
        match self.try_fetch(bin).await {
            Ok(level) => {
                debug!("[source] {} -> {}%", bin.id, level);
                Some(level)
            }
            Err(e) => {
                warn!("[source] reading unavailable for {}: {}", bin.id, e);
                None
            }
        }
    }
}

/// Lit un niveau comme un entier base 10 en tête de chaîne
/// ("87.6" → 87, " 42 " → 42, "abc" → erreur), borné à [0,100].
pub fn parse_level(raw: &serde_json::Value) -> Result<u8, FetchError> {
    let text = match raw {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => return Err(FetchError::NotInteger(other.to_string())),
    };

    let trimmed = text.trim();
    let (sign, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1, &trimmed[1..]),
        Some(b'+') => (1, &trimmed[1..]),
        _ => (1, trimmed),
    };
    let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
    if end == 0 {
        return Err(FetchError::NotInteger(text));
    }

    let value: i64 = digits[..end]
        .parse::<i64>()
        .map(|v| v * sign)
        .map_err(|_| FetchError::NotInteger(text.clone()))?;

    u8::try_from(value)
        .ok()
        .filter(|v| *v <= 100)
        .ok_or(FetchError::OutOfRange(value))
}
