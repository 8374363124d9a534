use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Référence opaque vers le canal ThingSpeak d'une poubelle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub channel_id: String,
    pub read_key: String,
}

/// Poubelle surveillée. Jamais modifiée après enregistrement (seulement supprimée).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub id: String,
    pub source: SourceRef,
    pub lat: f64,
    pub lon: f64,
}

impl Bin {
    pub fn new(id: impl Into<String>, channel_id: impl Into<String>, read_key: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            source: SourceRef { channel_id: channel_id.into(), read_key: read_key.into() },
            lat,
            lon,
        }
    }
}

/// Résultat d'un poll : `None` = lecture indisponible (réseau, parse...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelReading<'a> {
    pub bin_id: &'a str,
    pub percent_full: Option<u8>,
}

/// État d'alerte d'une poubelle, stocké comme valeur taguée (pas par présence de clé)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AlertState {
    #[default]
    Clear,
    /// Notification déjà envoyée pour l'épisode en cours
    Alerted { since_ms: i64 },
}

impl AlertState {
    pub fn is_alerted(&self) -> bool {
        matches!(self, AlertState::Alerted { .. })
    }
}

/// Entrée d'historique, immuable une fois ajoutée
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub bin_id: String,
    pub percent_full: u8,
    pub lat: f64,
    pub lon: f64,
    pub map_link: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub fired_at: OffsetDateTime,
    /// epoch ms, sert à la rétention
    pub created_at: i64,
}

/// Couleur de remplissage des cartes du dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FillBand {
    Green,
    Yellow,
    Orange,
    Red,
}

impl FillBand {
    pub fn classify(percent_full: u8) -> Self {
        match percent_full {
            0..=40 => FillBand::Green,
            41..=70 => FillBand::Yellow,
            71..=85 => FillBand::Orange,
            _ => FillBand::Red,
        }
    }
}

/// Transition appliquée à une poubelle pendant une passe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// CLEAR → ALERTED : historique + notification
    Opened,
    /// ALERTED → ALERTED : rien
    Sustained,
    /// ALERTED → CLEAR
    Cleared,
    /// CLEAR → CLEAR
    StayedClear,
    /// Lecture absente, aucun changement
    Skipped,
}

/// Vue d'une poubelle lue pendant une passe (cartes + marqueurs carte)
#[derive(Debug, Clone, Serialize)]
pub struct BinLevel {
    pub bin_id: String,
    pub percent_full: u8,
    pub lat: f64,
    pub lon: f64,
    pub band: FillBand,
    /// marqueur rouge si vrai, vert sinon
    pub alerting: bool,
    pub transition: Transition,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_band_thresholds() {
        assert_eq!(FillBand::classify(0), FillBand::Green);
        assert_eq!(FillBand::classify(40), FillBand::Green);
        assert_eq!(FillBand::classify(41), FillBand::Yellow);
        assert_eq!(FillBand::classify(70), FillBand::Yellow);
        assert_eq!(FillBand::classify(85), FillBand::Orange);
        assert_eq!(FillBand::classify(86), FillBand::Red);
        assert_eq!(FillBand::classify(100), FillBand::Red);
    }

    #[test]
    fn test_alert_state_is_tagged() {
        let json = serde_json::to_value(AlertState::Alerted { since_ms: 42 }).unwrap();
        assert_eq!(json["state"], "alerted");
        assert_eq!(json["since_ms"], 42);

        let clear: AlertState = serde_json::from_str(r#"{"state":"clear"}"#).unwrap();
        assert_eq!(clear, AlertState::Clear);
    }
}
