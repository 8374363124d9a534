//! BinWatch kernel : moteur d'alertes de remplissage des poubelles connectées.
//!
//! - registre durable des poubelles ([`registry`])
//! - état d'épisode d'alerte par poubelle ([`alert_state`])
//! - historique avec rétention glissante ([`history`])
//! - passes d'évaluation déclenchées de l'extérieur ([`evaluator`])
//! - ports externes : lecture ThingSpeak ([`source`]), notifications ([`notify`])

pub mod alert_state;
pub mod config;
pub mod evaluator;
pub mod health;
pub mod history;
pub mod http;
pub mod models;
pub mod mqtt;
pub mod notify;
pub mod registry;
pub mod source;
pub mod state;
pub mod store;
