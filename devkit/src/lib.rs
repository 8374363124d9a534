/*!
# BinWatch DevKit - Doublures et utilitaires de test

Bibliothèque facilitant les tests du kernel sans réseau :
- Source de niveaux scriptée (pas de ThingSpeak)
- Notifier enregistreur (pas de Telegram ni de broker MQTT)
- Harness complet : stores dans un répertoire temporaire + outbox inspectable
*/

pub mod source_stub;
pub mod notifier_stub;
pub mod test_utils;

pub use notifier_stub::RecordingNotifier;
pub use source_stub::ScriptedSource;
pub use test_utils::TestHarness;
