use parking_lot::Mutex;
use std::sync::Arc;

use crate::evaluator::AlertEvaluator;
use crate::source::ThingSpeakSource;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Évaluateur partagé entre handlers HTTP.
/// Mutex tokio : le verrou est tenu pendant toute une passe (awaits compris),
/// ce qui sérialise passes et CRUD du registre.
pub type SharedEvaluator<S = ThingSpeakSource> = Arc<tokio::sync::Mutex<AlertEvaluator<S>>>;

pub fn new_evaluator<S>(evaluator: AlertEvaluator<S>) -> SharedEvaluator<S> {
    Arc::new(tokio::sync::Mutex::new(evaluator))
}
