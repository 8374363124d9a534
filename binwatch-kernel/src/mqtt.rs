use crate::config::MqttConf;
use rumqttc::{AsyncClient, Event, MqttOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tracing::{info, warn};

/// Capacité de la file de requêtes rumqttc
const REQUEST_QUEUE: usize = 10;

/// Client MQTT + état de la connexion tenu à jour par la boucle d'événements
#[derive(Clone)]
pub struct MqttLink {
    pub client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl MqttLink {
    /// Faux tant qu'aucun ConnAck n'a été reçu, et après chaque erreur réseau
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Crée le client MQTT du kernel et fait tourner sa boucle d'événements.
/// Sans boucle active, `publish` remplit la file mais rien ne part sur le réseau.
pub fn spawn_mqtt_client(conf: &MqttConf) -> MqttLink {
    let mut opts = MqttOptions::new(&conf.client_id, &conf.host, conf.port);
    opts.set_keep_alive(Duration::from_secs(15));
    let (client, mut eventloop) = AsyncClient::new(opts, REQUEST_QUEUE);
    let connected = Arc::new(AtomicBool::new(false));

    let target = format!("{}:{}", conf.host, conf.port);
    let flag = connected.clone();
    task::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(rumqttc::Incoming::ConnAck(_))) => {
                    flag.store(true, Ordering::Relaxed);
                    info!("[mqtt] connected to {}", target);
                }
                Ok(_) => {}
                Err(e) => {
                    if flag.swap(false, Ordering::Relaxed) {
                        warn!("[mqtt] connection to {} lost: {:?}", target, e);
                    } else {
                        warn!("[mqtt] connection error: {:?}", e);
                    }
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    MqttLink { client, connected }
}
