//! MQTT broker connection.
//!
//! A background task polls the rumqttc event loop and forwards every
//! relevant packet as a [`BusEvent`] over a bounded channel. The pipeline
//! is the only receiver, so all message handling happens in one place and
//! in delivery order.
//!
//! Protocol levels 3 and 4 use the MQTT 3.1.1 client, level 5 uses the
//! MQTT 5.0 client. Both produce the same events.

use std::time::Duration;

use bridge_core::Result;
use rumqttc::v5::mqttbytes::v5::Packet as V5Packet;
use rumqttc::v5::mqttbytes::QoS as V5QoS;
use rumqttc::{
    v5, AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    Transport,
};
use telemetry::{health, metrics};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MqttConfig;
use crate::events::{classify, classify_v5, describe, describe_v5, BusEvent, ConnectionErrorKind};
use crate::subscriptions::SubscriptionTracker;

/// How long `disconnect` waits for the DISCONNECT packet to be flushed.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

enum BusClient {
    V4(AsyncClient),
    V5(v5::AsyncClient),
}

impl BusClient {
    async fn disconnect(&self) -> std::result::Result<(), String> {
        match self {
            Self::V4(client) => client.disconnect().await.map_err(|e| e.to_string()),
            Self::V5(client) => client.disconnect().await.map_err(|e| e.to_string()),
        }
    }
}

/// Handle to a running broker connection.
pub struct BusHandle {
    client: BusClient,
    task: JoinHandle<()>,
}

impl BusHandle {
    /// Sends DISCONNECT and stops the polling task.
    pub async fn disconnect(self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect request failed");
        }

        let abort = self.task.abort_handle();
        if tokio::time::timeout(DISCONNECT_GRACE, self.task).await.is_err() {
            abort.abort();
        }
        info!("MQTT connection closed");
    }
}

/// Builds the MQTT 3.1.1 options for a configuration.
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(config.client_id(), config.hostname.clone(), config.port);
    options.set_keep_alive(config.keep_alive());
    options.set_clean_session(true);

    if let Some((username, password)) = config.credentials() {
        options.set_credentials(username, password);
    }

    if config.use_tls {
        options.set_transport(Transport::tls_with_default_config());
    }

    options
}

/// Builds the MQTT 5.0 options for a configuration.
pub fn mqtt_options_v5(config: &MqttConfig) -> v5::MqttOptions {
    let mut options =
        v5::MqttOptions::new(config.client_id(), config.hostname.clone(), config.port);
    options.set_keep_alive(config.keep_alive());
    options.set_clean_start(true);

    if let Some((username, password)) = config.credentials() {
        options.set_credentials(username, password);
    }

    if config.use_tls {
        options.set_transport(Transport::tls_with_default_config());
    }

    options
}

/// Connects to the broker and subscribes to `filters` on every (re)connect.
///
/// Returns immediately; the connection is established by the background
/// task and reported as [`BusEvent::Connected`].
pub fn connect(
    config: &MqttConfig,
    filters: Vec<String>,
) -> Result<(BusHandle, mpsc::Receiver<BusEvent>)> {
    config.validate()?;

    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let request_capacity = filters.len() + 16;
    let reconnect_delay = config.reconnect_delay();

    info!(
        hostname = %config.hostname,
        port = config.port,
        version = config.version,
        tls = config.use_tls,
        filters = filters.len(),
        "Connecting to MQTT broker"
    );

    let (client, task) = if config.is_v5() {
        let (client, eventloop) = v5::AsyncClient::new(mqtt_options_v5(config), request_capacity);
        let task = tokio::spawn(poll_event_loop_v5(
            eventloop,
            client.clone(),
            filters,
            tx,
            reconnect_delay,
        ));
        (BusClient::V5(client), task)
    } else {
        let (client, eventloop) = AsyncClient::new(mqtt_options(config), request_capacity);
        let task = tokio::spawn(poll_event_loop(
            eventloop,
            client.clone(),
            filters,
            tx,
            reconnect_delay,
        ));
        (BusClient::V4(client), task)
    };

    Ok((BusHandle { client, task }, rx))
}

/// Whether a connection error of `kind` ends the bus session.
///
/// Only transport errors are retried, and only when a reconnect delay is set.
pub fn is_fatal(kind: ConnectionErrorKind, reconnect_delay: Option<Duration>) -> bool {
    !(kind.is_retryable() && reconnect_delay.is_some())
}

async fn poll_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    filters: Vec<String>,
    tx: mpsc::Sender<BusEvent>,
    reconnect_delay: Option<Duration>,
) {
    let mut tracker = SubscriptionTracker::new();

    loop {
        let events = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected(&mut tracker);
                subscribe_all(&filters, &mut tracker, |filter| {
                    client
                        .try_subscribe(filter, QoS::AtMostOnce)
                        .map_err(|e| e.to_string())
                })
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => vec![BusEvent::Message {
                topic: publish.topic,
                payload: publish.payload,
            }],
            Ok(Event::Incoming(Packet::SubAck(ack))) => tracker.acknowledged(&ack),
            Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => {
                tracker.sent(pkid);
                Vec::new()
            }
            Ok(_) => Vec::new(),
            Err(ConnectionError::RequestsDone) => {
                debug!("MQTT client dropped, stopping event loop");
                return;
            }
            Err(e) => {
                let keep_polling = report_connection_error(
                    &tx,
                    &mut tracker,
                    classify(&e),
                    describe(&e),
                    reconnect_delay,
                )
                .await;
                if !keep_polling {
                    return;
                }
                continue;
            }
        };

        if !forward(&tx, events).await {
            return;
        }
    }
}

async fn poll_event_loop_v5(
    mut eventloop: v5::EventLoop,
    client: v5::AsyncClient,
    filters: Vec<String>,
    tx: mpsc::Sender<BusEvent>,
    reconnect_delay: Option<Duration>,
) {
    let mut tracker = SubscriptionTracker::new();

    loop {
        let events = match eventloop.poll().await {
            Ok(v5::Event::Incoming(V5Packet::ConnAck(_))) => {
                connected(&mut tracker);
                subscribe_all(&filters, &mut tracker, |filter| {
                    client
                        .try_subscribe(filter, V5QoS::AtMostOnce)
                        .map_err(|e| e.to_string())
                })
            }
            Ok(v5::Event::Incoming(V5Packet::Publish(publish))) => vec![BusEvent::Message {
                topic: String::from_utf8_lossy(&publish.topic).into_owned(),
                payload: publish.payload,
            }],
            Ok(v5::Event::Incoming(V5Packet::SubAck(ack))) => tracker.acknowledged_v5(&ack),
            Ok(v5::Event::Outgoing(Outgoing::Subscribe(pkid))) => {
                tracker.sent(pkid);
                Vec::new()
            }
            Ok(_) => Vec::new(),
            Err(v5::ConnectionError::RequestsDone) => {
                debug!("MQTT client dropped, stopping event loop");
                return;
            }
            Err(e) => {
                let keep_polling = report_connection_error(
                    &tx,
                    &mut tracker,
                    classify_v5(&e),
                    describe_v5(&e),
                    reconnect_delay,
                )
                .await;
                if !keep_polling {
                    return;
                }
                continue;
            }
        };

        if !forward(&tx, events).await {
            return;
        }
    }
}

fn connected(tracker: &mut SubscriptionTracker) {
    info!("MQTT connection established");
    health().mqtt.set_healthy();
    tracker.reset();
}

/// Sends events to the pipeline. Returns false once the receiver is gone.
async fn forward(tx: &mpsc::Sender<BusEvent>, events: Vec<BusEvent>) -> bool {
    for event in events {
        if tx.send(event).await.is_err() {
            debug!("Bus event receiver dropped, stopping event loop");
            return false;
        }
    }
    true
}

/// Reports a connection error and waits out the reconnect delay.
///
/// Returns whether the event loop should keep polling.
async fn report_connection_error(
    tx: &mpsc::Sender<BusEvent>,
    tracker: &mut SubscriptionTracker,
    kind: ConnectionErrorKind,
    message: String,
    reconnect_delay: Option<Duration>,
) -> bool {
    let fatal = is_fatal(kind, reconnect_delay);

    metrics().connection_errors.inc();
    health().mqtt.set_unhealthy(message.clone());
    error!(kind = ?kind, fatal = fatal, error = %message, "MQTT error");

    let event = BusEvent::ConnectionError {
        kind,
        message,
        fatal,
    };
    if tx.send(event).await.is_err() || fatal {
        return false;
    }

    tracker.reset();
    if let Some(delay) = reconnect_delay {
        warn!(delay_secs = delay.as_secs(), "Reconnecting to MQTT broker");
        tokio::time::sleep(delay).await;
    }
    true
}

/// Queues one subscribe request per filter.
fn subscribe_all(
    filters: &[String],
    tracker: &mut SubscriptionTracker,
    mut try_subscribe: impl FnMut(&str) -> std::result::Result<(), String>,
) -> Vec<BusEvent> {
    let mut events = vec![BusEvent::Connected];

    for filter in filters {
        match try_subscribe(filter.as_str()) {
            Ok(()) => tracker.queued(filter.as_str()),
            Err(reason) => events.push(BusEvent::SubscriptionFailed {
                filter: filter.clone(),
                reason,
            }),
        }
    }

    events
}
