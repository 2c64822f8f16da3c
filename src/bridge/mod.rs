//! MQTT subscriber that turns device telegrams into gateway ingestions.
//!
//! One event loop, one telegram at a time: each publish is decoded,
//! normalized and forwarded reading by reading before the next broker event
//! is polled. Delivery failures are logged and dropped; the next telegram
//! supersedes the lost one.

pub mod client;

use std::{future::Future, sync::Arc, time::Duration};

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::{channels, config::BridgeConfig, telegram};

pub use client::{Delivery, ForwardError, GatewayClient, ReadingSink};

// ---------------------------------------------------------------------------
// Connection state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Disconnected,
    Connecting,
    Connected,
}

/// Broker-side happenings that move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    ConnAck { accepted: bool },
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Subscribe,
    /// Poll again straight away; the event loop reconnects on the next poll.
    ReconnectNow,
    /// Wait `reconnect_delay` before the next connection attempt.
    Backoff,
}

/// Losing an established connection earns exactly one immediate reconnect.
/// Any failure while not connected backs off.
pub fn transition(state: BridgeState, event: ConnectionEvent) -> (BridgeState, Action) {
    match (state, event) {
        (_, ConnectionEvent::ConnAck { accepted: true }) => (BridgeState::Connected, Action::Subscribe),
        (_, ConnectionEvent::ConnAck { accepted: false }) => (BridgeState::Disconnected, Action::Backoff),
        (BridgeState::Connected, ConnectionEvent::Failed) => {
            (BridgeState::Connecting, Action::ReconnectNow)
        }
        (BridgeState::Connecting | BridgeState::Disconnected, ConnectionEvent::Failed) => {
            (BridgeState::Disconnected, Action::Backoff)
        }
    }
}

// ---------------------------------------------------------------------------
// Telegram handling
// ---------------------------------------------------------------------------

/// Per-telegram delivery tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelegramReport {
    pub stored: usize,
    pub unknown_sensor: usize,
    pub failed: usize,
    /// Decoded channels with no registry entry.
    pub unmapped: usize,
}

/// Decode one telegram and forward each mapped channel to `sink`, in
/// channel order, one call at a time.
pub async fn handle_telegram(payload: &str, sink: &dyn ReadingSink) -> TelegramReport {
    let decoded = telegram::decode(payload);
    for warning in &decoded.warnings {
        warn!(%warning, "Telegram decode warning");
    }

    let readings = channels::normalize_all(&decoded, None);
    let mut report = TelegramReport {
        unmapped: decoded.values.len() - readings.len(),
        ..Default::default()
    };
    if report.unmapped > 0 {
        debug!(unmapped = report.unmapped, "Skipping unmapped channels");
    }

    for reading in &readings {
        match sink.forward(reading).await {
            Ok(Delivery::Stored { data_id }) => {
                report.stored += 1;
                info!(
                    external_id = reading.external_id,
                    value = reading.value,
                    unit = reading.unit,
                    data_id = %data_id,
                    "Reading forwarded"
                );
            }
            Ok(Delivery::UnknownSensor) => {
                report.unknown_sensor += 1;
                warn!(external_id = reading.external_id, "Sensor not provisioned; reading skipped");
            }
            Err(e) => {
                report.failed += 1;
                error!(external_id = reading.external_id, error = %e, "Failed to forward reading");
            }
        }
    }

    report
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

pub struct MqttBridge {
    config: BridgeConfig,
    sink: Arc<dyn ReadingSink>,
}

impl MqttBridge {
    pub fn new(config: BridgeConfig, sink: Arc<dyn ReadingSink>) -> Self {
        Self { config, sink }
    }

    /// Run until `shutdown` resolves, then disconnect from the broker.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let mut options = MqttOptions::new(
            self.config.mqtt_client_id.clone(),
            self.config.mqtt_host.clone(),
            self.config.mqtt_port,
        );
        options.set_keep_alive(self.config.keep_alive);

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let mut state = BridgeState::Connecting;
        tokio::pin!(shutdown);

        info!(
            host = %self.config.mqtt_host,
            port = self.config.mqtt_port,
            topic = %self.config.mqtt_topic,
            "MQTT bridge started"
        );

        loop {
            let polled = tokio::select! {
                _ = &mut shutdown => break,
                polled = eventloop.poll() => polled,
            };

            let event = match polled {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => ConnectionEvent::ConnAck {
                    accepted: ack.code == ConnectReturnCode::Success,
                },
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match std::str::from_utf8(&publish.payload) {
                        Ok(payload) => {
                            let report = handle_telegram(payload, self.sink.as_ref()).await;
                            debug!(topic = %publish.topic, ?report, "Telegram processed");
                        }
                        Err(e) => {
                            warn!(topic = %publish.topic, error = %e, "Telegram is not UTF-8; dropped");
                        }
                    }
                    continue;
                }
                Ok(_) => continue,
                Err(e) => {
                    match state {
                        BridgeState::Connected => warn!(error = %e, "Broker connection lost"),
                        _ => error!(error = %e, "Broker connection failed"),
                    }
                    ConnectionEvent::Failed
                }
            };

            let (next, action) = transition(state, event);
            state = next;

            match action {
                Action::Subscribe => {
                    info!(topic = %self.config.mqtt_topic, "Connected to broker; subscribing");
                    if let Err(e) = client
                        .subscribe(self.config.mqtt_topic.as_str(), QoS::AtLeastOnce)
                        .await
                    {
                        error!(error = %e, "Failed to queue subscription");
                    }
                }
                Action::ReconnectNow => info!("Reconnecting to broker"),
                Action::Backoff => {
                    let delay = self.config.reconnect_delay;
                    info!(delay_secs = delay.as_secs(), "Retrying broker connection after delay");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = time::sleep(delay) => state = BridgeState::Connecting,
                    }
                }
            }
        }

        info!("Shutting down MQTT bridge");
        if state == BridgeState::Connected {
            disconnect(&client, &mut eventloop).await;
        }
    }
}

/// Send DISCONNECT and drive the event loop until it goes out.
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.disconnect().await {
        warn!(error = %e, "Failed to queue disconnect");
        return;
    }

    let flushed = time::timeout(Duration::from_secs(2), async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;

    match flushed {
        Ok(()) => info!("Disconnected from broker"),
        Err(_) => warn!("Timed out waiting for broker disconnect"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
