//! MQTT ingest and publish plumbing.
//!
//! The ingest loop owns the rumqttc event loop: it (re)subscribes to every
//! sensor topic on connection, parses each arriving payload, updates the
//! shared sensor cache, and kicks the control task. Payloads are either a
//! JSON-encoded number (possibly quoted) or a bare float string; anything
//! else is logged and dropped.
//!
//! Actuator commands are published through the same client by the control
//! task; see [`publish_command`].

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use biorig_control::relay::Command;
use biorig_types::{Error, SensorChannel, SensorReading};

use crate::config::MqttConfig;
use crate::state::AppState;

/// Build the MQTT client from configuration.
pub fn connect(config: &MqttConfig) -> Result<(AsyncClient, EventLoop), String> {
    let (host, port, use_tls) = parse_broker_url(&config.broker)?;

    let mut options = MqttOptions::new(&config.client_id, host, port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive));

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }

    if use_tls {
        options.set_transport(rumqttc::Transport::tls_with_default_config());
    }

    Ok(AsyncClient::new(options, 100))
}

/// Run the ingest loop until the stop signal fires.
///
/// Every accepted reading lands in the sensor cache before the control
/// task is kicked, so an evaluation triggered by a reading always sees at
/// least that reading.
pub async fn run_ingest(
    state: Arc<AppState>,
    client: AsyncClient,
    mut eventloop: EventLoop,
    kick_tx: mpsc::Sender<()>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let qos = qos_level(state.config.mqtt.qos);

    loop {
        tokio::select! {
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(
                        "MQTT connected, subscribing to {} sensor topics",
                        SensorChannel::ALL.len()
                    );
                    for channel in SensorChannel::ALL {
                        if let Err(e) = client.subscribe(channel.topic(), qos).await {
                            warn!("Failed to subscribe to {}: {}", channel.topic(), e);
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    handle_publish(&state, &kick_tx, &publish).await;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT connection error: {}. Reconnecting...", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            },
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    info!("Ingest received stop signal");
                    break;
                }
            }
        }
    }

    if let Err(e) = client.disconnect().await {
        debug!("Error disconnecting MQTT client: {}", e);
    }
}

/// Handle one inbound sensor message.
async fn handle_publish(state: &AppState, kick_tx: &mpsc::Sender<()>, publish: &Publish) {
    let Some(channel) = SensorChannel::from_topic(&publish.topic) else {
        debug!("Ignoring message on unknown topic {}", publish.topic);
        return;
    };

    let value = match parse_sensor_payload(&publish.payload) {
        Ok(value) => value,
        Err(e) => {
            warn!("Dropping reading on {}: {}", publish.topic, e);
            return;
        }
    };

    let reading = SensorReading {
        channel,
        value,
        observed_at: OffsetDateTime::now_utc(),
    };
    state.sensors.write().await.update(reading);

    // A full kick queue already guarantees a pending evaluation; readings
    // coalesce rather than queue up behind a busy control task.
    let _ = kick_tx.try_send(());
}

/// Publish one actuator command.
pub async fn publish_command(
    client: &AsyncClient,
    qos: QoS,
    command: &Command,
) -> Result<(), rumqttc::ClientError> {
    client
        .publish(
            command.actuator.topic(),
            qos,
            false,
            command.actuator.payload(command.state).as_bytes(),
        )
        .await
}

/// Parse a sensor payload: a JSON number, a JSON-quoted number, or a bare
/// float string.
pub fn parse_sensor_payload(payload: &[u8]) -> Result<f64, Error> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| Error::InvalidPayload("payload is not UTF-8".to_string()))?
        .trim();

    let value = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| Error::InvalidPayload(format!("number {n} out of range")))?,
        Ok(serde_json::Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| Error::InvalidPayload(format!("'{s}' is not a number")))?,
        Ok(other) => {
            return Err(Error::InvalidPayload(format!(
                "expected a number, got {other}"
            )));
        }
        // Not JSON at all; fall back to a bare float string.
        Err(_) => text
            .parse::<f64>()
            .map_err(|_| Error::InvalidPayload(format!("'{text}' is not a number")))?,
    };

    if !value.is_finite() {
        return Err(Error::InvalidPayload(format!("{value} is not finite")));
    }

    Ok(value)
}

/// Map the configured QoS number to the rumqttc level.
pub fn qos_level(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// Parse an MQTT broker URL into (host, port, use_tls).
pub fn parse_broker_url(url: &str) -> Result<(String, u16, bool), String> {
    let (scheme, rest) = if let Some(stripped) = url.strip_prefix("mqtt://") {
        ("mqtt", stripped)
    } else if let Some(stripped) = url.strip_prefix("mqtts://") {
        ("mqtts", stripped)
    } else {
        return Err("Invalid scheme: URL must start with mqtt:// or mqtts://".to_string());
    };

    let use_tls = scheme == "mqtts";
    let default_port = if use_tls { 8883 } else { 1883 };

    let (host, port) = if let Some((h, p)) = rest.rsplit_once(':') {
        let port = p
            .parse::<u16>()
            .map_err(|_| format!("Invalid port: {}", p))?;
        (h.to_string(), port)
    } else {
        (rest.to_string(), default_port)
    };

    if host.is_empty() {
        return Err("Host cannot be empty".to_string());
    }

    Ok((host, port, use_tls))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_url_mqtt() {
        let (host, port, tls) = parse_broker_url("mqtt://192.168.18.19:1883").unwrap();
        assert_eq!(host, "192.168.18.19");
        assert_eq!(port, 1883);
        assert!(!tls);
    }

    #[test]
    fn test_parse_broker_url_mqtts() {
        let (host, port, tls) = parse_broker_url("mqtts://broker.example.com:8883").unwrap();
        assert_eq!(host, "broker.example.com");
        assert_eq!(port, 8883);
        assert!(tls);
    }

    #[test]
    fn test_parse_broker_url_default_port() {
        let (host, port, tls) = parse_broker_url("mqtt://localhost").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
        assert!(!tls);

        let (host, port, tls) = parse_broker_url("mqtts://secure.example.com").unwrap();
        assert_eq!(host, "secure.example.com");
        assert_eq!(port, 8883);
        assert!(tls);
    }

    #[test]
    fn test_parse_broker_url_invalid() {
        assert!(parse_broker_url("http://localhost:1883").is_err());
        assert!(parse_broker_url("localhost:1883").is_err());
        assert!(parse_broker_url("mqtt://:1883").is_err());
    }

    #[test]
    fn test_parse_payload_bare_float() {
        assert_eq!(parse_sensor_payload(b"27.5").unwrap(), 27.5);
        assert_eq!(parse_sensor_payload(b" -12.25 \n").unwrap(), -12.25);
        assert_eq!(parse_sensor_payload(b"9000").unwrap(), 9000.0);
    }

    #[test]
    fn test_parse_payload_json_quoted() {
        assert_eq!(parse_sensor_payload(b"\"27.5\"").unwrap(), 27.5);
        assert_eq!(parse_sensor_payload(b"\" 8500 \"").unwrap(), 8500.0);
    }

    #[test]
    fn test_parse_payload_rejects_garbage() {
        assert!(parse_sensor_payload(b"").is_err());
        assert!(parse_sensor_payload(b"on").is_err());
        assert!(parse_sensor_payload(b"{\"value\": 1.0}").is_err());
        assert!(parse_sensor_payload(b"[1.0]").is_err());
        assert!(parse_sensor_payload(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_parse_payload_rejects_non_finite() {
        assert!(parse_sensor_payload(b"NaN").is_err());
        assert!(parse_sensor_payload(b"inf").is_err());
    }

    #[test]
    fn test_qos_level_mapping() {
        assert_eq!(qos_level(0), QoS::AtMostOnce);
        assert_eq!(qos_level(1), QoS::AtLeastOnce);
        assert_eq!(qos_level(2), QoS::ExactlyOnce);
    }
}
