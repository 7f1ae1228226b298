//! ESP-IDF MQTT client behind the [`MqttTransport`] port.
//!
//! `EspMqttConnection::next()` blocks, so each session gets its own
//! `mqtt-rx` thread that copies events into the shared [`EventQueue`].
//! Every connect bumps the session generation; dropping the client ends
//! the old thread, and anything it queued late is discarded by
//! generation.

use std::sync::Arc;
use std::time::Duration;

use esp_idf_svc::mqtt::client::{
    Details, EspMqttClient, EspMqttConnection, EventPayload, LwtConfiguration, MqttClientConfiguration, QoS,
};
use log::{debug, info, warn};

use crate::app::ports::{ConnectOptions, MqttTransport, TransportEvent};
use crate::error::TransportError;
use crate::mqtt::queue::EventQueue;
use crate::mqtt::InboundMessage;

const RX_STACK_SIZE: usize = 6 * 1024;

pub struct EspMqttTransport {
    url: String,
    queue: Arc<EventQueue>,
    client: Option<EspMqttClient<'static>>,
    generation: u32,
}

impl EspMqttTransport {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            url: format!("mqtt://{}:{}", host, port),
            queue: Arc::new(EventQueue::new()),
            client: None,
            generation: 0,
        }
    }

    /// Events lost to a full queue since boot.
    pub fn dropped_events(&self) -> u32 {
        self.queue.dropped()
    }

    fn client(&mut self) -> Result<&mut EspMqttClient<'static>, TransportError> {
        self.client.as_mut().ok_or(TransportError::NotConnected)
    }
}

fn spawn_receiver(mut conn: EspMqttConnection, queue: Arc<EventQueue>, generation: u32) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("mqtt-rx".into())
        .stack_size(RX_STACK_SIZE)
        .spawn(move || {
            while let Ok(event) = conn.next() {
                let mapped = match event.payload() {
                    EventPayload::Connected(_) => Some(TransportEvent::Connected),
                    EventPayload::Disconnected => Some(TransportEvent::Disconnected),
                    EventPayload::Received {
                        topic: Some(topic),
                        data,
                        details: Details::Complete,
                        ..
                    } => match InboundMessage::new(topic, data) {
                        Some(msg) => Some(TransportEvent::Message(msg)),
                        None => {
                            warn!("mqtt: oversized message on {} dropped", topic);
                            None
                        }
                    },
                    EventPayload::Error(e) => {
                        debug!("mqtt: client error {:?}", e);
                        None
                    }
                    _ => None,
                };
                if let Some(ev) = mapped {
                    if !queue.push(generation, ev) {
                        warn!("mqtt: event queue full, message dropped");
                    }
                }
            }
            debug!("mqtt-rx: session {} closed", generation);
        })
        .map(|_| ())
}

impl MqttTransport for EspMqttTransport {
    fn connect(&mut self, opts: &ConnectOptions<'_>) -> Result<(), TransportError> {
        self.client = None;
        self.generation = self.generation.wrapping_add(1);

        let conf = MqttClientConfiguration {
            client_id: Some(opts.client_id),
            username: opts.username,
            password: opts.password,
            keep_alive_interval: Some(Duration::from_secs(u64::from(opts.keep_alive_secs))),
            lwt: Some(LwtConfiguration {
                topic: opts.will.topic,
                payload: opts.will.payload,
                qos: QoS::AtLeastOnce,
                retain: opts.will.retained,
            }),
            ..Default::default()
        };

        let (client, conn) = EspMqttClient::new(&self.url, &conf).map_err(|e| {
            warn!("mqtt: client create failed: {}", e);
            TransportError::ConnectFailed
        })?;
        spawn_receiver(conn, Arc::clone(&self.queue), self.generation).map_err(|e| {
            warn!("mqtt: receiver thread failed: {}", e);
            TransportError::ConnectFailed
        })?;

        self.client = Some(client);
        info!("mqtt: client started for {}", self.url);
        Ok(())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.queue.pop_current(self.generation)
    }

    /// Retained status goes out synchronously so an `offline` written just
    /// before [`abort`](MqttTransport::abort) is on the wire before the
    /// client is destroyed.  Everything else is queued in the outbox.
    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), TransportError> {
        let client = self.client()?;
        let sent = if retained {
            client.publish(topic, QoS::AtLeastOnce, true, payload)
        } else {
            client.enqueue(topic, QoS::AtLeastOnce, false, payload)
        };
        sent.map(|_| ()).map_err(|_| TransportError::PublishFailed)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client()?
            .subscribe(topic, QoS::AtLeastOnce)
            .map(|_| ())
            .map_err(|_| TransportError::SubscribeFailed)
    }

    fn disconnect(&mut self) {
        if self.client.take().is_some() {
            self.queue.clear();
            debug!("mqtt: client dropped");
        }
    }
}
