//! In-memory broker for integration tests.
//!
//! [`MockTransport`] and the test share one [`Broker`] through an
//! `Rc<RefCell<..>>`, so the test can script connection outcomes, inject
//! commands and inspect everything the kernel published.

use std::cell::{Ref, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use iotflow::app::ports::{ConnectOptions, MqttTransport, TransportEvent};
use iotflow::error::TransportError;
use iotflow::mqtt::InboundMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub retained: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredWill {
    pub topic: String,
    pub payload: String,
    pub retained: bool,
}

pub struct Broker {
    /// Accept connects.  When false a connect is answered with `Disconnected`.
    pub reachable: bool,
    pub fail_publish: bool,
    pub session_open: bool,
    pub events: VecDeque<TransportEvent>,
    pub published: Vec<Published>,
    pub retained: HashMap<String, String>,
    pub subscriptions: Vec<String>,
    pub will: Option<RegisteredWill>,
    pub client_ids: Vec<String>,
    pub connects: u32,
    pub disconnects: u32,
    pub aborts: u32,
}

impl Default for Broker {
    fn default() -> Self {
        Self {
            reachable: true,
            fail_publish: false,
            session_open: false,
            events: VecDeque::new(),
            published: Vec::new(),
            retained: HashMap::new(),
            subscriptions: Vec::new(),
            will: None,
            client_ids: Vec::new(),
            connects: 0,
            disconnects: 0,
            aborts: 0,
        }
    }
}

impl Broker {
    /// Session ends without a DISCONNECT: the will goes out.
    fn close_uncleanly(&mut self) {
        self.session_open = false;
        self.subscriptions.clear();
        if let Some(will) = self.will.take() {
            if will.retained {
                self.retained.insert(will.topic.clone(), will.payload.clone());
            }
            self.published.push(Published {
                topic: will.topic,
                payload: will.payload,
                retained: will.retained,
            });
        }
    }
}

#[derive(Clone, Default)]
pub struct SharedBroker(Rc<RefCell<Broker>>);

#[allow(dead_code)]
impl SharedBroker {
    pub fn transport(&self) -> MockTransport {
        MockTransport(self.0.clone())
    }

    pub fn get(&self) -> Ref<'_, Broker> {
        self.0.borrow()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.0.borrow_mut().reachable = reachable;
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.0.borrow_mut().fail_publish = fail;
    }

    /// Deliver a message if the node is subscribed to its topic.
    pub fn inject(&self, topic: &str, payload: &[u8]) -> bool {
        let mut b = self.0.borrow_mut();
        if !b.session_open || !b.subscriptions.iter().any(|s| s == topic) {
            return false;
        }
        let msg = InboundMessage::new(topic, payload).expect("message fits buffers");
        b.events.push_back(TransportEvent::Message(msg));
        true
    }

    /// Deliver a message regardless of subscriptions.
    pub fn inject_raw(&self, topic: &str, payload: &[u8]) {
        let msg = InboundMessage::new(topic, payload).expect("message fits buffers");
        self.0.borrow_mut().events.push_back(TransportEvent::Message(msg));
    }

    /// Network loss: the broker fires the will and the client sees a drop.
    pub fn simulate_drop(&self) {
        let mut b = self.0.borrow_mut();
        if !b.session_open {
            return;
        }
        b.close_uncleanly();
        b.events.push_back(TransportEvent::Disconnected);
    }

    pub fn published_on(&self, topic: &str) -> Vec<String> {
        self.0
            .borrow()
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.payload.clone())
            .collect()
    }

    pub fn retained_on(&self, topic: &str) -> Option<String> {
        self.0.borrow().retained.get(topic).cloned()
    }

    pub fn clear_published(&self) {
        self.0.borrow_mut().published.clear();
    }
}

pub struct MockTransport(Rc<RefCell<Broker>>);

impl MqttTransport for MockTransport {
    fn connect(&mut self, opts: &ConnectOptions<'_>) -> Result<(), TransportError> {
        let mut b = self.0.borrow_mut();
        b.connects += 1;
        b.client_ids.push(opts.client_id.to_owned());
        b.subscriptions.clear();
        b.events.clear();
        if b.reachable {
            b.session_open = true;
            b.will = Some(RegisteredWill {
                topic: opts.will.topic.to_owned(),
                payload: String::from_utf8_lossy(opts.will.payload).into_owned(),
                retained: opts.will.retained,
            });
            b.events.push_back(TransportEvent::Connected);
        } else {
            b.events.push_back(TransportEvent::Disconnected);
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.0.borrow_mut().events.pop_front()
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), TransportError> {
        let mut b = self.0.borrow_mut();
        if !b.session_open {
            return Err(TransportError::NotConnected);
        }
        if b.fail_publish {
            return Err(TransportError::PublishFailed);
        }
        let payload = String::from_utf8_lossy(payload).into_owned();
        if retained {
            b.retained.insert(topic.to_owned(), payload.clone());
        }
        b.published.push(Published {
            topic: topic.to_owned(),
            payload,
            retained,
        });
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let mut b = self.0.borrow_mut();
        if !b.session_open {
            return Err(TransportError::SubscribeFailed);
        }
        b.subscriptions.push(topic.to_owned());
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut b = self.0.borrow_mut();
        b.disconnects += 1;
        b.session_open = false;
        // A clean disconnect discards the will.
        b.will = None;
        b.subscriptions.clear();
    }

    fn abort(&mut self) {
        let mut b = self.0.borrow_mut();
        b.aborts += 1;
        if b.session_open {
            b.close_uncleanly();
        }
    }
}
