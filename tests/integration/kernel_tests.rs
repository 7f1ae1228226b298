//! End-to-end kernel tests: broker ↔ kernel ↔ simulated mezzanine.

use iotflow::adapters::device_id;
use iotflow::app::service::Kernel;
use iotflow::mqtt::session::SessionState;
use iotflow::KernelConfig;

use crate::mock_hw::{bank, default_config, MockBank, MockI2c, ADC0_ADDR, EXPANDER_ADDR};
use crate::mock_mqtt::{MockTransport, SharedBroker};

const BASE: &str = "iotflow/device_1";
const TICK_MS: u64 = 10;

/// GPIO line behind channel 2 (input) and channel 3 (output).
const DOOR_PIN: u8 = 12;
const PUMP_PIN: u8 = 13;

/// Channel 0 front end: 0..10 V range at the 6.144 V PGA.
const CH0_GAIN: f32 = 0.237_619_05;
const CH0_FSR: f32 = 6.144;

fn topic(suffix: &str) -> String {
    format!("{BASE}/{suffix}")
}

fn raw_for_volts(v: f32) -> i16 {
    (v * CH0_GAIN * 32_768.0 / CH0_FSR).round() as i16
}

struct Node {
    kernel: Kernel<MockTransport, MockBank>,
    bus: MockI2c,
    broker: SharedBroker,
    now: u64,
}

impl Node {
    fn boot() -> Self {
        Self::boot_with(default_config())
    }

    fn boot_with(config: KernelConfig) -> Self {
        let bus = MockI2c::combo_board();
        let broker = SharedBroker::default();
        let kernel = Kernel::new(
            &config,
            bank(&config, &bus),
            broker.transport(),
            &device_id::resolve(config.broker.client_id.as_deref(), &device_id::read_mac()),
        )
        .unwrap();
        Self { kernel, bus, broker, now: 0 }
    }

    fn tick(&mut self) {
        self.kernel.tick(self.now);
        self.now += TICK_MS;
    }

    fn run_for(&mut self, ms: u64) {
        let end = self.now + ms;
        while self.now < end {
            self.tick();
        }
    }

    /// First tick starts the connect, second sees the CONNACK.
    fn online(&mut self) {
        self.tick();
        self.tick();
        assert!(self.kernel.session().is_connected());
    }

    fn set_door(&mut self, high: bool) {
        self.kernel.io_mut().hal_mut().gpio.set_input_level(DOOR_PIN, high);
    }

    fn pump_level(&self) -> bool {
        self.kernel.io().hal().gpio.level(PUMP_PIN)
    }
}

fn approx_values(payloads: &[String]) -> Vec<f32> {
    payloads.iter().map(|p| p.parse::<f32>().unwrap()).collect()
}

// ── Session lifecycle ─────────────────────────────────────────

#[test]
fn boot_announces_online_and_subscribes_outputs() {
    let mut node = Node::boot();
    node.online();

    let b = node.broker.get();
    assert_eq!(b.retained.get(&topic("status")).map(String::as_str), Some("online"));
    assert_eq!(
        b.subscriptions,
        [topic("output/3/set"), topic("output/6/set"), topic("output/7/set")]
    );
    let will = b.will.as_ref().unwrap();
    assert_eq!(will.topic, topic("status"));
    assert_eq!(will.payload, "offline");
    assert!(will.retained);
    assert_eq!(b.client_ids, ["iotflow-1f2e3d"]);
}

#[test]
fn nothing_is_sampled_before_the_session_is_up() {
    let mut node = Node::boot();
    node.broker.set_reachable(false);
    node.run_for(500);

    assert_eq!(node.bus.conversions(ADC0_ADDR), 0);
    assert!(node.broker.get().published.is_empty());
}

#[test]
fn unreachable_broker_backs_off_exponentially() {
    let mut node = Node::boot();
    node.broker.set_reachable(false);

    // Attempts at 0, ~1 s and ~3 s; the next is due around 7 s.
    node.run_for(5_000);
    assert_eq!(node.broker.get().connects, 3);
    assert_eq!(node.kernel.session().state(), SessionState::Disconnected);

    node.broker.set_reachable(true);
    node.run_for(3_000);
    assert!(node.kernel.session().is_connected());
    assert_eq!(node.broker.get().connects, 4);
}

#[test]
fn ungraceful_drop_fires_will_once_then_reannounces() {
    let mut node = Node::boot();
    node.online();
    node.broker.clear_published();

    node.broker.simulate_drop();
    node.tick();
    assert_eq!(node.kernel.session().state(), SessionState::Disconnected);
    assert_eq!(node.broker.published_on(&topic("status")), ["offline"]);
    assert_eq!(node.broker.retained_on(&topic("status")).as_deref(), Some("offline"));

    node.run_for(1_100);
    assert!(node.kernel.session().is_connected());
    assert_eq!(node.broker.published_on(&topic("status")), ["offline", "online"]);
    assert_eq!(node.broker.retained_on(&topic("status")).as_deref(), Some("online"));
    assert_eq!(node.broker.get().subscriptions.len(), 3);

    let stats = node.kernel.session().stats();
    assert_eq!(stats.sessions, 2);
    assert_eq!(stats.drops, 1);
}

#[test]
fn commands_are_not_delivered_while_offline() {
    let mut node = Node::boot();
    node.online();
    node.broker.simulate_drop();
    node.tick();

    assert!(!node.broker.inject(&topic("output/3/set"), b"1"));
    node.tick();
    assert!(!node.pump_level());
}

#[test]
fn failed_publish_drops_the_session() {
    let mut node = Node::boot();
    node.online();

    node.broker.inject(&topic("output/3/set"), b"1");
    node.broker.set_fail_publish(true);
    node.tick();

    // The line was driven even though the ack could not be sent.
    assert!(node.pump_level());
    assert_eq!(node.kernel.session().state(), SessionState::Disconnected);
    assert_eq!(node.kernel.stats().events_dropped, 1);
    // The broker never keeps advertising a session that is gone.
    assert_eq!(node.broker.retained_on(&topic("status")).as_deref(), Some("offline"));
    assert_eq!(node.broker.get().aborts, 1);

    node.broker.set_fail_publish(false);
    node.run_for(1_100);
    assert!(node.kernel.session().is_connected());
    assert_eq!(node.broker.retained_on(&topic("status")).as_deref(), Some("online"));
}

#[test]
fn status_heartbeat_follows_the_configured_interval() {
    let mut node = Node::boot();
    node.online();
    node.run_for(29_000);
    assert_eq!(node.broker.published_on(&topic("status")), ["online"]);

    node.run_for(1_100);
    assert_eq!(node.broker.published_on(&topic("status")), ["online", "online"]);
}

// ── Output path ───────────────────────────────────────────────

#[test]
fn set_command_drives_gpio_output_and_acks() {
    let mut node = Node::boot();
    node.online();

    assert!(node.broker.inject(&topic("output/3/set"), b"1"));
    node.tick();
    assert!(node.pump_level());
    assert_eq!(node.broker.published_on(&topic("output/3/state")), ["1"]);

    node.broker.inject(&topic("output/3/set"), b"false");
    node.tick();
    assert!(!node.pump_level());
    assert_eq!(node.broker.published_on(&topic("output/3/state")), ["1", "0"]);
    assert_eq!(node.kernel.stats().commands_applied, 2);
}

#[test]
fn set_command_drives_expander_output() {
    let mut node = Node::boot();
    node.online();

    node.broker.inject(&topic("output/6/set"), b"TRUE");
    node.tick();
    assert_eq!(node.bus.expander_output() & 0b1100_0000, 0b0100_0000);
    assert_eq!(node.broker.published_on(&topic("output/6/state")), ["1"]);

    node.broker.inject(&topic("output/7/set"), b"1");
    node.broker.inject(&topic("output/6/set"), b"0");
    node.tick();
    assert_eq!(node.bus.expander_output() & 0b1100_0000, 0b1000_0000);
}

#[test]
fn last_command_in_a_tick_wins() {
    let mut node = Node::boot();
    node.online();

    node.broker.inject(&topic("output/3/set"), b"1");
    node.broker.inject(&topic("output/3/set"), b"0");
    node.broker.inject(&topic("output/3/set"), b"1");
    node.tick();

    assert!(node.pump_level());
    assert_eq!(node.broker.published_on(&topic("output/3/state")), ["1", "0", "1"]);
}

#[test]
fn protocol_errors_are_discarded() {
    let mut node = Node::boot();
    node.online();

    node.broker.inject_raw(&topic("output/2/set"), b"1");
    node.broker.inject_raw(&topic("output/3/set"), b"on");
    node.broker.inject_raw(&topic("output/03/set"), b"1");
    node.broker.inject_raw(&topic("output/8/set"), b"1");
    node.broker.inject_raw("elsewhere/output/3/set", b"1");
    node.tick();

    assert!(!node.pump_level());
    assert!(node.broker.published_on(&topic("output/3/state")).is_empty());
    assert!(node.broker.published_on(&topic("output/2/state")).is_empty());
    assert_eq!(node.kernel.stats().commands_rejected, 5);
    assert!(node.kernel.session().is_connected());
}

#[test]
fn hardware_failure_suppresses_the_ack() {
    let mut node = Node::boot();
    node.online();

    node.bus.kill(EXPANDER_ADDR);
    node.broker.inject(&topic("output/6/set"), b"1");
    node.broker.inject(&topic("output/3/set"), b"1");
    node.tick();

    assert!(node.broker.published_on(&topic("output/6/state")).is_empty());
    // Other channels and the session are unaffected.
    assert_eq!(node.broker.published_on(&topic("output/3/state")), ["1"]);
    assert!(node.kernel.session().is_connected());

    node.bus.revive(EXPANDER_ADDR);
    node.broker.inject(&topic("output/6/set"), b"1");
    node.tick();
    assert_eq!(node.broker.published_on(&topic("output/6/state")), ["1"]);
}

// ── Input path ────────────────────────────────────────────────

#[test]
fn stable_input_change_publishes_once() {
    let mut node = Node::boot();
    node.online();

    node.set_door(true);
    node.run_for(200);
    assert_eq!(node.broker.published_on(&topic("input/2")), ["1"]);

    node.set_door(false);
    node.run_for(200);
    assert_eq!(node.broker.published_on(&topic("input/2")), ["1", "0"]);
}

#[test]
fn contact_bounce_publishes_nothing() {
    let mut node = Node::boot();
    node.online();

    for _ in 0..5 {
        node.set_door(true);
        node.run_for(20);
        node.set_door(false);
        node.run_for(20);
    }
    node.run_for(200);
    assert!(node.broker.published_on(&topic("input/2")).is_empty());
}

#[test]
fn expander_input_change_publishes() {
    let mut node = Node::boot();
    node.online();

    node.bus.set_expander_pin(4, true);
    node.run_for(100);
    assert_eq!(node.broker.published_on(&topic("input/4")), ["1"]);
    assert!(node.broker.published_on(&topic("input/5")).is_empty());
}

// ── Analog path ───────────────────────────────────────────────

#[test]
fn deadband_publishes_only_meaningful_changes() {
    let mut node = Node::boot();
    node.bus.set_adc_raw(ADC0_ADDR, 0, raw_for_volts(3.10));
    node.online();

    node.bus.set_adc_raw(ADC0_ADDR, 0, raw_for_volts(3.12));
    node.run_for(1_000);
    node.bus.set_adc_raw(ADC0_ADDR, 0, raw_for_volts(3.20));
    node.run_for(1_000);

    let values = approx_values(&node.broker.published_on(&topic("analog/0")));
    assert_eq!(values.len(), 2, "{values:?}");
    assert!((values[0] - 3.10).abs() < 0.005);
    assert!((values[1] - 3.20).abs() < 0.005);
}

#[test]
fn without_deadband_every_sample_publishes() {
    let mut config = default_config();
    config.deadband = None;
    let mut node = Node::boot_with(config);
    node.online();
    node.run_for(3_010);

    // Sweeps start at 10, 1010, 2010 and 3010 ms; channel 1 is read one
    // tick after channel 0.
    assert_eq!(node.broker.published_on(&topic("analog/0")).len(), 4);
    assert_eq!(node.broker.published_on(&topic("analog/1")).len(), 4);
}

#[test]
fn current_channel_clamps_to_its_range() {
    let mut node = Node::boot();
    node.online();
    node.tick();

    // Nothing on the 4-20 mA loop reads as the bottom of the range.
    assert_eq!(node.broker.published_on(&topic("analog/1")), ["4.000"]);
}

#[test]
fn reconnect_republishes_analog_readings() {
    let mut node = Node::boot();
    node.bus.set_adc_raw(ADC0_ADDR, 0, raw_for_volts(5.0));
    node.online();
    assert_eq!(node.broker.published_on(&topic("analog/0")).len(), 1);

    node.broker.simulate_drop();
    node.run_for(1_100);
    assert!(node.kernel.session().is_connected());
    assert_eq!(node.broker.published_on(&topic("analog/0")).len(), 2);
}

#[test]
fn each_tick_waits_on_at_most_one_conversion() {
    let mut node = Node::boot();
    node.online();
    // The announcing tick started the sweep with channel 0.
    assert_eq!(node.bus.conversions(ADC0_ADDR), 1);
    assert!(node.broker.published_on(&topic("analog/1")).is_empty());

    node.tick();
    assert_eq!(node.bus.conversions(ADC0_ADDR), 2);
    assert_eq!(node.broker.published_on(&topic("analog/1")).len(), 1);

    node.run_for(500);
    assert_eq!(node.bus.conversions(ADC0_ADDR), 2);
}

#[test]
fn stuck_converter_skips_analog_only() {
    let mut node = Node::boot();
    node.bus.set_adc_stuck(ADC0_ADDR, true);
    node.online();

    node.set_door(true);
    node.run_for(1_200);

    assert!(node.broker.published_on(&topic("analog/0")).is_empty());
    assert_eq!(node.broker.published_on(&topic("input/2")), ["1"]);
    assert!(node.kernel.session().is_connected());
}

// ── Lifecycle ─────────────────────────────────────────────────

#[test]
fn shutdown_publishes_offline_and_disconnects_cleanly() {
    let mut node = Node::boot();
    node.online();
    node.kernel.shutdown();

    assert_eq!(node.kernel.session().state(), SessionState::Disconnected);
    let b = node.broker.get();
    assert_eq!(b.retained.get(&topic("status")).map(String::as_str), Some("offline"));
    assert_eq!(b.published.last().map(|p| p.payload.as_str()), Some("offline"));
    assert!(b.will.is_none());
    assert_eq!(b.disconnects, 1);
}

#[test]
fn into_parts_hands_back_bank_and_transport() {
    let mut node = Node::boot();
    node.online();
    node.broker.inject(&topic("output/3/set"), b"1");
    node.tick();

    let (bank, _transport) = node.kernel.into_parts();
    assert!(bank.hal().gpio.level(PUMP_PIN));
}
