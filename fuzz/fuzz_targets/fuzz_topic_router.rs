//! Fuzz target: `TopicRouter::parse_command`
//!
//! Splits the input into a topic and a payload and asserts that the router
//! never panics and only ever accepts a canonical set topic.
//!
//! cargo fuzz run fuzz_topic_router

#![no_main]

use iotflow::mqtt::topics::TopicRouter;
use libfuzzer_sys::fuzz_target;

const BASE: &str = "iotflow/device_1";

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let (topic, payload) = rest.split_at((split as usize).min(rest.len()));
    let Ok(topic) = core::str::from_utf8(topic) else {
        return;
    };

    let router = TopicRouter::new(BASE).unwrap();
    if let Ok(cmd) = router.parse_command(topic, payload) {
        assert_eq!(topic, format!("{BASE}/output/{}/set", cmd.channel));
        assert!(payload.len() <= 5, "only boolean tokens are accepted");
    }
});
