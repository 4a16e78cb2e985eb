//! End-to-end lifecycle scenarios for the device link, driven against the
//! scripted mock transport with an explicit clock.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use edgelink::connection::{BACKOFF_BASE_SECS, MAX_BACKOFF_LEVEL};
use edgelink::testing::MockTransport;
use edgelink::{ConnectionState, DeviceLink};

fn base() -> Duration {
    Duration::from_secs(BACKOFF_BASE_SECS)
}

fn configured_link() -> DeviceLink<MockTransport> {
    let mut link = DeviceLink::new(MockTransport::new());
    link.set_broker("10.0.0.5", 1883);
    link.set_client_id("dev-ab12cd").unwrap();
    link
}

fn collecting_handler(link: &mut DeviceLink<MockTransport>, register_command: bool) -> Rc<RefCell<Vec<Value>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    if register_command {
        link.on_command(move |payload| sink.borrow_mut().push(payload.clone()));
    } else {
        link.on_config(move |payload| sink.borrow_mut().push(payload.clone()));
    }
    seen
}

#[test]
fn failed_attempts_follow_the_linear_backoff_schedule() {
    let mut link = DeviceLink::new(MockTransport::refusing());
    link.set_broker("10.0.0.5", 1883);
    link.set_client_id("dev1").unwrap();

    let t0 = Instant::now();
    link.tick_at(t0);
    assert_eq!(link.transport().connect_log.len(), 1);
    assert_eq!(link.state().backoff_level(), 1);

    // Inside the first interval nothing happens.
    link.tick_at(t0 + Duration::from_secs(1));
    assert_eq!(link.transport().connect_log.len(), 1);

    // One base interval out, the second attempt fires.
    let t1 = t0 + base();
    link.tick_at(t1);
    assert_eq!(link.transport().connect_log.len(), 2);
    assert_eq!(link.state().backoff_level(), 2);

    link.tick_at(t1 + base());
    assert_eq!(link.transport().connect_log.len(), 2);
    let t2 = t1 + 2 * base();
    link.tick_at(t2);
    assert_eq!(link.transport().connect_log.len(), 3);
    assert_eq!(link.state().backoff_level(), 3);
}

#[test]
fn backoff_never_exceeds_the_cap() {
    let mut link = DeviceLink::new(MockTransport::refusing());
    link.set_broker("10.0.0.5", 1883);
    link.set_client_id("dev1").unwrap();

    let mut now = Instant::now();
    for _ in 0..(MAX_BACKOFF_LEVEL as usize + 10) {
        // Jump far enough that every tick is a due attempt.
        link.tick_at(now);
        assert!(link.state().backoff_level() <= MAX_BACKOFF_LEVEL);
        now += Duration::from_secs(120);
    }
    assert_eq!(link.state().backoff_level(), MAX_BACKOFF_LEVEL);
}

#[test]
fn successful_connect_resets_the_backoff() {
    let mut link = DeviceLink::new(MockTransport::refusing());
    link.set_broker("10.0.0.5", 1883);
    link.set_client_id("dev1").unwrap();

    let mut now = Instant::now();
    for _ in 0..4 {
        link.tick_at(now);
        now += Duration::from_secs(120);
    }
    assert!(link.state().backoff_level() > 1);

    link.transport_mut().restore();
    link.tick_at(now);
    assert!(link.is_connected());
    assert_eq!(link.state().backoff_level(), 0);
}

#[test]
fn dropped_session_reschedules_one_base_interval_out() {
    // Scenario from the wire contract: stat topic is `stat/dev-ab12cd`,
    // and after a drop the next attempt lands at now + 1 * base interval.
    let mut link = configured_link();

    let t0 = Instant::now();
    link.tick_at(t0);
    assert!(link.is_connected());
    assert_eq!(
        link.snapshot().topics.unwrap().status,
        "stat/dev-ab12cd"
    );

    link.transport_mut().drop_connection();
    let t1 = t0 + Duration::from_secs(30);
    link.tick_at(t1);

    assert!(matches!(
        link.state(),
        ConnectionState::Connecting { backoff: 1, .. }
    ));

    // The broker recovers, but the retry still waits out the interval.
    link.transport_mut().restore();
    assert_eq!(link.transport().connect_log.len(), 1);

    link.tick_at(t1 + Duration::from_secs(4));
    assert_eq!(link.transport().connect_log.len(), 1);

    link.tick_at(t1 + base());
    assert_eq!(link.transport().connect_log.len(), 2);
    assert!(link.is_connected());
}

#[test]
fn lifecycle_callbacks_fire_on_transitions() {
    let ups = Rc::new(RefCell::new(0));
    let downs = Rc::new(RefCell::new(0));

    let mut link = configured_link();
    let up_sink = Rc::clone(&ups);
    link.on_connected(move || *up_sink.borrow_mut() += 1);
    let down_sink = Rc::clone(&downs);
    link.on_disconnected(move || *down_sink.borrow_mut() += 1);

    let t0 = Instant::now();
    link.tick_at(t0);
    assert_eq!((*ups.borrow(), *downs.borrow()), (1, 0));

    link.transport_mut().drop_connection();
    link.tick_at(t0 + Duration::from_secs(10));
    assert_eq!((*ups.borrow(), *downs.borrow()), (1, 1));

    // The next attempt fails too.
    link.transport_mut().connect_result = false;
    link.tick_at(t0 + Duration::from_secs(10) + base());
    assert_eq!((*ups.borrow(), *downs.borrow()), (1, 2));
}

#[test]
fn credentials_reach_the_transport_as_a_pair() {
    let mut link = configured_link();
    link.set_auth(Some("user"), Some("secret"));
    link.tick();

    let record = &link.transport().connect_log[0];
    assert_eq!(record.username.as_deref(), Some("user"));
    assert_eq!(record.password.as_deref(), Some("secret"));
}

#[test]
fn qualified_namespace_is_used_for_subscriptions_and_will() {
    let mut link = DeviceLink::new(MockTransport::new());
    link.set_broker("10.0.0.5", 1883);
    link.set_client_id("dev1").unwrap();
    link.set_topic_prefix(Some("site42"));
    link.set_topic_suffix(Some("garage"));
    link.tick();

    let transport = link.transport();
    assert_eq!(
        transport.subscriptions,
        vec![
            "site42/conf/dev1/garage".to_string(),
            "site42/cmnd/dev1/garage".to_string(),
        ]
    );
    assert_eq!(
        transport.connect_log[0].will_topic,
        "site42/stat/dev1/garage/lwt"
    );
}

#[test]
fn batched_command_payload_fans_out_in_order() {
    let mut link = configured_link();
    let seen = collecting_handler(&mut link, true);
    link.tick();

    link.transport_mut()
        .push_inbound("cmnd/dev-ab12cd", br#"[{"a":1},{"a":2}]"#);
    link.tick();

    assert_eq!(*seen.borrow(), vec![json!({"a": 1}), json!({"a": 2})]);
}

#[test]
fn single_config_payload_dispatches_once() {
    let mut link = configured_link();
    let seen = collecting_handler(&mut link, false);
    link.tick();

    link.transport_mut()
        .push_inbound("conf/dev-ab12cd", br#"{"a":1}"#);
    link.tick();

    assert_eq!(*seen.borrow(), vec![json!({"a": 1})]);
}

#[test]
fn announcement_topics_are_never_routed_inbound() {
    let mut link = configured_link();
    let configs = collecting_handler(&mut link, false);
    let commands = collecting_handler(&mut link, true);
    link.tick();

    link.transport_mut()
        .push_inbound("stat/dev-ab12cd/lwt", br#"{"online":false}"#);
    link.transport_mut()
        .push_inbound("stat/dev-ab12cd/adopt", br#"{"firmware":"1.0"}"#);
    link.tick();

    assert!(configs.borrow().is_empty());
    assert!(commands.borrow().is_empty());
}

#[test]
fn messages_without_a_handler_are_discarded() {
    let mut link = configured_link();
    link.tick();

    // No handler registered at all; this must not panic or misroute.
    link.transport_mut()
        .push_inbound("cmnd/dev-ab12cd", br#"{"a":1}"#);
    link.tick();
    assert!(link.is_connected());
}

#[test]
fn prefixed_inbound_topics_classify_after_stripping() {
    let mut link = DeviceLink::new(MockTransport::new());
    link.set_broker("10.0.0.5", 1883);
    link.set_client_id("dev1").unwrap();
    link.set_topic_prefix(Some("site42"));
    let seen = collecting_handler(&mut link, true);
    link.tick();

    link.transport_mut()
        .push_inbound("site42/cmnd/dev1", br#"{"go":true}"#);
    link.tick();

    assert_eq!(*seen.borrow(), vec![json!({"go": true})]);
}

#[test]
fn applied_configuration_is_reflected_by_the_next_connect() {
    let mut link = DeviceLink::new(MockTransport::refusing());
    link.apply_config(&json!({
        "broker": "10.0.0.5",
        "clientId": "dev-ab12cd",
    }));

    let t0 = Instant::now();
    link.tick_at(t0);
    assert_eq!(
        link.transport().connect_log[0].will_topic,
        "stat/dev-ab12cd/lwt"
    );

    // Re-applying the same document twice changes nothing (idempotence).
    let doc = json!({
        "broker": "10.0.0.5",
        "clientId": "dev-ab12cd",
        "topicPrefix": "site42",
    });
    link.apply_config(&doc);
    let first = link.snapshot();
    link.apply_config(&doc);
    assert_eq!(link.snapshot(), first);

    link.transport_mut().restore();
    link.tick_at(t0 + Duration::from_secs(120));
    assert_eq!(
        link.transport().connect_log[1].will_topic,
        "site42/stat/dev-ab12cd/lwt"
    );
}

#[test]
fn publish_contract_across_connectivity() {
    let mut link = configured_link();

    // Disconnected: refused without a transport call.
    assert!(!link.publish("stat/dev-ab12cd", &json!({"up": true}), false));
    assert!(link.transport().published.is_empty());

    link.tick();

    // Connected: exactly one transport publish with the requested flag.
    assert!(link.publish("stat/dev-ab12cd", &json!({"up": true}), false));
    let published = &link.transport().published;
    assert_eq!(published.len(), 2); // online announcement + this publish
    assert_eq!(published[1].topic, "stat/dev-ab12cd");
    assert!(!published[1].retained);
}

struct RecordingIndicator {
    events: Rc<RefCell<Vec<String>>>,
}

impl edgelink::ActivityIndicator for RecordingIndicator {
    fn topic_changed(&mut self, wildcard_topic: &str) {
        self.events
            .borrow_mut()
            .push(format!("topic:{wildcard_topic}"));
    }

    fn message_received(&mut self) {
        self.events.borrow_mut().push("rx".to_string());
    }

    fn message_sent(&mut self) {
        self.events.borrow_mut().push("tx".to_string());
    }
}

#[test]
fn indicator_observes_namespace_changes_and_traffic() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut link = configured_link();
    link.set_indicator(RecordingIndicator {
        events: Rc::clone(&events),
    });
    link.set_topic_suffix(Some("garage"));
    link.tick();

    link.transport_mut()
        .push_inbound("cmnd/dev-ab12cd/garage", br#"{"a":1}"#);
    link.tick();
    link.publish_status(&json!({"up": true}));

    let events = events.borrow();
    assert_eq!(events[0], "topic:+/dev-ab12cd");
    assert_eq!(events[1], "topic:+/dev-ab12cd/garage");
    assert!(events.contains(&"rx".to_string()));
    assert!(events.contains(&"tx".to_string()));
}
