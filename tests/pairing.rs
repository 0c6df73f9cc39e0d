//! End-to-end behaviour of a handheld/wearable pair over the in-memory
//! transport.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::{Instant, timeout};
use wearlink::core::{HANDSHAKE_PATH, LIVENESS_PATH, PROBE_TOKEN};
use wearlink::prelude::*;

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn temp_dir() -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("wearlink_pairing_{}_{}", std::process::id(), n));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn start(transport: Arc<MemoryTransport>, role: Role) -> Endpoint {
    Endpoint::builder(role)
        .mailbox_store(MemoryStore::new())
        .start(transport)
        .unwrap()
}

async fn wait_for_pending(endpoint: &Endpoint, count: usize) {
    timeout(Duration::from_secs(5), async {
        while endpoint.pending_count().unwrap() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("messages never reached the mailbox");
}

async fn next_message(events: &mut EventStream) -> PendingMessage {
    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(LinkEvent::MessageReceived(message)) => return message,
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("no message event")
}

#[tokio::test(start_paused = true)]
async fn test_peer_answers_probe_quickly() {
    let network = MemoryNetwork::new();
    let (phone_link, watch_link) = network.pair();
    watch_link.set_send_delay("phone", Duration::from_millis(200));
    let phone = start(phone_link.clone(), Role::Handheld);
    let _watch = start(watch_link, Role::Wearable);

    let started = Instant::now();
    assert!(phone.check_connection().await.unwrap());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(1));

    let probes = phone_link.sent_on(HANDSHAKE_PATH);
    assert_eq!(probes.len(), 1);
    assert!(probes[0].payload.starts_with(&format!("{PROBE_TOKEN}:")));
}

#[tokio::test(start_paused = true)]
async fn test_peer_app_not_running_times_out() {
    let network = MemoryNetwork::new();
    let (phone_link, _watch_link) = network.pair();
    let phone = start(phone_link.clone(), Role::Handheld);

    let started = Instant::now();
    let outcome = phone.check_connection_outcome().await.unwrap();
    assert_eq!(outcome, HandshakeOutcome::TimedOut);

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(30));
    assert!(elapsed < Duration::from_secs(31));

    let probes = phone_link.sent_on(HANDSHAKE_PATH);
    assert_eq!(probes.len(), 3);
    assert_ne!(probes[0].payload, probes[1].payload);
    assert_ne!(probes[1].payload, probes[2].payload);
    assert_ne!(probes[0].payload, probes[2].payload);

    let state = phone.connection_state();
    assert!(state.node_present);
    assert!(!state.ack_received);
}

#[tokio::test(start_paused = true)]
async fn test_no_connected_node_sends_nothing() {
    let network = MemoryNetwork::new();
    let phone_link = network.transport(Node::new("phone", "Phone", true));
    let phone = start(phone_link.clone(), Role::Handheld);

    let started = Instant::now();
    assert!(!phone.check_connection().await.unwrap());
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(phone_link.sent_frames().is_empty());
    assert_eq!(phone.connection_state(), ConnectionState::default());
}

#[tokio::test(start_paused = true)]
async fn test_message_waits_in_mailbox_until_attach() {
    let network = MemoryNetwork::new();
    let (phone_link, watch_link) = network.pair();
    let phone = start(phone_link, Role::Handheld);
    let watch = start(watch_link, Role::Wearable);
    let mut events = watch.events();

    let report = phone.send_message("hello").await.unwrap();
    assert_eq!(report.delivered_via, "watch");
    wait_for_pending(&watch, 1).await;
    assert!(events.try_recv().is_none());

    let session = watch.attach_foreground().unwrap();
    assert_eq!(session.drained(), 1);
    let message = next_message(&mut events).await;
    assert_eq!(message.payload, "hello");
    assert_eq!(message.source_node_id, "phone");
    assert_eq!(message.path, Role::Handheld.outbound_path());
    assert_eq!(watch.pending_count().unwrap(), 0);

    drop(session);
    let again = watch.attach_foreground().unwrap();
    assert_eq!(again.drained(), 0);
    assert!(events.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_first_successful_node_wins() {
    let network = MemoryNetwork::new();
    let (phone_link, _watch_link) = network.pair();
    phone_link.add_peer(Node::new("tablet", "Tablet", true));
    phone_link.set_send_delay("tablet", Duration::from_millis(500));
    phone_link.fail_sends_to("tablet", "link lost");
    let phone = start(phone_link.clone(), Role::Handheld);
    let mut events = phone.events();

    let report = phone.send_message("x").await.unwrap();
    assert_eq!(report.delivered_via, "watch");
    assert_eq!(report.attempted.len(), 2);
    assert_eq!(
        events.try_recv(),
        Some(LinkEvent::MessageSent {
            success: true,
            payload: "x".into()
        })
    );

    // The late failure still runs, and is not surfaced.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(phone_link.sent_frames().len(), 2);
    assert!(events.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_every_node_failing_is_an_error() {
    let network = MemoryNetwork::new();
    let (phone_link, _watch_link) = network.pair();
    phone_link.fail_sends_to("watch", "link lost");
    let phone = start(phone_link, Role::Handheld);

    match phone.send_message("x").await {
        Err(LinkError::SendFailed { attempted, failures }) => {
            assert_eq!(attempted, 1);
            assert_eq!(failures[0].node_id, "watch");
        }
        other => panic!("unexpected send result: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_control_traffic_never_reaches_event_bus() {
    let network = MemoryNetwork::new();
    let (phone_link, watch_link) = network.pair();
    let phone = start(phone_link, Role::Handheld);
    let watch = start(watch_link.clone(), Role::Wearable);
    let _session = watch.attach_foreground().unwrap();
    let mut events = watch.events();

    assert!(phone.check_connection().await.unwrap());
    assert!(phone.ping().await.unwrap().ack_received);
    assert!(watch.check_connection().await.unwrap());

    // Control payloads on control paths, plus garbage on an unknown path.
    for (path, payload) in [
        (HANDSHAKE_PATH, "hello"),
        (HANDSHAKE_PATH, PROBE_TOKEN),
        (LIVENESS_PATH, "ping"),
        (LIVENESS_PATH, "ack"),
        ("/somewhere-else", "hello"),
    ] {
        assert!(watch_link.inject(Frame::new(path, payload, "phone")));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(
        events
            .drain()
            .iter()
            .all(|e| !matches!(e, LinkEvent::MessageReceived(_)))
    );
    assert_eq!(watch.pending_count().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_attach_and_detach_never_lose_or_reorder() {
    let network = MemoryNetwork::new();
    let (phone_link, watch_link) = network.pair();
    let phone = start(phone_link, Role::Handheld);
    let watch = start(watch_link, Role::Wearable);
    let mut events = watch.events();

    let mut session = None;
    for i in 0..20 {
        if i % 5 == 0 {
            session = match session.take() {
                Some(_) => None,
                None => Some(watch.attach_foreground().unwrap()),
            };
        }
        phone.send_message(&format!("m{i}")).await.unwrap();
    }
    let _session = match session {
        Some(session) => session,
        None => watch.attach_foreground().unwrap(),
    };

    let mut received = Vec::new();
    while received.len() < 20 {
        received.push(next_message(&mut events).await.payload);
    }
    let expected: Vec<String> = (0..20).map(|i| format!("m{i}")).collect();
    assert_eq!(received, expected);
    assert_eq!(watch.pending_count().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_mailbox_survives_endpoint_restart() {
    let dir = temp_dir();
    let network = MemoryNetwork::new();
    let (phone_link, watch_link) = network.pair();
    let phone = start(phone_link, Role::Handheld);

    {
        let watch = Endpoint::builder(Role::Wearable)
            .mailbox_dir(&dir)
            .start(watch_link.clone())
            .unwrap();
        phone.send_message("while you were away").await.unwrap();
        wait_for_pending(&watch, 1).await;
    }

    let watch = Endpoint::builder(Role::Wearable)
        .mailbox_dir(&dir)
        .start(watch_link)
        .unwrap();
    assert_eq!(watch.pending_count().unwrap(), 1);

    let mut events = watch.events();
    let session = watch.attach_foreground().unwrap();
    assert_eq!(session.drained(), 1);
    assert_eq!(next_message(&mut events).await.payload, "while you were away");

    watch.shutdown().unwrap();
    let reopened = FileStore::new(&dir, &LinkConfig::default().mailbox_key);
    assert!(reopened.load().unwrap().is_empty());

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test(start_paused = true)]
async fn test_frames_from_host_thread() {
    let network = MemoryNetwork::new();
    let (_phone_link, watch_link) = network.pair();
    let watch = start(watch_link, Role::Wearable);
    let sink = watch.frame_sink();

    std::thread::spawn(move || {
        for i in 0..3 {
            let frame = Frame::new(Role::Handheld.outbound_path(), format!("bg{i}"), "phone");
            assert!(sink.deliver(frame));
        }
    })
    .join()
    .unwrap();

    wait_for_pending(&watch, 3).await;
    let mut events = watch.events();
    let _session = watch.attach_foreground().unwrap();
    for i in 0..3 {
        assert_eq!(next_message(&mut events).await.payload, format!("bg{i}"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_superseded_check_resolves_false() {
    let network = MemoryNetwork::new();
    let (phone_link, _watch_link) = network.pair();
    let phone = Arc::new(start(phone_link.clone(), Role::Handheld));

    let first = tokio::spawn({
        let phone = Arc::clone(&phone);
        async move { phone.check_connection_outcome().await }
    });
    while phone_link.sent_on(HANDSHAKE_PATH).is_empty() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let second = tokio::spawn({
        let phone = Arc::clone(&phone);
        async move { phone.check_connection_outcome().await }
    });

    assert_eq!(first.await.unwrap().unwrap(), HandshakeOutcome::Superseded);
    assert_eq!(second.await.unwrap().unwrap(), HandshakeOutcome::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_check() {
    let network = MemoryNetwork::new();
    let (phone_link, _watch_link) = network.pair();
    let phone = Arc::new(start(phone_link.clone(), Role::Handheld));

    let check = tokio::spawn({
        let phone = Arc::clone(&phone);
        async move { phone.check_connection().await }
    });
    while phone_link.sent_on(HANDSHAKE_PATH).is_empty() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    phone.shutdown().unwrap();
    assert!(!check.await.unwrap().unwrap());
    assert_eq!(phone.connection_state(), ConnectionState::default());
}
