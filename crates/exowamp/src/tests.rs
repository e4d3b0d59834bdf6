use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;

use neowamp::AcceptEvent;
use neowamp::CallEvent;
use neowamp::CallFeatures;
use neowamp::Event;
use neowamp::PublishEvent;
use neowamp::PublishFeatures;
use neowamp::ReplyEvent;
use neowamp::Route;
use neowamp::YieldEvent;

use crate::mock_transport::DuplexTransport;
use crate::mock_transport::Fault;
use crate::peer;
use crate::peer::Peer;
use crate::peer::Response;
use crate::session::Session;
use crate::session::SessionOptions;
use crate::shared::Queue;
use crate::transport;
use crate::transport::Transport;

const WAIT: Duration = Duration::from_secs(5);

/// A peer wired to a bare transport the test drives by hand.
fn peer_with_router() -> (Peer, DuplexTransport, Fault) {
    let (client, router) = DuplexTransport::pair();
    let fault = client.fault();
    let peer = Peer::spawn("client", Box::new(client));
    (peer, router, fault)
}

async fn read(router: &DuplexTransport) -> Event {
    tokio::time::timeout(WAIT, router.read())
        .await
        .expect("router read timed out")
        .expect("router read failed")
}

async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

fn publish(uri: &str) -> PublishEvent {
    PublishEvent::new(PublishFeatures::new(uri), json!("Hello, WAMP!"))
}

#[tokio::test]
async fn test_send_resolves_on_accept() {
    let (peer, router, _) = peer_with_router();
    let event = publish("net.example");
    let id = event.id.clone();

    let sender = peer.clone();
    let send = tokio::spawn(async move { sender.send(event).await });

    let Event::Publish(received) = read(&router).await else {
        panic!("expected a publish");
    };
    assert_eq!(received.id, id);
    router.write(&AcceptEvent::new(&id).into()).await.unwrap();

    tokio::time::timeout(WAIT, send).await.unwrap().unwrap().unwrap();
    assert!(peer.pending_accept_events().is_empty());
}

#[tokio::test]
async fn test_inbound_events_are_acknowledged() {
    let (peer, router, _) = peer_with_router();
    let seen = Arc::new(Queue::<PublishEvent, ()>::new());
    let sink = seen.clone();
    peer.incoming_publish_events().observe(move |event| sink.put(event));

    let event = publish("net.example");
    router.write(&event.clone().into()).await.unwrap();

    let Event::Accept(accept) = read(&router).await else {
        panic!("expected an accept");
    };
    assert_eq!(accept.features.source_id, event.id);
    assert_eq!(tokio::time::timeout(WAIT, seen.pop()).await.unwrap(), Ok(event));
}

#[tokio::test]
async fn test_reply_resolves_pending_call() {
    let (peer, router, _) = peer_with_router();
    let call = CallEvent::new(CallFeatures::new("net.example", Duration::from_secs(60)), json!(1));
    let response = peer.pending_reply_events().create(&call.id).unwrap();

    let sender = peer.clone();
    let outgoing = call.clone();
    tokio::spawn(async move { sender.send(outgoing).await });

    assert!(matches!(read(&router).await, Event::Call(_)));
    router.write(&AcceptEvent::new(&call.id).into()).await.unwrap();
    let reply = ReplyEvent::new(&call.id, json!(2));
    router.write(&reply.clone().into()).await.unwrap();

    let resolved = tokio::time::timeout(WAIT, response).await.unwrap().unwrap();
    assert_eq!(resolved, Response::Reply(reply.clone()));
    let Event::Accept(accept) = read(&router).await else {
        panic!("expected an accept for the reply");
    };
    assert_eq!(accept.features.source_id, reply.id);
}

#[tokio::test]
async fn test_uncorrelated_events_are_survivable() {
    let (peer, router, _) = peer_with_router();
    let seen = Arc::new(Queue::<PublishEvent, ()>::new());
    let sink = seen.clone();
    peer.incoming_publish_events().observe(move |event| sink.put(event));

    router.write(&AcceptEvent::new("nobody").into()).await.unwrap();
    router.write(&ReplyEvent::new("nobody", json!(null)).into()).await.unwrap();
    router.write_raw("definitely not an event");
    router.write_raw(r#"{"ID": "x", "kind": 42, "features": {}}"#);

    let event = publish("net.example");
    router.write(&event.clone().into()).await.unwrap();
    assert_eq!(tokio::time::timeout(WAIT, seen.pop()).await.unwrap(), Ok(event));
    assert!(!peer.is_closed());
}

#[tokio::test]
async fn test_error_with_message_only_resolves_call() {
    let (peer, router, _) = peer_with_router();
    let response = peer.pending_reply_events().create("c1").unwrap();

    router.write_raw(
        r#"{"ID": "e1", "kind": -126, "features": {"invocationID": "c1"}, "payload": {"message": "SomethingWentWrong"}}"#,
    );

    let Response::Error(error) = tokio::time::timeout(WAIT, response).await.unwrap().unwrap() else {
        panic!("expected an error response");
    };
    assert_eq!(error.payload.name, "SomethingWentWrong");
    let Event::Accept(accept) = read(&router).await else {
        panic!("expected an accept");
    };
    assert_eq!(accept.features.source_id, "e1");
}

#[tokio::test]
async fn test_malformed_answer_fails_call() {
    let (peer, router, _) = peer_with_router();
    let response = peer.pending_reply_events().create("c2").unwrap();

    router.write_raw(r#"{"ID": "e2", "kind": -126, "features": {"invocationID": "c2"}, "payload": 42}"#);

    let resolved = tokio::time::timeout(WAIT, response).await.unwrap();
    assert!(matches!(resolved.map_err(peer::Error::from), Err(peer::Error::Protocol(_))));
    let Event::Accept(accept) = read(&router).await else {
        panic!("expected an accept");
    };
    assert_eq!(accept.features.source_id, "e2");
    assert!(!peer.is_closed());
}

#[tokio::test]
async fn test_inbound_call_reaches_observers_with_route() {
    let (peer, router, _) = peer_with_router();
    let seen = Arc::new(Queue::<CallEvent, ()>::new());
    let sink = seen.clone();
    peer.incoming_call_events().observe(move |event| sink.put(event));

    let mut call = CallEvent::new(CallFeatures::new("net.example", Duration::from_secs(1)), json!([1, 2]));
    call.route = Some(Route::to_endpoint("registration"));
    router.write(&call.clone().into()).await.unwrap();

    let received = tokio::time::timeout(WAIT, seen.pop()).await.unwrap().unwrap();
    assert_eq!(received.route.unwrap().endpoint_id, "registration");
}

#[tokio::test]
async fn test_restored_cancels_accepts_and_rejoins() {
    let (peer, router, fault) = peer_with_router();
    let rejoins = Arc::new(AtomicUsize::new(0));
    let counter = rejoins.clone();
    peer.rejoin_events().observe(move |()| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let sender = peer.clone();
    let send = tokio::spawn(async move { sender.send(publish("net.example")).await });
    assert!(matches!(read(&router).await, Event::Publish(_)));

    fault.inject(transport::Error::Restored);
    let result = tokio::time::timeout(WAIT, send).await.unwrap().unwrap();
    assert!(matches!(result, Err(peer::Error::ConnectionRestored)));
    eventually(|| rejoins.load(Ordering::SeqCst) == 1).await;
    assert!(!peer.is_closed());
}

#[tokio::test]
async fn test_terminal_fault_tears_everything_down() {
    let (peer, router, _) = peer_with_router();
    let completed = Arc::new(AtomicUsize::new(0));
    let counter = completed.clone();
    peer.incoming_call_events().observe_with_complete(|_| {}, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let response = peer.pending_reply_events().create("call").unwrap();
    let next = peer.pending_next_events().create("yield").unwrap();

    router.close().await.unwrap();

    let resolved = tokio::time::timeout(WAIT, response).await.unwrap();
    assert!(matches!(resolved.map_err(peer::Error::from), Err(peer::Error::ConnectionClosed)));
    assert!(tokio::time::timeout(WAIT, next).await.unwrap().is_err());
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert!(peer.is_closed());
    assert!(peer.incoming_publish_events().is_closed());
}

#[tokio::test]
async fn test_send_after_close_fails() {
    let (peer, _router, _) = peer_with_router();
    peer.close().await.unwrap();
    let result = peer.send(publish("net.example")).await;
    assert!(matches!(result, Err(peer::Error::ConnectionClosed)));
    assert!(peer.pending_accept_events().is_empty());
}

#[tokio::test]
async fn test_two_peers_confirm_each_other() {
    let (a, b) = DuplexTransport::pair();
    let a = Peer::spawn("a", Box::new(a));
    let b = Peer::spawn("b", Box::new(b));

    let seen = Arc::new(Queue::<PublishEvent, ()>::new());
    let sink = seen.clone();
    b.incoming_publish_events().observe(move |event| sink.put(event));

    let event = publish("net.example");
    tokio::time::timeout(WAIT, a.send(event.clone())).await.unwrap().unwrap();
    assert_eq!(tokio::time::timeout(WAIT, seen.pop()).await.unwrap(), Ok(event));
}

#[tokio::test]
async fn test_stream_requests_carry_call_timeout() {
    let (peer, router, _) = peer_with_router();
    let session = Session::new(peer);
    let timeout = Duration::from_secs(7);

    let caller = session.clone();
    let task = tokio::spawn(async move {
        let mut generator = caller
            .call_with("net.example", serde_json::Value::Null, timeout)
            .await?
            .into_stream()?;
        generator.advance().await
    });

    let Event::Call(call) = read(&router).await else {
        panic!("expected a call");
    };
    assert_eq!(call.features.timeout(), timeout);
    router.write(&AcceptEvent::new(&call.id).into()).await.unwrap();
    let first = YieldEvent::new(&call.id, json!({"ID": "g"}));
    router.write(&first.into()).await.unwrap();

    let next = loop {
        match read(&router).await {
            Event::Next(next) => break next,
            Event::Accept(_) => continue,
            other => panic!("unexpected {:?}", other.kind()),
        }
    };
    assert_eq!(next.features.generator_id, "g");
    assert_eq!(next.features.timeout(), timeout);
    assert_ne!(timeout, SessionOptions::default().default_timeout);

    router.write(&AcceptEvent::new(&next.id).into()).await.unwrap();
    router
        .write(&YieldEvent::new(&next.id, json!(1)).into())
        .await
        .unwrap();
    let value = tokio::time::timeout(WAIT, task).await.unwrap().unwrap().unwrap();
    assert_eq!(value, Some(json!(1)));
}
