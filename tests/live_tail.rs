use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};

use tideline::live::{Backoff, LiveConfig, LiveEvent, LiveTailChannel, Subscriptions};

const WAIT: Duration = Duration::from_secs(5);

async fn listen(heartbeat: Duration) -> (TcpListener, LiveConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = LiveConfig {
        url: format!("ws://{addr}/ws/billing"),
        heartbeat,
        backoff: Backoff {
            min: Duration::from_millis(10),
            max: Duration::from_millis(50),
        },
    };
    (listener, config)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (tcp, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    accept_async(tcp).await.unwrap()
}

/// Next text frame from the client, parsed.
async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("client went quiet")
            .expect("client hung up")
            .expect("bad frame");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn next_event(events: &mut mpsc::Receiver<LiveEvent>) -> LiveEvent {
    timeout(WAIT, events.recv()).await.unwrap().unwrap()
}

fn new_line(id: &str, ts: i64) -> String {
    json!({
        "type": "newLine",
        "data": {
            "id": id,
            "timestamp": ts,
            "sequenceNumber": 0,
            "content": "GET /health 200",
            "source": {"id": "api-1", "address": "10.0.0.1"}
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_replays_subscriptions_and_delivers_lines() {
    let (listener, config) = listen(Duration::from_secs(30)).await;
    let (mut channel, mut events) = LiveTailChannel::open(config, Subscriptions::from_included(["api-1"]));

    let mut ws = accept(&listener).await;
    assert_eq!(next_json(&mut ws).await, json!({"type": "setInstances", "data": ["api-1"]}));
    assert!(matches!(next_event(&mut events).await, LiveEvent::Connected));

    // Malformed payloads are dropped without ending the session.
    ws.send(Message::Text("{not json".into())).await.unwrap();
    ws.send(Message::Text(r#"{"type":"newLine"}"#.into())).await.unwrap();
    ws.send(Message::Text(new_line("l-1", 10))).await.unwrap();

    match next_event(&mut events).await {
        LiveEvent::Line(line) => {
            assert_eq!(line.id, "l-1");
            assert_eq!(line.instance_id(), "api-1");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // Each change restates the full included set.
    channel.add_subscription("api-2");
    assert_eq!(
        next_json(&mut ws).await,
        json!({"type": "setInstances", "data": ["api-1", "api-2"]})
    );
    channel.remove_subscription("api-1");
    assert_eq!(
        next_json(&mut ws).await,
        json!({"type": "setInstances", "data": ["api-2"]})
    );

    channel.close();
}

#[tokio::test]
async fn test_reconnect_replays_current_set() {
    let (listener, config) = listen(Duration::from_secs(30)).await;
    let (mut channel, mut events) =
        LiveTailChannel::open(config, Subscriptions::from_included(["api-1", "api-2"]));

    let mut first = accept(&listener).await;
    assert_eq!(
        next_json(&mut first).await,
        json!({"type": "setInstances", "data": ["api-1", "api-2"]})
    );
    assert!(matches!(next_event(&mut events).await, LiveEvent::Connected));

    channel.remove_subscription("api-2");
    next_json(&mut first).await;
    first.close(None).await.unwrap();
    drop(first);

    assert!(matches!(next_event(&mut events).await, LiveEvent::Disconnected { .. }));

    let mut second = accept(&listener).await;
    assert_eq!(
        next_json(&mut second).await,
        json!({"type": "setInstances", "data": ["api-1"]})
    );
    assert!(matches!(next_event(&mut events).await, LiveEvent::Connected));

    channel.close();
}

#[tokio::test]
async fn test_heartbeat_and_pong() {
    let (listener, config) = listen(Duration::from_millis(50)).await;
    let (mut channel, _events) = LiveTailChannel::open(config, Subscriptions::new());

    let mut ws = accept(&listener).await;
    assert_eq!(next_json(&mut ws).await, json!({"type": "setInstances", "data": []}));
    assert_eq!(next_json(&mut ws).await, json!({"type": "ping"}));

    ws.send(Message::Text(r#"{"type":"ping"}"#.into())).await.unwrap();
    loop {
        let message = next_json(&mut ws).await;
        if message == json!({"type": "pong"}) {
            break;
        }
        assert_eq!(message, json!({"type": "ping"}));
    }

    channel.close();
}

#[tokio::test]
async fn test_close_stops_connection_and_reconnects() {
    let (listener, config) = listen(Duration::from_secs(30)).await;
    let (mut channel, _events) = LiveTailChannel::open(config, Subscriptions::new());

    let mut ws = accept(&listener).await;
    next_json(&mut ws).await;

    channel.close();
    channel.close();
    assert!(channel.is_closed());

    // The server is told, rather than seeing the socket vanish.
    let end = timeout(WAIT, ws.next()).await.unwrap();
    assert!(matches!(end, Some(Ok(Message::Close(_)))), "unexpected end: {end:?}");

    // No reconnect attempt after close.
    assert!(timeout(Duration::from_millis(200), listener.accept()).await.is_err());
}
