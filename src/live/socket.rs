use std::fmt::Display;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

use super::protocol::{self, ClientMessage, ServerMessage};
use super::{Command, LiveConfig, LiveEvent, Subscriptions};

enum SessionEnd {
    /// Closed on request, or nobody is listening for events any more.
    Closed,
    Dropped(String),
}

/// Connection loop: connect, run a session until it drops, back off, repeat.
pub(super) async fn run(
    config: LiveConfig,
    mut subscriptions: Subscriptions,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<LiveEvent>,
) {
    let mut attempt: u32 = 0;
    loop {
        match connect_async(config.url.as_str()).await {
            Ok((ws, _)) => {
                attempt = 0;
                info!(url = %config.url, "live channel connected");
                if events.send(LiveEvent::Connected).await.is_err() {
                    return;
                }
                match session(ws, &config, &mut subscriptions, &mut commands, &events).await {
                    SessionEnd::Closed => return,
                    SessionEnd::Dropped(reason) => {
                        info!(%reason, "live channel dropped");
                        if events.send(LiveEvent::Disconnected { reason }).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(err) => {
                warn!(url = %config.url, attempt, "live channel connect failed: {}", err);
            }
        }

        let delay = config.backoff.delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!(?delay, "reconnecting after backoff");
        if !wait(delay, &mut subscriptions, &mut commands).await {
            return;
        }
    }
}

/// Sleep out the backoff while still taking subscription changes, which the
/// next session replays. Returns `false` if the channel was closed.
async fn wait(
    delay: Duration,
    subscriptions: &mut Subscriptions,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            command = commands.recv() => match command {
                Some(command) => {
                    if apply(subscriptions, command).is_none() {
                        return false;
                    }
                }
                None => return false,
            },
        }
    }
}

async fn session(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    config: &LiveConfig,
    subscriptions: &mut Subscriptions,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &mpsc::Sender<LiveEvent>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();

    // The server keeps no per-connection state, so every session starts by
    // restating the full subscription set.
    let replay = ClientMessage::SetInstances(subscriptions.included());
    if let Err(reason) = send(&mut sink, &replay).await {
        return SessionEnd::Dropped(reason);
    }

    let mut heartbeat = tokio::time::interval_at(Instant::now() + config.heartbeat, config.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if let Err(reason) = send(&mut sink, &ClientMessage::Ping).await {
                    return SessionEnd::Dropped(reason);
                }
            }

            command = commands.recv() => {
                let message = match command.and_then(|c| apply(subscriptions, c)) {
                    Some(message) => message,
                    None => {
                        let _ = sink.close().await;
                        return SessionEnd::Closed;
                    }
                };
                if let Err(reason) = send(&mut sink, &message).await {
                    return SessionEnd::Dropped(reason);
                }
            }

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match protocol::decode(&text) {
                    Ok(ServerMessage::NewLine(line)) => {
                        if events.send(LiveEvent::Line(line)).await.is_err() {
                            return SessionEnd::Closed;
                        }
                    }
                    Ok(ServerMessage::Ping) => {
                        if let Err(reason) = send(&mut sink, &ClientMessage::Pong).await {
                            return SessionEnd::Dropped(reason);
                        }
                    }
                    Ok(ServerMessage::Pong) => trace!("heartbeat acknowledged"),
                    Ok(ServerMessage::Other(kind)) => debug!(%kind, "ignoring live message"),
                    Err(err) => warn!("dropping live message: {}", err),
                },
                Some(Ok(Message::Close(frame))) => {
                    return SessionEnd::Dropped(format!("closed by server: {frame:?}"));
                }
                // Control frames are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(err)) => return SessionEnd::Dropped(err.to_string()),
                None => return SessionEnd::Dropped("connection ended".to_string()),
            },
        }
    }
}

/// Apply a command to the local subscription set and return the message
/// announcing it, or `None` for [`Command::Close`].
///
/// Every change restates the whole included set so the server never has to
/// reconcile a partial update against state it may have lost.
fn apply(subscriptions: &mut Subscriptions, command: Command) -> Option<ClientMessage> {
    match command {
        Command::SetInstances(ids) => subscriptions.replace(ids),
        Command::Add(id) => subscriptions.include(id),
        Command::Remove(id) => subscriptions.exclude(id),
        Command::Close => return None,
    }
    Some(ClientMessage::SetInstances(subscriptions.included()))
}

async fn send<S>(sink: &mut S, message: &ClientMessage) -> Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let json = message.to_json().map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
