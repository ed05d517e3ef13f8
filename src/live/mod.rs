//! Live tail over a persistent WebSocket.
//!
//! [`LiveTailChannel`] is a handle to a background task that keeps one
//! connection per source open: it reconnects with backoff, replays the
//! subscription set on every connect and sends a heartbeat on a fixed
//! interval. New lines come back as [`LiveEvent`]s on a channel, in the same
//! way log sources feed the event loop; merging them is left to the loop.
//!
//! Delivery order is whatever the network produces. Ordering is restored by
//! the container, never here.

pub mod protocol;
mod socket;

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

use crate::config::DEFAULT_CHANNEL_BUFFER;
use crate::line::LogLine;

/// How long [`LiveTailChannel::close`] waits for the connection to wind down.
pub const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Events emitted by the live channel
#[derive(Debug)]
pub enum LiveEvent {
    Connected,
    Disconnected { reason: String },
    Line(LogLine),
}

/// Instance id to "included" flag. The server owns the authoritative
/// filtering; this is the client's intent, replayed on reconnect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subscriptions {
    instances: BTreeMap<String, bool>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_included<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut subscriptions = Self::new();
        subscriptions.replace(ids);
        subscriptions
    }

    /// Replace the whole set with `ids`, all included.
    pub fn replace<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instances = ids.into_iter().map(|id| (id.into(), true)).collect();
    }

    pub fn include(&mut self, id: impl Into<String>) {
        self.instances.insert(id.into(), true);
    }

    pub fn exclude(&mut self, id: impl Into<String>) {
        self.instances.insert(id.into(), false);
    }

    pub fn is_included(&self, id: &str) -> bool {
        self.instances.get(id).copied().unwrap_or(false)
    }

    /// Included ids, sorted.
    pub fn included(&self) -> Vec<String> {
        self.instances
            .iter()
            .filter(|(_, included)| **included)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> + '_ {
        self.instances.iter().map(|(id, included)| (id.as_str(), *included))
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Reconnect delay doubling from `min` up to `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub min: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.min.saturating_mul(factor).min(self.max)
    }
}

#[derive(Clone, Debug)]
pub struct LiveConfig {
    /// Full `ws://` or `wss://` url of the source's channel.
    pub url: String,
    pub heartbeat: Duration,
    pub backoff: Backoff,
}

impl LiveConfig {
    pub fn new(server: &str, source_id: &str) -> Self {
        Self {
            url: live_url(server, source_id),
            heartbeat: Duration::from_secs(10),
            backoff: Backoff::default(),
        }
    }
}

/// Derive `/ws/{source}` on the same host as the history service.
pub fn live_url(server: &str, source_id: &str) -> String {
    let server = server.trim_end_matches('/');
    let base = if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if server.starts_with("ws://") || server.starts_with("wss://") {
        server.to_string()
    } else {
        format!("ws://{server}")
    };
    format!("{base}/ws/{source_id}")
}

#[derive(Debug)]
enum Command {
    SetInstances(Vec<String>),
    Add(String),
    Remove(String),
    Close,
}

pub struct LiveTailChannel {
    commands: mpsc::UnboundedSender<Command>,
    subscriptions: Subscriptions,
    task: Option<JoinHandle<()>>,
}

impl LiveTailChannel {
    /// Start the connection task and return the handle with its event stream.
    pub fn open(config: LiveConfig, subscriptions: Subscriptions) -> (Self, mpsc::Receiver<LiveEvent>) {
        let (event_tx, event_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(socket::run(config, subscriptions.clone(), command_rx, event_tx));

        let channel = Self {
            commands: command_tx,
            subscriptions,
            task: Some(task),
        };
        (channel, event_rx)
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    /// Replace the subscription set wholesale.
    pub fn set_instances<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscriptions.replace(ids);
        self.send(Command::SetInstances(self.subscriptions.included()));
    }

    pub fn add_subscription(&mut self, id: &str) {
        self.subscriptions.include(id);
        self.send(Command::Add(id.to_string()));
    }

    pub fn remove_subscription(&mut self, id: &str) {
        self.subscriptions.exclude(id);
        self.send(Command::Remove(id.to_string()));
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }

    /// Tear down the connection and heartbeat. Safe to call more than once.
    ///
    /// The task gets [`CLOSE_GRACE`] to send a close frame and return; it is
    /// aborted after that, or straight away outside a runtime.
    pub fn close(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        debug!("live channel closing");
        if self.commands.send(Command::Close).is_err() {
            task.abort();
            return;
        }
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if timeout(CLOSE_GRACE, &mut task).await.is_err() {
                        debug!("live channel did not close in time, aborting");
                        task.abort();
                    }
                });
            }
            Err(_) => task.abort(),
        }
    }

    fn send(&self, command: Command) {
        if self.task.is_none() {
            return;
        }
        // A closed command channel means the task already ended; the next
        // open starts from the subscription set held here.
        if self.commands.send(command).is_err() {
            debug!("live channel task is gone, subscription change kept locally");
        }
    }
}

impl Drop for LiveTailChannel {
    fn drop(&mut self) {
        self.close();
    }
}
