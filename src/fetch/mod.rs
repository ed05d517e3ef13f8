//! Cursor-based paging against the history service.
//!
//! [`PageFetchCoordinator`] owns the scrollback container for one stream view
//! and is the only place history requests are issued from. Requests run on
//! spawned tasks and report back through an unbounded channel; the event
//! loop hands each [`PageResponse`] to [`PageFetchCoordinator::complete`],
//! so every container mutation happens on the loop itself.

pub mod http;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::container::OrderedLines;
use crate::error::FetchError;
use crate::line::{Ascending, LogLine};
use crate::stream::StreamKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

/// Exclusive boundary for the next page, always taken from a held line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub time: i64,
    pub sequence_number: i64,
    pub direction: Direction,
}

impl Cursor {
    /// Page of lines older than `line`.
    pub fn before(line: &LogLine) -> Self {
        Self {
            time: line.timestamp,
            sequence_number: line.sequence_number,
            direction: Direction::Backward,
        }
    }

    /// Page of lines newer than `line`.
    pub fn after(line: &LogLine) -> Self {
        Self {
            time: line.timestamp,
            sequence_number: line.sequence_number,
            direction: Direction::Forward,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FetchState {
    /// Fresh container, first page requested or not yet loaded.
    #[default]
    Initial,
    Idle,
    FetchingNext,
    FetchingPrevious,
}

/// Which request a page answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageKind {
    First,
    Previous,
    Next,
}

/// Everything the history service needs to serve one page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageQuery {
    pub source_id: String,
    pub instances: Vec<String>,
    pub search: Option<String>,
    pub cursor: Option<Cursor>,
}

/// The history service, specified only at its interface.
///
/// A page is returned ascending by `(timestamp, sequence_number)`; an empty
/// page means there is nothing further in that direction.
#[async_trait::async_trait]
pub trait HistoryService: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<LogLine>, FetchError>;
}

/// Completion of a spawned page request.
#[derive(Debug)]
pub struct PageResponse {
    pub generation: u64,
    pub kind: PageKind,
    pub result: Result<Vec<LogLine>, FetchError>,
}

/// What applying a [`PageResponse`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageOutcome {
    /// Response belonged to a discarded container and was dropped.
    Stale,
    Loaded { kind: PageKind, added: usize },
    Exhausted(PageKind),
    Failed { kind: PageKind, retryable: bool },
}

#[derive(Debug)]
struct FetchFailure {
    message: String,
    retryable: bool,
}

#[derive(Debug, Default)]
struct FetchErrors {
    first: Option<FetchFailure>,
    previous: Option<FetchFailure>,
    next: Option<FetchFailure>,
}

impl FetchErrors {
    fn slot(&mut self, kind: PageKind) -> &mut Option<FetchFailure> {
        match kind {
            PageKind::First => &mut self.first,
            PageKind::Previous => &mut self.previous,
            PageKind::Next => &mut self.next,
        }
    }

    fn get(&self, kind: PageKind) -> Option<&FetchFailure> {
        match kind {
            PageKind::First => self.first.as_ref(),
            PageKind::Previous => self.previous.as_ref(),
            PageKind::Next => self.next.as_ref(),
        }
    }
}

pub struct PageFetchCoordinator {
    service: Arc<dyn HistoryService>,
    completions: mpsc::UnboundedSender<PageResponse>,
    key: StreamKey,
    lines: OrderedLines<Ascending>,
    state: FetchState,
    generation: u64,
    in_flight: Option<JoinHandle<()>>,
    exhausted_previous: bool,
    exhausted_next: bool,
    errors: FetchErrors,
    last_failed: Option<PageKind>,
}

impl PageFetchCoordinator {
    /// Create a coordinator in the `Initial` state. Nothing is requested
    /// until [`start`](Self::start) or [`reset`](Self::reset).
    pub fn new(
        service: Arc<dyn HistoryService>,
        completions: mpsc::UnboundedSender<PageResponse>,
        key: StreamKey,
    ) -> Self {
        Self {
            service,
            completions,
            key,
            lines: OrderedLines::new(Ascending),
            state: FetchState::Initial,
            generation: 0,
            in_flight: None,
            exhausted_previous: false,
            exhausted_next: false,
            errors: FetchErrors::default(),
            last_failed: None,
        }
    }

    /// Request the first page if nothing has been requested yet.
    pub fn start(&mut self) -> bool {
        if self.state != FetchState::Initial || self.in_flight.is_some() {
            return false;
        }
        self.issue(PageKind::First, None);
        true
    }

    /// Discard the container and begin again from an uncursored first page.
    pub fn reset(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        self.generation += 1;
        self.lines = OrderedLines::new(Ascending);
        self.state = FetchState::Initial;
        self.exhausted_previous = false;
        self.exhausted_next = false;
        self.errors = FetchErrors::default();
        self.last_failed = None;
        debug!(generation = self.generation, source = %self.key.source_id, "stream reset");
        self.issue(PageKind::First, None);
    }

    /// Reset onto a new set of identifying parameters.
    pub fn reset_with(&mut self, key: StreamKey) {
        self.key = key;
        self.reset();
    }

    /// Request the page before the oldest held line.
    ///
    /// Dropped unless idle, or once the history service has reported there
    /// is nothing older.
    pub fn fetch_previous(&mut self) -> bool {
        if self.state != FetchState::Idle || self.exhausted_previous {
            return false;
        }
        let Some(oldest) = self.lines.head() else {
            return false;
        };
        let cursor = Cursor::before(oldest);
        self.issue(PageKind::Previous, Some(cursor));
        true
    }

    /// Request the page after the newest held line.
    pub fn fetch_next(&mut self) -> bool {
        if self.state != FetchState::Idle || self.exhausted_next {
            return false;
        }
        let Some(newest) = self.lines.tail() else {
            return false;
        };
        let cursor = Cursor::after(newest);
        self.issue(PageKind::Next, Some(cursor));
        true
    }

    /// Reissue the most recent failed request.
    pub fn retry(&mut self) -> bool {
        if self.state != FetchState::Idle {
            return false;
        }
        if self.lines.is_empty() {
            self.issue(PageKind::First, None);
            return true;
        }
        match self.last_failed {
            // Live lines arrived after the first page failed; history is
            // still missing, so ask for the newest page again.
            Some(PageKind::First) => {
                self.issue(PageKind::First, None);
                true
            }
            Some(PageKind::Previous) => self.fetch_previous(),
            Some(PageKind::Next) => self.fetch_next(),
            None => false,
        }
    }

    /// Allow forward paging again, e.g. after the live channel missed lines.
    pub fn resume_forward(&mut self) {
        self.exhausted_next = false;
    }

    /// Apply a finished request. Responses from an earlier generation are
    /// dropped without touching the container.
    pub fn complete(&mut self, response: PageResponse) -> PageOutcome {
        if response.generation != self.generation {
            debug!(
                stale = response.generation,
                current = self.generation,
                kind = ?response.kind,
                "dropping page for discarded stream"
            );
            return PageOutcome::Stale;
        }

        let kind = response.kind;
        self.in_flight = None;
        self.state = FetchState::Idle;

        match response.result {
            Ok(page) => {
                *self.errors.slot(kind) = None;
                // Any loaded page also means history is reachable again.
                self.errors.first = None;
                if matches!(self.last_failed, Some(k) if k == kind || k == PageKind::First) {
                    self.last_failed = None;
                }
                if page.is_empty() {
                    match kind {
                        PageKind::First | PageKind::Previous => self.exhausted_previous = true,
                        PageKind::Next => self.exhausted_next = true,
                    }
                    debug!(?kind, "no more history in this direction");
                    return PageOutcome::Exhausted(kind);
                }
                let added = self.lines.insert_many(page);
                debug!(?kind, added, total = self.lines.len(), "page merged");
                PageOutcome::Loaded { kind, added }
            }
            Err(err) => {
                let retryable = err.is_retryable();
                warn!(?kind, retryable, "page fetch failed: {}", err);
                *self.errors.slot(kind) = Some(FetchFailure {
                    message: err.to_string(),
                    retryable,
                });
                self.last_failed = Some(kind);
                PageOutcome::Failed { kind, retryable }
            }
        }
    }

    /// Merge a line from the live channel.
    pub fn merge_live(&mut self, line: LogLine) -> bool {
        self.lines.insert(line)
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    pub fn lines(&self) -> &OrderedLines<Ascending> {
        &self.lines
    }

    pub fn is_exhausted(&self, direction: Direction) -> bool {
        match direction {
            Direction::Backward => self.exhausted_previous,
            Direction::Forward => self.exhausted_next,
        }
    }

    /// Last error for a request kind, cleared once that kind succeeds.
    pub fn error(&self, kind: PageKind) -> Option<&str> {
        self.errors.get(kind).map(|failure| failure.message.as_str())
    }

    /// Whether the outstanding error for `kind` is worth retrying.
    pub fn is_retryable(&self, kind: PageKind) -> bool {
        self.errors.get(kind).is_some_and(|failure| failure.retryable)
    }

    fn issue(&mut self, kind: PageKind, cursor: Option<Cursor>) {
        let query = self.key.query(cursor);
        let service = Arc::clone(&self.service);
        let tx = self.completions.clone();
        let generation = self.generation;

        self.state = match kind {
            PageKind::First => FetchState::Initial,
            PageKind::Previous => FetchState::FetchingPrevious,
            PageKind::Next => FetchState::FetchingNext,
        };
        debug!(generation, ?kind, ?cursor, "requesting page");

        self.in_flight = Some(tokio::spawn(async move {
            let result = service.fetch_page(&query).await;
            // The receiver is gone only when the view is shutting down.
            let _ = tx.send(PageResponse {
                generation,
                kind,
                result,
            });
        }));
    }
}

impl Drop for PageFetchCoordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}
