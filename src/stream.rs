//! One stream view: the scrollback, the recent-activity buffer, the page
//! coordinator and the viewport for a single set of identifying parameters.
//!
//! Changing any identifying parameter discards the whole view and starts a
//! new generation; nothing is carried over.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::container::OrderedLines;
use crate::fetch::{
    Cursor, FetchState, HistoryService, PageFetchCoordinator, PageKind, PageOutcome, PageQuery,
    PageResponse,
};
use crate::line::{Ascending, Descending, LogLine};
use crate::viewport::{Edge, ViewportController, ViewportSettings};

/// Parameters that identify a stream view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamKey {
    pub source_id: String,
    /// Included instances, sorted. Empty means every instance.
    pub instances: Vec<String>,
    pub search: Option<String>,
}

impl StreamKey {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            ..Self::default()
        }
    }

    pub fn with_instances<I, S>(mut self, instances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut instances: Vec<String> = instances.into_iter().map(Into::into).collect();
        instances.sort();
        instances.dedup();
        self.instances = instances;
        self
    }

    /// Blank search terms are treated as no search.
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        let trimmed = search.trim();
        self.search = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn query(&self, cursor: Option<Cursor>) -> PageQuery {
        PageQuery {
            source_id: self.source_id.clone(),
            instances: self.instances.clone(),
            search: self.search.clone(),
            cursor,
        }
    }

    /// Whether a live line belongs in this view.
    ///
    /// History pages are filtered by the service; live lines are filtered by
    /// subscription server-side but the search term only applies here.
    pub fn admits(&self, line: &LogLine) -> bool {
        if !self.instances.is_empty()
            && self.instances.binary_search_by(|i| i.as_str().cmp(line.instance_id())).is_err()
        {
            return false;
        }
        match &self.search {
            None => true,
            Some(term) => line.content.to_lowercase().contains(&term.to_lowercase()),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StreamSettings {
    pub recent_capacity: usize,
    pub viewport: ViewportSettings,
}

pub struct LogStream {
    coordinator: PageFetchCoordinator,
    recent: OrderedLines<Descending>,
    viewport: ViewportController,
    recent_capacity: usize,
}

impl LogStream {
    pub fn new(
        service: Arc<dyn HistoryService>,
        completions: mpsc::UnboundedSender<PageResponse>,
        key: StreamKey,
        settings: StreamSettings,
    ) -> Self {
        Self {
            coordinator: PageFetchCoordinator::new(service, completions, key),
            recent: OrderedLines::bounded(Descending, settings.recent_capacity),
            viewport: ViewportController::new(settings.viewport),
            recent_capacity: settings.recent_capacity,
        }
    }

    /// Request the first page.
    pub fn start(&mut self) {
        self.coordinator.start();
    }

    pub fn key(&self) -> &StreamKey {
        self.coordinator.key()
    }

    pub fn lines(&self) -> &OrderedLines<Ascending> {
        self.coordinator.lines()
    }

    pub fn recent(&self) -> &OrderedLines<Descending> {
        &self.recent
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportController {
        &mut self.viewport
    }

    pub fn coordinator(&self) -> &PageFetchCoordinator {
        &self.coordinator
    }

    pub fn fetch_state(&self) -> FetchState {
        self.coordinator.state()
    }

    pub fn generation(&self) -> u64 {
        self.coordinator.generation()
    }

    /// Discard everything and start over, optionally under a new key.
    pub fn reset(&mut self, key: Option<StreamKey>) {
        match key {
            Some(key) => self.coordinator.reset_with(key),
            None => self.coordinator.reset(),
        }
        self.recent = OrderedLines::bounded(Descending, self.recent_capacity);
        self.viewport.reset();
    }

    pub fn fetch_previous(&mut self) -> bool {
        self.coordinator.fetch_previous()
    }

    pub fn fetch_next(&mut self) -> bool {
        self.coordinator.fetch_next()
    }

    pub fn retry(&mut self) -> bool {
        self.coordinator.retry()
    }

    pub fn jump_to_newest(&mut self) {
        self.viewport.jump_to_newest();
    }

    /// Apply a page response from the history service.
    pub fn on_page(&mut self, response: PageResponse) -> PageOutcome {
        let anchor = self.anchor();
        let outcome = self.coordinator.complete(response);

        if let PageOutcome::Loaded { kind, added } = outcome {
            self.sync_viewport(anchor);
            if added > 0 {
                match kind {
                    PageKind::First => {
                        self.viewport.rearm(Edge::Top);
                        self.viewport.rearm(Edge::Bottom);
                    }
                    PageKind::Previous => self.viewport.rearm(Edge::Top),
                    PageKind::Next => self.viewport.rearm(Edge::Bottom),
                }
            }
        }
        outcome
    }

    /// Merge a line from the live channel. Returns whether the scrollback
    /// gained a line.
    pub fn on_live_line(&mut self, line: LogLine) -> bool {
        if !self.key().admits(&line) {
            trace!(id = %line.id, "live line outside current view");
            return false;
        }
        self.recent.insert(line.clone());

        let anchor = self.anchor();
        if !self.coordinator.merge_live(line) {
            return false;
        }
        self.sync_viewport(anchor);
        true
    }

    /// The live channel came back after a drop; page forward over the gap.
    ///
    /// If another request is in flight the bottom edge stays armed and
    /// [`drive`](Self::drive) picks the gap up once the coordinator is idle.
    pub fn on_reconnected(&mut self) -> bool {
        self.coordinator.resume_forward();
        self.viewport.rearm(Edge::Bottom);
        self.coordinator.fetch_next()
    }

    /// Issue at most one page request for whichever edge the viewport is
    /// near. Only called into the coordinator while it is idle.
    pub fn drive(&mut self) -> Option<Edge> {
        if self.coordinator.state() != FetchState::Idle {
            return None;
        }
        // An edge stays armed when nothing could be requested, so it fires
        // once there is a line to page from.
        if self.viewport.near_edge(Edge::Top) && self.coordinator.fetch_previous() {
            self.viewport.disarm(Edge::Top);
            return Some(Edge::Top);
        }
        if self.viewport.near_edge(Edge::Bottom) && self.coordinator.fetch_next() {
            self.viewport.disarm(Edge::Bottom);
            return Some(Edge::Bottom);
        }
        None
    }

    /// Resize the viewport, keeping the window consistent with the content.
    pub fn set_viewport_height(&mut self, height: u32) {
        self.viewport.set_viewport_height(height);
    }

    fn anchor(&self) -> Option<LogLine> {
        if self.viewport.is_pinned() {
            return None;
        }
        self.lines().get(self.viewport.top()).cloned()
    }

    fn sync_viewport(&mut self, anchor: Option<LogLine>) {
        let rank = anchor.and_then(|line| self.lines().rank_of(&line));
        let len = self.lines().len();
        self.viewport.content_changed(len, rank);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::tests::StubHistory;
    use crate::line::{SourceInstance, line};

    fn settings(height: u32) -> StreamSettings {
        StreamSettings {
            recent_capacity: 100,
            viewport: ViewportSettings {
                viewport_height: height,
                ..ViewportSettings::default()
            },
        }
    }

    fn page(range: std::ops::Range<i64>) -> Vec<LogLine> {
        range.map(|ts| line(&format!("l{ts}"), ts, 0)).collect()
    }

    async fn started(
        stub: Arc<StubHistory>,
        height: u32,
    ) -> (LogStream, mpsc::UnboundedReceiver<PageResponse>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut stream = LogStream::new(stub, tx, StreamKey::new("billing"), settings(height));
        stream.start();
        let response = rx.recv().await.unwrap();
        stream.on_page(response);
        (stream, rx)
    }

    #[test]
    fn test_key_normalizes_inputs() {
        let key = StreamKey::new("billing")
            .with_instances(["b", "a", "b"])
            .with_search("   ");
        assert_eq!(key.instances, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(key.search, None);
    }

    #[test]
    fn test_key_admits_by_instance_and_search() {
        let key = StreamKey::new("billing")
            .with_instances(["api-1"])
            .with_search("Timeout");
        let mut hit = line("a", 1, 0);
        hit.content = "upstream timeout after 30s".to_string();
        assert!(key.admits(&hit));

        let mut other_instance = hit.clone();
        other_instance.source = SourceInstance {
            id: "api-2".to_string(),
            address: String::new(),
        };
        assert!(!key.admits(&other_instance));

        let miss = line("b", 2, 0);
        assert!(!key.admits(&miss));
    }

    #[tokio::test]
    async fn test_live_duplicate_of_paged_line_is_ignored() {
        let stub = StubHistory::new(vec![Ok(page(0..5))]);
        let (mut stream, _rx) = started(stub, 10).await;
        assert_eq!(stream.lines().len(), 5);

        assert!(!stream.on_live_line(line("l3", 3, 0)));
        assert_eq!(stream.lines().len(), 5);

        assert!(stream.on_live_line(line("l9", 9, 0)));
        assert_eq!(stream.lines().len(), 6);
        assert_eq!(stream.recent().head().unwrap().id, "l9");
    }

    #[tokio::test]
    async fn test_pinned_view_follows_live_lines() {
        let stub = StubHistory::new(vec![Ok(page(0..30))]);
        let (mut stream, _rx) = started(stub, 10).await;
        assert_eq!(stream.viewport().visible_range(), 20..30);

        stream.on_live_line(line("l30", 30, 0));
        assert_eq!(stream.viewport().visible_range(), 21..31);

        stream.viewport_mut().scroll_to(5);
        stream.on_live_line(line("l31", 31, 0));
        assert_eq!(stream.viewport().visible_range(), 5..15);

        stream.jump_to_newest();
        assert_eq!(stream.viewport().visible_range(), 22..32);
    }

    #[tokio::test]
    async fn test_backward_page_keeps_first_visible_line() {
        let stub = StubHistory::new(vec![Ok(page(100..130)), Ok(page(50..100))]);
        let (mut stream, mut rx) = started(stub, 10).await;

        stream.viewport_mut().scroll_to(2);
        assert_eq!(stream.lines().get(2).unwrap().timestamp, 102);

        assert_eq!(stream.drive(), Some(Edge::Top));
        assert_eq!(stream.fetch_state(), FetchState::FetchingPrevious);
        let response = rx.recv().await.unwrap();
        stream.on_page(response);

        let top = stream.viewport().top();
        assert_eq!(stream.lines().get(top).unwrap().timestamp, 102);
    }

    #[tokio::test]
    async fn test_drive_does_not_repeat_for_same_edge() {
        let stub = StubHistory::holding(vec![Ok(page(0..30))], 1);
        let (mut stream, _rx) = started(stub.clone(), 10).await;
        stream.viewport_mut().scroll_to(0);

        assert_eq!(stream.drive(), Some(Edge::Top));
        assert_eq!(stream.drive(), None);
        assert_eq!(stream.drive(), None);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(stub.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_first_page_recovers_after_live_line() {
        let stub = StubHistory::new(vec![Err(FetchError::Status(503)), Ok(page(50..60))]);
        let (mut stream, mut rx) = started(stub.clone(), 10).await;
        assert_eq!(stream.fetch_state(), FetchState::Idle);
        assert!(stream.coordinator().is_retryable(PageKind::First));
        assert_eq!(stream.drive(), None);

        assert!(stream.on_live_line(line("live", 100, 0)));
        assert!(stream.retry());
        let response = rx.recv().await.unwrap();
        assert!(matches!(stream.on_page(response), PageOutcome::Loaded { .. }));
        assert_eq!(stub.call_count(), 2);
        assert_eq!(stream.lines().len(), 11);
        assert!(stream.coordinator().error(PageKind::First).is_none());
    }

    #[tokio::test]
    async fn test_drive_pages_back_from_live_line_after_failed_first_page() {
        let stub = StubHistory::new(vec![Err(FetchError::Status(503)), Ok(page(50..60))]);
        let (mut stream, mut rx) = started(stub.clone(), 10).await;
        assert_eq!(stream.drive(), None);

        stream.on_live_line(line("live", 100, 0));
        assert_eq!(stream.drive(), Some(Edge::Top));
        let response = rx.recv().await.unwrap();
        stream.on_page(response);
        assert_eq!(stub.last_cursor(), Some(Cursor::before(&line("live", 100, 0))));
        assert_eq!(stream.lines().len(), 11);
    }

    #[tokio::test]
    async fn test_reconnect_backfills_from_newest_line() {
        let stub = StubHistory::new(vec![Ok(page(0..5)), Ok(Vec::new()), Ok(page(5..8))]);
        let (mut stream, mut rx) = started(stub.clone(), 10).await;

        // Forward paging runs dry while the live channel is up.
        assert!(stream.fetch_next());
        let response = rx.recv().await.unwrap();
        assert_eq!(stream.on_page(response), PageOutcome::Exhausted(PageKind::Next));
        assert!(!stream.fetch_next());

        assert!(stream.on_reconnected());
        let cursor = {
            let response = rx.recv().await.unwrap();
            stream.on_page(response);
            stub.last_cursor().unwrap()
        };
        assert_eq!(cursor, Cursor::after(&line("l4", 4, 0)));
        assert_eq!(stream.lines().len(), 8);
    }

    #[tokio::test]
    async fn test_reset_drops_late_page_from_previous_generation() {
        let stub = StubHistory::holding(vec![Ok(page(0..5)), Ok(page(90..95))], 2);
        let (mut stream, mut rx) = started(stub, 10).await;
        stream.viewport_mut().scroll_to(0);
        stream.drive();
        let late = rx.recv().await.unwrap();

        stream.reset(Some(StreamKey::new("billing").with_search("error")));
        assert_eq!(stream.on_page(late), PageOutcome::Stale);
        assert_eq!(stream.lines().len(), 0);
        assert!(stream.recent().is_empty());
        assert!(stream.viewport().is_pinned());
    }
}
