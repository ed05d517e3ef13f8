//! Ordered log stream engine for a log-aggregation viewer.
//!
//! Lines reach a view from two producers: cursor-paged history
//! ([`fetch`]) and a live push channel ([`live`]). Both merge into a
//! rank-addressable, de-duplicating [`container::OrderedLines`], which the
//! [`viewport::ViewportController`] windows for rendering. [`stream::LogStream`]
//! ties the pieces together for one set of identifying parameters.

pub mod cli;
pub mod config;
pub mod container;
pub mod error;
pub mod fetch;
pub mod line;
pub mod live;
pub mod logging;
pub mod palette;
pub mod stream;
pub mod theme;
pub mod viewport;

pub use container::OrderedLines;
pub use fetch::{Cursor, Direction, FetchState, HistoryService, PageFetchCoordinator};
pub use line::{Ascending, Descending, LineOrder, LogLine, SourceInstance};
pub use live::{LiveEvent, LiveTailChannel, Subscriptions};
pub use stream::{LogStream, StreamKey};
pub use viewport::ViewportController;
