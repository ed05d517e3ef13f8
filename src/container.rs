//! Rank-addressable ordered storage for log lines.
//!
//! [`OrderedLines`] keeps lines sorted by a pluggable [`LineOrder`] and
//! de-duplicated by id. Storage is a list of sorted chunks: an insert binary
//! searches for its chunk and shifts at most one chunk's worth of elements,
//! and rank lookups walk chunk lengths rather than elements.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::ops::Range;

use crate::line::{Ascending, LineOrder, LogLine};

/// Chunks are split in half once they grow past this many lines.
const MAX_CHUNK: usize = 256;

/// Default capacity of the recent-activity buffer.
pub const DEFAULT_RECENT_CAPACITY: usize = 100;

#[derive(Debug)]
pub struct OrderedLines<O: LineOrder> {
    /// Non-empty sorted chunks; their concatenation is the full order.
    chunks: Vec<Vec<LogLine>>,
    ids: HashSet<String>,
    len: usize,
    order: O,
    capacity: Option<usize>,
}

impl Default for OrderedLines<Ascending> {
    fn default() -> Self {
        Self::new(Ascending)
    }
}

impl<O: LineOrder> OrderedLines<O> {
    /// An unbounded container.
    pub fn new(order: O) -> Self {
        Self {
            chunks: Vec::new(),
            ids: HashSet::new(),
            len: 0,
            order,
            capacity: None,
        }
    }

    /// A container that evicts its oldest line once it holds more than
    /// `capacity` lines.
    pub fn bounded(order: O, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new(order)
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Insert a line at the position its sort key dictates.
    ///
    /// Returns `false` if a line with the same id is already held. Lines with
    /// an equal sort key are placed after the ones already present.
    pub fn insert(&mut self, line: LogLine) -> bool {
        if self.ids.contains(&line.id) {
            return false;
        }
        self.ids.insert(line.id.clone());
        self.place(line);
        self.len += 1;

        if let Some(capacity) = self.capacity {
            while self.len > capacity {
                self.evict_oldest();
            }
        }
        true
    }

    /// Insert each line in turn. Returns how many were new.
    pub fn insert_many<I>(&mut self, lines: I) -> usize
    where
        I: IntoIterator<Item = LogLine>,
    {
        lines
            .into_iter()
            .fold(0, |added, line| added + usize::from(self.insert(line)))
    }

    /// The line at `rank`, or `None` past the end.
    pub fn get(&self, rank: usize) -> Option<&LogLine> {
        let (chunk, offset) = self.locate(rank)?;
        self.chunks[chunk].get(offset)
    }

    /// Lowest-ranked line.
    pub fn head(&self) -> Option<&LogLine> {
        self.chunks.first().and_then(|c| c.first())
    }

    /// Highest-ranked line.
    pub fn tail(&self) -> Option<&LogLine> {
        self.chunks.last().and_then(|c| c.last())
    }

    /// Lines whose rank falls in `ranks`, clamped to the current length.
    pub fn range(&self, ranks: Range<usize>) -> impl Iterator<Item = &LogLine> + '_ {
        let start = ranks.start.min(self.len);
        let count = ranks.end.min(self.len).saturating_sub(start);
        let (chunk, offset) = self.locate(start).unwrap_or((self.chunks.len(), 0));
        self.chunks[chunk..].iter().flatten().skip(offset).take(count)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogLine> + '_ {
        self.chunks.iter().flatten()
    }

    /// Current rank of `line`, matched by sort key and then id.
    pub fn rank_of(&self, line: &LogLine) -> Option<usize> {
        let mut base = 0;
        for chunk in &self.chunks {
            let last = &chunk[chunk.len() - 1];
            if self.order.compare(last, line) == Ordering::Less {
                base += chunk.len();
                continue;
            }
            let start = chunk.partition_point(|x| self.order.compare(x, line) == Ordering::Less);
            for (i, candidate) in chunk[start..].iter().enumerate() {
                if self.order.compare(candidate, line) != Ordering::Equal {
                    return None;
                }
                if candidate.id == line.id {
                    return Some(base + start + i);
                }
            }
            // The run of equal keys may continue into the next chunk.
            base += chunk.len();
        }
        None
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.ids.clear();
        self.len = 0;
    }

    fn place(&mut self, line: LogLine) {
        let Self { chunks, order, .. } = self;
        if chunks.is_empty() {
            chunks.push(vec![line]);
            return;
        }

        let index = chunks
            .partition_point(|c| order.compare(&c[c.len() - 1], &line) != Ordering::Greater)
            .min(chunks.len() - 1);
        let chunk = &mut chunks[index];
        let pos = chunk.partition_point(|x| order.compare(x, &line) != Ordering::Greater);
        chunk.insert(pos, line);

        if chunk.len() > MAX_CHUNK {
            let upper = chunk.split_off(chunk.len() / 2);
            chunks.insert(index + 1, upper);
        }
    }

    fn locate(&self, rank: usize) -> Option<(usize, usize)> {
        if rank >= self.len {
            return None;
        }
        let mut remaining = rank;
        for (index, chunk) in self.chunks.iter().enumerate() {
            if remaining < chunk.len() {
                return Some((index, remaining));
            }
            remaining -= chunk.len();
        }
        None
    }

    /// Drop whichever end holds the older line, whatever the configured order.
    fn evict_oldest(&mut self) -> Option<LogLine> {
        let (head, tail) = (self.head()?, self.tail()?);
        let from_front = Ascending.compare(head, tail) != Ordering::Greater;

        let evicted = if from_front {
            let chunk = self.chunks.first_mut()?;
            let line = chunk.remove(0);
            if chunk.is_empty() {
                self.chunks.remove(0);
            }
            line
        } else {
            let chunk = self.chunks.last_mut()?;
            let line = chunk.pop()?;
            if chunk.is_empty() {
                self.chunks.pop();
            }
            line
        };

        self.ids.remove(&evicted.id);
        self.len -= 1;
        Some(evicted)
    }
}
