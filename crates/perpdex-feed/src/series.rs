//! Candle series merge rules.
//!
//! A series keeps candles sorted by time with at most one candle per time:
//! - newer time: append
//! - equal to the latest time: replace in place (the bucket is still open)
//! - older time already present: overwrite
//! - older time not present: insert at its sorted position
//!
//! Merging is idempotent, so duplicates and reordering between the REST seed
//! and the stream never produce duplicate buckets.

use perpdex_core::Candle;

/// Default cap on candles kept per series.
pub const DEFAULT_MAX_CANDLES: usize = 1000;

/// What a merge did to the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Appended,
    /// An existing bucket was overwritten.
    Replaced,
    /// An older, previously unseen bucket was inserted.
    Inserted,
    /// Identical to the stored candle.
    Unchanged,
    /// Older than everything kept in a full series.
    Discarded,
}

impl MergeOutcome {
    /// Whether the visible series changed.
    pub fn changed(&self) -> bool {
        matches!(self, Self::Appended | Self::Replaced | Self::Inserted)
    }
}

#[derive(Debug, Clone)]
pub struct CandleSeries {
    candles: Vec<Candle>,
    max_len: usize,
}

impl Default for CandleSeries {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CANDLES)
    }
}

impl CandleSeries {
    pub fn new(max_len: usize) -> Self {
        Self {
            candles: Vec::new(),
            max_len: max_len.max(1),
        }
    }

    pub fn merge(&mut self, candle: Candle) -> MergeOutcome {
        // Fast path: the stream almost always touches the latest bucket.
        match self.candles.last() {
            None => {
                self.candles.push(candle);
                return MergeOutcome::Appended;
            }
            Some(last) if candle.time > last.time => {
                self.candles.push(candle);
                self.evict();
                return MergeOutcome::Appended;
            }
            _ => {}
        }

        match self.candles.binary_search_by_key(&candle.time, |c| c.time) {
            Ok(index) => {
                if self.candles[index] == candle {
                    MergeOutcome::Unchanged
                } else {
                    self.candles[index] = candle;
                    MergeOutcome::Replaced
                }
            }
            Err(index) => {
                if index == 0 && self.candles.len() >= self.max_len {
                    return MergeOutcome::Discarded;
                }
                self.candles.insert(index, candle);
                self.evict();
                MergeOutcome::Inserted
            }
        }
    }

    /// Merge a batch; returns how many merges changed the series.
    pub fn merge_all(&mut self, candles: impl IntoIterator<Item = Candle>) -> usize {
        candles
            .into_iter()
            .map(|candle| self.merge(candle))
            .filter(MergeOutcome::changed)
            .count()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn clear(&mut self) {
        self.candles.clear();
    }

    fn evict(&mut self) {
        if self.candles.len() > self.max_len {
            let excess = self.candles.len() - self.max_len;
            self.candles.drain(..excess);
        }
    }
}
