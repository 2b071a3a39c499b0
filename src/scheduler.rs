//! Resumable batch scheduling over (index × pattern).
//!
//! The scheduler walks the cross product of crawl indices and target patterns
//! in row-major order (every pattern for index 0, then index 1, ...) and bumps
//! the batch number after each full sweep:
//!
//! ```text
//! (0, I0, P0) (0, I0, P1) (0, I1, P0) (0, I1, P1) (1, I0, P0) ...
//! ```
//!
//! It never ends on its own. Positions are identified by index id and
//! pattern text, so a cursor stays valid when indices are added between runs.

use std::sync::Arc;

use crate::error::{IngestError, Result};
use crate::models::{CrawlIndex, ResumeCursor};
use crate::pattern::TargetPattern;

/// One unit of scheduling work.
#[derive(Debug, Clone)]
pub struct BatchCoordinate {
    pub batch: u64,
    pub index_pos: usize,
    pub pattern_pos: usize,
    pub index: Arc<CrawlIndex>,
    pub pattern: Arc<TargetPattern>,
}

impl BatchCoordinate {
    /// Cursor that resumes at this coordinate.
    pub fn cursor(&self) -> ResumeCursor {
        ResumeCursor::new(
            self.batch,
            Some(self.index.id.clone()),
            Some(self.pattern.source().to_string()),
        )
    }
}

/// Infinite iterator of [`BatchCoordinate`].
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    indices: Arc<Vec<Arc<CrawlIndex>>>,
    patterns: Arc<Vec<Arc<TargetPattern>>>,
    batch: u64,
    index_pos: usize,
    pattern_pos: usize,
}

impl BatchScheduler {
    /// Scheduler positioned at the origin.
    pub fn new(indices: Vec<CrawlIndex>, patterns: Vec<TargetPattern>) -> Self {
        Self {
            indices: Arc::new(indices.into_iter().map(Arc::new).collect()),
            patterns: Arc::new(patterns.into_iter().map(Arc::new).collect()),
            batch: 0,
            index_pos: 0,
            pattern_pos: 0,
        }
    }

    /// Move to `cursor`, inclusive. Fails when the cursor names an index or
    /// pattern that is not part of this scheduler.
    pub fn resume(mut self, cursor: &ResumeCursor) -> Result<Self> {
        let index_pos = match &cursor.index {
            None => 0,
            Some(id) => self
                .indices
                .iter()
                .position(|index| &index.id == id)
                .ok_or_else(|| IngestError::InvalidResumePosition {
                    reason: format!("crawl index {id:?} is not in the catalog"),
                })?,
        };
        let pattern_pos = match &cursor.pattern {
            None => 0,
            Some(raw) => {
                let source = TargetPattern::parse(raw)
                    .map(|pattern| pattern.source().to_string())
                    .unwrap_or_else(|_| raw.clone());
                self.patterns
                    .iter()
                    .position(|pattern| pattern.source() == source)
                    .ok_or_else(|| IngestError::InvalidResumePosition {
                        reason: format!("target pattern {raw:?} is not configured"),
                    })?
            }
        };

        self.batch = cursor.batch;
        self.index_pos = index_pos;
        self.pattern_pos = pattern_pos;
        Ok(self)
    }

    /// Number of coordinates in one batch round.
    pub fn round_len(&self) -> usize {
        self.indices.len() * self.patterns.len()
    }

    pub fn indices(&self) -> &[Arc<CrawlIndex>] {
        &self.indices
    }

    pub fn patterns(&self) -> &[Arc<TargetPattern>] {
        &self.patterns
    }

    /// Cursor of the next coordinate this scheduler will emit.
    pub fn position(&self) -> ResumeCursor {
        self.cursor_at(self.batch, self.index_pos, self.pattern_pos)
    }

    /// Cursor of the coordinate emitted right after `coordinate`.
    pub fn successor(&self, coordinate: &BatchCoordinate) -> ResumeCursor {
        let (batch, index_pos, pattern_pos) = self.step(
            coordinate.batch,
            coordinate.index_pos,
            coordinate.pattern_pos,
        );
        self.cursor_at(batch, index_pos, pattern_pos)
    }

    fn step(&self, batch: u64, index_pos: usize, pattern_pos: usize) -> (u64, usize, usize) {
        if pattern_pos + 1 < self.patterns.len() {
            (batch, index_pos, pattern_pos + 1)
        } else if index_pos + 1 < self.indices.len() {
            (batch, index_pos + 1, 0)
        } else {
            (batch + 1, 0, 0)
        }
    }

    fn cursor_at(&self, batch: u64, index_pos: usize, pattern_pos: usize) -> ResumeCursor {
        ResumeCursor::new(
            batch,
            self.indices.get(index_pos).map(|index| index.id.clone()),
            self.patterns
                .get(pattern_pos)
                .map(|pattern| pattern.source().to_string()),
        )
    }
}

impl Iterator for BatchScheduler {
    type Item = BatchCoordinate;

    fn next(&mut self) -> Option<Self::Item> {
        // Nothing to schedule without indices or patterns.
        if self.round_len() == 0 {
            return None;
        }

        let coordinate = BatchCoordinate {
            batch: self.batch,
            index_pos: self.index_pos,
            pattern_pos: self.pattern_pos,
            index: Arc::clone(&self.indices[self.index_pos]),
            pattern: Arc::clone(&self.patterns[self.pattern_pos]),
        };

        let (batch, index_pos, pattern_pos) =
            self.step(self.batch, self.index_pos, self.pattern_pos);
        self.batch = batch;
        self.index_pos = index_pos;
        self.pattern_pos = pattern_pos;

        Some(coordinate)
    }
}
