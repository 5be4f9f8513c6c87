//! Paginated reverse-chronological history scan with an early-exit boundary.
//!
//! The scan is split into a pure transition, [`ScanCursor::step`], which
//! consumes one page, and a driver, [`HistoryScanner::scan`], which fetches
//! pages one at a time until the step reports a terminal outcome.

use tracing::debug;

use crate::{
    domain::{ChannelId, Message, MessageId},
    errors::Error,
    platform::port::{ChatPlatform, MAX_PAGE_SIZE},
    Result,
};

/// Why a scan ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The boundary predicate matched.
    Boundary,
    /// An empty page was returned: the start of history was reached.
    StartOfHistory,
}

/// Result of a completed scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanReport {
    pub tally: u64,
    pub stopped_by: StopReason,
    /// Number of pages fetched, including the terminal one.
    pub pages: usize,
}

/// Position of a scan in a channel's history. Owned by a single scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanCursor {
    /// Oldest message seen so far; the next page is fetched strictly before it.
    pub before: Option<MessageId>,
    pub exhausted: bool,
}

/// Outcome of feeding one page to a cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanStep {
    pub cursor: ScanCursor,
    pub tally_delta: u64,
    /// `Some` when the scan is over.
    pub done: Option<StopReason>,
}

impl ScanCursor {
    pub fn start() -> Self {
        Self::default()
    }

    /// Start strictly before (older than) a known message.
    pub fn before(id: MessageId) -> Self {
        Self {
            before: Some(id),
            exhausted: false,
        }
    }

    /// Consume one page (newest first).
    ///
    /// Messages are visited in page order. The first one matching `stop` ends
    /// the scan without being counted; messages matching `count` before it
    /// add to the tally.
    pub fn step(
        self,
        page: &[Message],
        stop: impl Fn(&Message) -> bool,
        count: impl Fn(&Message) -> bool,
    ) -> ScanStep {
        if page.is_empty() {
            return ScanStep {
                cursor: ScanCursor {
                    before: self.before,
                    exhausted: true,
                },
                tally_delta: 0,
                done: Some(StopReason::StartOfHistory),
            };
        }

        let mut delta = 0u64;
        for msg in page {
            if stop(msg) {
                return ScanStep {
                    cursor: ScanCursor {
                        before: Some(msg.id),
                        exhausted: false,
                    },
                    tally_delta: delta,
                    done: Some(StopReason::Boundary),
                };
            }
            if count(msg) {
                delta += 1;
            }
        }

        // Pages are newest first, so the oldest id is the last one. Take the
        // minimum anyway in case an adapter returns a page out of order.
        let oldest = page.iter().map(|m| m.id).min();
        ScanStep {
            cursor: ScanCursor {
                before: oldest.or(self.before),
                exhausted: false,
            },
            tally_delta: delta,
            done: None,
        }
    }
}

/// Drives a [`ScanCursor`] against the platform, one page in memory at a time.
pub struct HistoryScanner<'a> {
    platform: &'a dyn ChatPlatform,
    page_size: u8,
}

impl<'a> HistoryScanner<'a> {
    pub fn new(platform: &'a dyn ChatPlatform) -> Self {
        Self {
            platform,
            page_size: MAX_PAGE_SIZE,
        }
    }

    /// Scan `channel` from `cursor` backwards.
    ///
    /// A fetch error aborts the whole scan with `Error::ScanFailed`; the partial
    /// tally is dropped because it was not counted up to the boundary.
    pub async fn scan(
        &self,
        channel: ChannelId,
        mut cursor: ScanCursor,
        stop: impl Fn(&Message) -> bool,
        count: impl Fn(&Message) -> bool,
    ) -> Result<ScanReport> {
        let mut tally = 0u64;
        let mut pages = 0usize;

        loop {
            let page = self
                .platform
                .fetch_messages_page(channel, cursor.before, self.page_size)
                .await
                .map_err(|e| {
                    Error::ScanFailed(format!(
                        "page {} of channel {channel} failed: {e}",
                        pages + 1
                    ))
                })?;
            pages += 1;

            let step = cursor.step(&page, &stop, &count);
            tally += step.tally_delta;
            cursor = step.cursor;

            if let Some(stopped_by) = step.done {
                debug!(%channel, tally, pages, ?stopped_by, "history scan finished");
                return Ok(ScanReport {
                    tally,
                    stopped_by,
                    pages,
                });
            }
        }
    }
}
