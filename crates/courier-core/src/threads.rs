//! Sequence numbers for generated talking-point threads.
//!
//! The counter is seeded from the newest numbered thread title and then only
//! ever moves forward in memory. Uniqueness across restarts is as good as the
//! re-derivation at start-up; threads created by someone else between two
//! assignments are not observed.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    OnceLock,
};

use regex::Regex;
use tracing::info;

use crate::{domain::Thread, errors::Error, Result};

const TITLE_PREFIX: &str = "TP";

/// First contiguous digit run in `title`.
pub fn parse_sequence(title: &str) -> Option<u32> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let re = DIGITS.get_or_init(|| Regex::new(r"\d+").expect("valid digit regex"));
    re.find(title)?.as_str().parse::<u32>().ok()
}

/// Last assigned sequence number implied by existing threads: the number in
/// the most recently created numbered thread, or 0 when there is none.
pub fn last_assigned(threads: &[Thread]) -> u32 {
    threads
        .iter()
        .filter_map(|t| parse_sequence(&t.title).map(|n| (t.created_at, t.id, n)))
        .max_by_key(|(created_at, id, _)| (*created_at, *id))
        .map(|(_, _, n)| n)
        .unwrap_or(0)
}

/// `TP` + two-digit zero-padded sequence + ` - ` + the user's title.
pub fn render_title(sequence: u32, raw_title: &str) -> String {
    format!("{TITLE_PREFIX}{sequence:02} - {raw_title}")
}

#[derive(Debug, Default)]
pub struct ThreadSequencer {
    last: AtomicU32,
}

impl ThreadSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(last: u32) -> Self {
        Self {
            last: AtomicU32::new(last),
        }
    }

    /// Raise the counter to the value derived from `threads`. Never lowers it,
    /// so seeding late cannot hand out a number twice.
    pub fn seed(&self, threads: &[Thread]) -> u32 {
        let derived = last_assigned(threads);
        let prev = self.last.fetch_max(derived, Ordering::SeqCst);
        let now = prev.max(derived);
        info!(threads = threads.len(), last_assigned = now, "thread sequence seeded");
        now
    }

    /// Reserve the next sequence number. Fails once the counter is exhausted
    /// rather than wrapping back to a number already handed out.
    pub fn next_sequence(&self) -> Result<u32> {
        self.last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map(|prev| prev + 1)
            .map_err(|last| {
                Error::MalformedState(format!("thread sequence exhausted at {last}"))
            })
    }

    pub fn last(&self) -> u32 {
        self.last.load(Ordering::SeqCst)
    }

    /// Reserve the next number and render the full title for `raw_title`.
    pub fn assign_title(&self, raw_title: &str) -> Result<String> {
        Ok(render_title(self.next_sequence()?, raw_title))
    }
}
