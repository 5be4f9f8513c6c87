//! Two-party consent gate in front of a destructive action.
//!
//! A cross-posted message names two users: the original author and the user
//! who forwarded it. Both must vote before the message is deleted, and either
//! can withdraw their vote at any time before that.

use std::{
    collections::HashMap,
    sync::{Mutex, OnceLock},
    time::{Duration, Instant},
};

use regex::Regex;

use crate::domain::{MessageId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApprovalRole {
    Author,
    Sender,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApprovalState {
    pub approved_by_author: bool,
    pub approved_by_sender: bool,
}

impl ApprovalState {
    fn set(&mut self, role: ApprovalRole, granted: bool) {
        match role {
            ApprovalRole::Author => self.approved_by_author = granted,
            ApprovalRole::Sender => self.approved_by_sender = granted,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.approved_by_author && self.approved_by_sender
    }
}

/// The two users a gated message names, in order of appearance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApprovalParties {
    pub author: UserId,
    pub sender: UserId,
}

impl ApprovalParties {
    /// Extract the first two user mentions from `text`.
    ///
    /// Returns `None` when fewer than two are present.
    pub fn from_text(text: &str) -> Option<Self> {
        static MENTION: OnceLock<Regex> = OnceLock::new();
        let re = MENTION.get_or_init(|| Regex::new(r"<@!?(\d+)>").expect("valid mention regex"));

        let mut ids = re
            .captures_iter(text)
            .filter_map(|c| c.get(1)?.as_str().parse::<u64>().ok())
            .map(UserId);
        let author = ids.next()?;
        let sender = ids.next()?;
        Some(Self { author, sender })
    }

    /// Roles held by `actor`. A user who forwarded their own message holds both.
    pub fn roles_of(&self, actor: UserId) -> Vec<ApprovalRole> {
        let mut roles = Vec::with_capacity(2);
        if actor == self.author {
            roles.push(ApprovalRole::Author);
        }
        if actor == self.sender {
            roles.push(ApprovalRole::Sender);
        }
        roles
    }
}

/// Outcome of a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The actor holds no role for this message (or it names fewer than two users).
    Rejected,
    Recorded(ApprovalState),
    /// Both roles approved. The caller deletes the message and then reports
    /// back with [`ApprovalGate::complete`] or [`ApprovalGate::release`].
    Delete,
}

impl VoteOutcome {
    pub fn should_delete(&self) -> bool {
        matches!(self, VoteOutcome::Delete)
    }
}

struct Entry {
    state: ApprovalState,
    touched: Instant,
    /// A `Delete` was handed out and its outcome is not known yet.
    deleting: bool,
}

/// Per-message approval state, created lazily on the first vote.
///
/// Entries are removed once the gated message is actually deleted and evicted
/// once idle for longer than `ttl`. A failed deletion keeps both votes.
pub struct ApprovalGate {
    ttl: Duration,
    entries: Mutex<HashMap<MessageId, Entry>>,
}

impl ApprovalGate {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record a vote (`granted = true`) or its withdrawal (`granted = false`)
    /// by `actor` on the gated message `target` whose text is `text`.
    pub fn vote(&self, target: MessageId, text: &str, actor: UserId, granted: bool) -> VoteOutcome {
        let Some(parties) = ApprovalParties::from_text(text) else {
            return VoteOutcome::Rejected;
        };
        let roles = parties.roles_of(actor);
        if roles.is_empty() {
            return VoteOutcome::Rejected;
        }
        self.apply(target, &roles, granted, Instant::now())
    }

    /// Apply a vote for `roles` on `target`. The whole transition happens under
    /// one lock so concurrent votes on the same message cannot interleave.
    pub fn apply(
        &self,
        target: MessageId,
        roles: &[ApprovalRole],
        granted: bool,
        now: Instant,
    ) -> VoteOutcome {
        let mut entries = self.lock();
        let ttl = self.ttl;
        entries.retain(|_, e| now.saturating_duration_since(e.touched) <= ttl);

        if !granted && !entries.contains_key(&target) {
            return VoteOutcome::Recorded(ApprovalState::default());
        }

        let entry = entries.entry(target).or_insert_with(|| Entry {
            state: ApprovalState::default(),
            touched: now,
            deleting: false,
        });
        for role in roles {
            entry.state.set(*role, granted);
        }
        entry.touched = now;

        if entry.state.is_complete() && !entry.deleting {
            entry.deleting = true;
            return VoteOutcome::Delete;
        }
        VoteOutcome::Recorded(entry.state)
    }

    /// The gated message was deleted: forget it.
    pub fn complete(&self, target: MessageId) {
        self.lock().remove(&target);
    }

    /// Deleting the gated message failed. The recorded votes stay, and the next
    /// vote that leaves both roles approved yields `Delete` again.
    pub fn release(&self, target: MessageId) {
        if let Some(entry) = self.lock().get_mut(&target) {
            entry.deleting = false;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<MessageId, Entry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Current state for `target` (all false when untracked).
    pub fn state(&self, target: MessageId) -> ApprovalState {
        let entries = self.lock();
        entries.get(&target).map(|e| e.state).unwrap_or_default()
    }

    pub fn tracked(&self) -> usize {
        self.lock().len()
    }
}
