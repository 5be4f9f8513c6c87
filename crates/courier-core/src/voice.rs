//! Voice session tracking with a deferred reminder per occupied channel.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    domain::{ChannelId, UserId},
    timer::ScheduledTask,
};

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Action run when a session's reminder fires, given the voice channel.
pub type ReminderFn = Arc<dyn Fn(ChannelId) -> BoxFuture + Send + Sync>;

/// One occupied voice channel.
#[derive(Debug)]
pub struct VoiceSession {
    pub channel_id: ChannelId,
    pub started_at: DateTime<Utc>,
    reminder: ScheduledTask,
}

impl VoiceSession {
    pub fn reminder_fired(&self) -> bool {
        self.reminder.has_fired()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceTransition {
    /// Empty to occupied: a session was created and its reminder scheduled.
    Started,
    /// Occupied to empty: the session was torn down.
    Ended {
        /// Whether tearing down prevented a pending reminder from firing.
        reminder_cancelled: bool,
    },
    Unchanged,
}

/// Who is in which voice channel, derived from per-user moves.
#[derive(Debug, Default)]
struct Occupancy {
    members: HashMap<UserId, ChannelId>,
    counts: HashMap<ChannelId, usize>,
}

impl Occupancy {
    fn count(&self, channel: ChannelId) -> usize {
        self.counts.get(&channel).copied().unwrap_or(0)
    }

    fn leave(&mut self, channel: ChannelId) {
        if let Some(n) = self.counts.get_mut(&channel) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                self.counts.remove(&channel);
            }
        }
    }

    fn join(&mut self, channel: ChannelId) {
        *self.counts.entry(channel).or_insert(0) += 1;
    }
}

#[derive(Default)]
struct TrackerState {
    occupancy: Occupancy,
    sessions: HashMap<ChannelId, VoiceSession>,
}

/// Tracks occupied voice channels and owns one reminder per session.
pub struct CallSessionTracker {
    delay: Duration,
    reminder: ReminderFn,
    state: Mutex<TrackerState>,
}

impl CallSessionTracker {
    pub fn new(delay: Duration, reminder: ReminderFn) -> Self {
        Self {
            delay,
            reminder,
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Record that `user` was already in `channel` at start-up. No session is
    /// created for pre-existing occupancy.
    pub fn seed(&self, user: UserId, channel: ChannelId) {
        let mut st = self.lock();
        if let Some(prev) = st.occupancy.members.insert(user, channel) {
            st.occupancy.leave(prev);
        }
        st.occupancy.join(channel);
    }

    /// Apply a user's move between voice channels and return the transition
    /// of every channel whose occupancy changed.
    ///
    /// Only the ledger's own record of where the user was is trusted. A
    /// `reported_before` for a user the ledger never counted is ignored, so a
    /// count is only ever lowered by someone who raised it.
    pub fn on_user_moved(
        &self,
        user: UserId,
        reported_before: Option<ChannelId>,
        after: Option<ChannelId>,
    ) -> Vec<(ChannelId, PresenceTransition)> {
        let mut st = self.lock();
        let before = st.occupancy.members.get(&user).copied();
        if before != reported_before {
            debug!(%user, ?before, ?reported_before, "voice move disagrees with ledger");
        }
        if before == after {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(2);
        if let Some(from) = before {
            let prev = st.occupancy.count(from);
            st.occupancy.members.remove(&user);
            st.occupancy.leave(from);
            let now = st.occupancy.count(from);
            out.push((from, self.transition(&mut st, from, prev, now)));
        }
        if let Some(to) = after {
            let prev = st.occupancy.count(to);
            st.occupancy.members.insert(user, to);
            st.occupancy.join(to);
            let now = st.occupancy.count(to);
            out.push((to, self.transition(&mut st, to, prev, now)));
        }
        out
    }

    /// Apply an occupancy change for `channel` given explicit counts.
    pub fn on_presence_change(
        &self,
        channel: ChannelId,
        before: usize,
        after: usize,
    ) -> PresenceTransition {
        let mut st = self.lock();
        self.transition(&mut st, channel, before, after)
    }

    fn transition(
        &self,
        st: &mut TrackerState,
        channel: ChannelId,
        before: usize,
        after: usize,
    ) -> PresenceTransition {
        match (before, after) {
            (0, n) if n > 0 => {
                if st.sessions.contains_key(&channel) {
                    return PresenceTransition::Unchanged;
                }
                let action = (self.reminder)(channel);
                let reminder = ScheduledTask::schedule_once(self.delay, action);
                st.sessions.insert(
                    channel,
                    VoiceSession {
                        channel_id: channel,
                        started_at: Utc::now(),
                        reminder,
                    },
                );
                info!(%channel, delay_secs = self.delay.as_secs(), "voice session started");
                PresenceTransition::Started
            }
            (n, 0) if n > 0 => {
                let Some(session) = st.sessions.remove(&channel) else {
                    debug!(%channel, "voice channel emptied without a tracked session");
                    return PresenceTransition::Unchanged;
                };
                let reminder_cancelled = session.reminder.cancel();
                info!(%channel, reminder_cancelled, "voice session ended");
                PresenceTransition::Ended { reminder_cancelled }
            }
            _ => PresenceTransition::Unchanged,
        }
    }

    pub fn is_tracking(&self, channel: ChannelId) -> bool {
        self.lock().sessions.contains_key(&channel)
    }

    pub fn session_started_at(&self, channel: ChannelId) -> Option<DateTime<Utc>> {
        self.lock().sessions.get(&channel).map(|s| s.started_at)
    }

    pub fn occupants(&self, channel: ChannelId) -> usize {
        self.lock().occupancy.count(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const VOICE: ChannelId = ChannelId(50);
    const OTHER_VOICE: ChannelId = ChannelId(51);

    fn tracker(delay: Duration) -> (CallSessionTracker, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let fired = Arc::new(AtomicUsize::new(0));
        let created_c = Arc::clone(&created);
        let fired_c = Arc::clone(&fired);
        let reminder: ReminderFn = Arc::new(move |_channel| {
            created_c.fetch_add(1, Ordering::SeqCst);
            let fired = Arc::clone(&fired_c);
            Box::pin(async move {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        });
        (CallSessionTracker::new(delay, reminder), created, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn fluctuating_occupancy_creates_one_reminder_cancelled_once() {
        let (t, created, fired) = tracker(Duration::from_secs(60));

        assert_eq!(t.on_presence_change(VOICE, 0, 1), PresenceTransition::Started);
        assert_eq!(t.on_presence_change(VOICE, 1, 2), PresenceTransition::Unchanged);
        assert_eq!(t.on_presence_change(VOICE, 2, 1), PresenceTransition::Unchanged);
        assert!(t.is_tracking(VOICE));
        assert_eq!(
            t.on_presence_change(VOICE, 1, 0),
            PresenceTransition::Ended {
                reminder_cancelled: true
            }
        );
        assert!(!t.is_tracking(VOICE));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reminder_fires_while_channel_stays_occupied() {
        let (t, _created, fired) = tracker(Duration::from_secs(60));
        t.on_presence_change(VOICE, 0, 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(t.is_tracking(VOICE));

        // Emptying afterwards tears down without a second fire.
        assert_eq!(
            t.on_presence_change(VOICE, 1, 0),
            PresenceTransition::Ended {
                reminder_cancelled: false
            }
        );
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn user_moves_drive_per_channel_transitions() {
        let (t, created, _fired) = tracker(Duration::from_secs(60));
        let (a, b) = (UserId(1), UserId(2));

        assert_eq!(
            t.on_user_moved(a, None, Some(VOICE)),
            vec![(VOICE, PresenceTransition::Started)]
        );
        assert_eq!(
            t.on_user_moved(b, None, Some(VOICE)),
            vec![(VOICE, PresenceTransition::Unchanged)]
        );
        assert_eq!(t.occupants(VOICE), 2);

        // Moving between channels ends nothing while someone stays behind.
        assert_eq!(
            t.on_user_moved(a, None, Some(OTHER_VOICE)),
            vec![
                (VOICE, PresenceTransition::Unchanged),
                (OTHER_VOICE, PresenceTransition::Started)
            ]
        );
        assert_eq!(
            t.on_user_moved(b, Some(VOICE), None),
            vec![(
                VOICE,
                PresenceTransition::Ended {
                    reminder_cancelled: true
                }
            )]
        );
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert!(t.is_tracking(OTHER_VOICE));
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_occupancy_has_no_session() {
        let (t, created, _fired) = tracker(Duration::from_secs(60));
        t.seed(UserId(1), VOICE);
        assert_eq!(t.occupants(VOICE), 1);
        assert!(!t.is_tracking(VOICE));

        assert_eq!(
            t.on_user_moved(UserId(1), None, None),
            vec![(VOICE, PresenceTransition::Unchanged)]
        );
        assert_eq!(t.occupants(VOICE), 0);
        assert_eq!(created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn leave_from_uncounted_user_keeps_channel_occupied() {
        let (t, created, _fired) = tracker(Duration::from_secs(60));
        t.seed(UserId(1), VOICE);

        assert!(t.on_user_moved(UserId(9), Some(VOICE), None).is_empty());
        assert_eq!(t.occupants(VOICE), 1);

        assert_eq!(
            t.on_user_moved(UserId(2), None, Some(VOICE)),
            vec![(VOICE, PresenceTransition::Unchanged)]
        );
        assert_eq!(
            t.on_user_moved(UserId(2), Some(VOICE), None),
            vec![(VOICE, PresenceTransition::Unchanged)]
        );
        assert_eq!(t.occupants(VOICE), 1);
        assert!(!t.is_tracking(VOICE));
        assert_eq!(created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_join_events_are_idempotent() {
        let (t, created, _fired) = tracker(Duration::from_secs(60));
        t.on_user_moved(UserId(1), None, Some(VOICE));
        assert!(t.on_user_moved(UserId(1), None, Some(VOICE)).is_empty());
        assert_eq!(t.occupants(VOICE), 1);
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }
}
