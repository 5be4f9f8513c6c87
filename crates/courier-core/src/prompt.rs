//! "Ask, then wait for one reply" correlation.
//!
//! A prompt is keyed by (requester, channel). It resolves exactly once: with
//! the first later message from the requester in that channel, or with
//! [`PromptOutcome::TimedOut`] once the deadline passes.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::{
    domain::{ChannelId, Message, UserId},
    errors::Error,
    platform::port::ChatPlatform,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PromptKey {
    pub requester: UserId,
    pub channel: ChannelId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptOutcome {
    Reply(Message),
    TimedOut,
}

struct PendingPrompt {
    token: u64,
    deadline: Instant,
    tx: oneshot::Sender<Message>,
}

/// Registry of open prompts. At most one per key; a second `ask` for the same
/// key is rejected with `Error::PromptPending`.
#[derive(Default)]
pub struct PromptCorrelator {
    next_token: AtomicU64,
    pending: Mutex<HashMap<PromptKey, PendingPrompt>>,
}

/// Claim on an open prompt, returned by [`PromptCorrelator::register`].
pub struct PromptHandle<'a> {
    owner: &'a PromptCorrelator,
    key: PromptKey,
    token: u64,
    deadline: Instant,
    rx: oneshot::Receiver<Message>,
}

impl PromptCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PromptKey, PendingPrompt>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Open a prompt for `key`. The deadline is measured from now.
    pub fn register(&self, key: PromptKey, timeout: Duration) -> Result<PromptHandle<'_>> {
        let mut pending = self.lock();
        let now = Instant::now();
        // A stale entry whose waiter went away without cleaning up does not block.
        if let Some(existing) = pending.get(&key) {
            if existing.deadline > now && !existing.tx.is_closed() {
                return Err(Error::PromptPending);
            }
        }

        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let deadline = now + timeout;
        let (tx, rx) = oneshot::channel();
        pending.insert(
            key,
            PendingPrompt {
                token,
                deadline,
                tx,
            },
        );

        Ok(PromptHandle {
            owner: self,
            key,
            token,
            deadline,
            rx,
        })
    }

    /// Send `question` to `channel` and wait for `requester`'s next message there.
    pub async fn ask(
        &self,
        platform: &dyn ChatPlatform,
        requester: UserId,
        channel: ChannelId,
        question: &str,
        timeout: Duration,
    ) -> Result<PromptOutcome> {
        let handle = self.register(
            PromptKey {
                requester,
                channel,
            },
            timeout,
        )?;

        if let Err(e) = platform.send_message(channel, question).await {
            handle.abandon();
            return Err(e);
        }

        Ok(handle.wait().await)
    }

    /// Offer an inbound message to the open prompts. Returns `true` when it
    /// resolved one; the message should then not be routed further.
    pub fn offer(&self, message: &Message) -> bool {
        let key = PromptKey {
            requester: message.author,
            channel: message.channel_id,
        };
        let Some(prompt) = self.lock().remove(&key) else {
            return false;
        };
        if prompt.deadline <= Instant::now() {
            return false;
        }
        match prompt.tx.send(message.clone()) {
            Ok(()) => {
                debug!(requester = %key.requester, channel = %key.channel, "prompt answered");
                true
            }
            Err(_) => false,
        }
    }

    pub fn is_pending(&self, key: PromptKey) -> bool {
        self.lock().contains_key(&key)
    }

    /// Remove the entry for `key` if it still belongs to `token`.
    fn release(&self, key: PromptKey, token: u64) -> bool {
        let mut pending = self.lock();
        match pending.get(&key) {
            Some(p) if p.token == token => {
                pending.remove(&key);
                true
            }
            _ => false,
        }
    }
}

impl PromptHandle<'_> {
    /// Wait for the reply or the deadline, whichever is first.
    pub async fn wait(mut self) -> PromptOutcome {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(reply)) => PromptOutcome::Reply(reply),
            Ok(Err(_)) => {
                self.owner.release(self.key, self.token);
                PromptOutcome::TimedOut
            }
            Err(_) => {
                if self.owner.release(self.key, self.token) {
                    return PromptOutcome::TimedOut;
                }
                // The entry was taken by `offer` right at the deadline; the
                // reply is already in the channel.
                match self.rx.try_recv() {
                    Ok(reply) => PromptOutcome::Reply(reply),
                    Err(_) => PromptOutcome::TimedOut,
                }
            }
        }
    }

    /// Drop the prompt without waiting.
    pub fn abandon(self) {
        self.owner.release(self.key, self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{msg, FakePlatform};
    use std::sync::Arc;

    const CHANNEL: ChannelId = ChannelId(10);
    const USER: UserId = UserId(1);

    fn key() -> PromptKey {
        PromptKey {
            requester: USER,
            channel: CHANNEL,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_with_first_matching_reply() {
        let correlator = PromptCorrelator::new();
        let handle = correlator.register(key(), Duration::from_secs(30)).unwrap();

        assert!(!correlator.offer(&msg(CHANNEL, 5, UserId(2), "someone else")));
        assert!(!correlator.offer(&msg(ChannelId(11), 6, USER, "wrong channel")));
        assert!(correlator.offer(&msg(CHANNEL, 7, USER, "the answer")));
        assert!(!correlator.offer(&msg(CHANNEL, 8, USER, "second reply")));

        match handle.wait().await {
            PromptOutcome::Reply(m) => assert_eq!(m.content, "the answer"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!correlator.is_pending(key()));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_and_tears_down() {
        let correlator = PromptCorrelator::new();
        let handle = correlator.register(key(), Duration::from_secs(30)).unwrap();
        assert_eq!(handle.wait().await, PromptOutcome::TimedOut);
        assert!(!correlator.is_pending(key()));
        assert!(!correlator.offer(&msg(CHANNEL, 7, USER, "too late")));
    }

    #[tokio::test(start_paused = true)]
    async fn second_prompt_for_same_pair_is_rejected() {
        let correlator = PromptCorrelator::new();
        let _first = correlator.register(key(), Duration::from_secs(30)).unwrap();
        assert!(matches!(
            correlator.register(key(), Duration::from_secs(30)),
            Err(Error::PromptPending)
        ));

        let other = PromptKey {
            requester: UserId(2),
            channel: CHANNEL,
        };
        assert!(correlator.register(other, Duration::from_secs(30)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn ask_sends_question_then_waits() {
        let platform = FakePlatform::default();
        let correlator = Arc::new(PromptCorrelator::new());

        let waiter = {
            let correlator = Arc::clone(&correlator);
            let platform = platform.clone();
            tokio::spawn(async move {
                correlator
                    .ask(&platform, USER, CHANNEL, "Title?", Duration::from_secs(30))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(platform.sent(), vec![(CHANNEL, "Title?".to_string())]);
        assert!(correlator.offer(&msg(CHANNEL, 9, USER, "Budget review")));

        let outcome = waiter.await.unwrap().unwrap();
        assert!(matches!(outcome, PromptOutcome::Reply(m) if m.content == "Budget review"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_question_releases_the_slot() {
        let platform = FakePlatform::default();
        platform.fail_sends(true);
        let correlator = PromptCorrelator::new();

        let res = correlator
            .ask(&platform, USER, CHANNEL, "Title?", Duration::from_secs(30))
            .await;
        assert!(res.is_err());
        assert!(!correlator.is_pending(key()));
    }
}
