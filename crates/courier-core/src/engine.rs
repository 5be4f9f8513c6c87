//! Event-correlation engine: resolves inbound events, routes them, and runs
//! the matching workflows against the shared in-memory state.

use std::sync::{Arc, OnceLock};

use tracing::{debug, error, info, warn};

use crate::{
    approval::{ApprovalGate, VoteOutcome},
    config::Config,
    domain::{ChannelId, ChannelInfo, Message, UserId},
    errors::Error,
    formatting,
    platform::{
        port::ChatPlatform,
        types::{IncomingEvent, ReactionEvent},
    },
    prompt::{PromptCorrelator, PromptOutcome},
    router::{CrosspostTarget, ResolvedEvent, Route, Router, TalkingPointRequest},
    threads::ThreadSequencer,
    voice::{CallSessionTracker, ReminderFn},
    Result,
};

pub struct Engine {
    pub(crate) cfg: Arc<Config>,
    pub(crate) platform: Arc<dyn ChatPlatform>,
    pub(crate) approvals: ApprovalGate,
    pub(crate) voice: CallSessionTracker,
    pub(crate) threads: ThreadSequencer,
    pub(crate) prompts: PromptCorrelator,
    self_id: OnceLock<UserId>,
}

impl Engine {
    pub fn new(cfg: Arc<Config>, platform: Arc<dyn ChatPlatform>) -> Arc<Self> {
        let reminder = voice_reminder(cfg.clone(), platform.clone());
        Arc::new(Self {
            approvals: ApprovalGate::new(cfg.approval_ttl),
            voice: CallSessionTracker::new(cfg.voice_reminder_delay, reminder),
            threads: ThreadSequencer::new(),
            prompts: PromptCorrelator::new(),
            self_id: OnceLock::new(),
            cfg,
            platform,
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Record the bot's own identity once the gateway reports it.
    pub fn set_self_id(&self, id: UserId) {
        if self.self_id.set(id).is_err() && self.self_id.get() != Some(&id) {
            warn!(%id, "bot identity changed after start-up; keeping the first one");
        }
    }

    pub fn self_id(&self) -> Option<UserId> {
        self.self_id.get().copied()
    }

    pub fn voice(&self) -> &CallSessionTracker {
        &self.voice
    }

    pub fn threads(&self) -> &ThreadSequencer {
        &self.threads
    }

    /// Seed the talking-point counter from the forum's existing threads.
    pub async fn seed_thread_sequence(&self) -> Result<u32> {
        let forum = self
            .cfg
            .channels
            .talking_point
            .ok_or_else(|| Error::NotConfigured("talking-point channel is not set".to_string()))?;
        let threads = self.platform.list_threads(forum, true).await?;
        Ok(self.threads.seed(&threads))
    }

    /// Process one inbound event. Returns the reply text for command
    /// invocations and `None` for passive events.
    ///
    /// Passive failures are logged and swallowed; they never poison shared
    /// state for later events.
    pub async fn handle(&self, event: IncomingEvent) -> Option<String> {
        let router = Router::new(&self.cfg, self.self_id());
        if let Some(reason) = router.prefilter(&event) {
            debug!(?reason, "event ignored");
            return None;
        }

        let resolved = match self.resolve(event).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "failed to resolve event payload");
                return None;
            }
        };

        if let ResolvedEvent::MessageCreated(message) = &resolved {
            if self.prompts.offer(message) {
                return None;
            }
        }

        let routes = router.classify(&resolved);
        if let ResolvedEvent::Command(inv) = &resolved {
            let reply = match routes.first() {
                Some(Route::Command(kind)) => self.run_command(*kind, inv).await,
                _ => "Unknown command.".to_string(),
            };
            return Some(reply);
        }

        for route in routes {
            if let Err(e) = self.run_passive(&route, &resolved).await {
                match e {
                    Error::NotConfigured(_) | Error::MalformedState(_) => {
                        warn!(?route, error = %e, "workflow step skipped")
                    }
                    _ => error!(?route, error = %e, "workflow failed"),
                }
            }
        }
        None
    }

    async fn resolve(&self, event: IncomingEvent) -> Result<ResolvedEvent> {
        Ok(match event {
            IncomingEvent::ReactionAdded(reaction) => self.resolve_reaction(true, reaction).await?,
            IncomingEvent::ReactionRemoved(reaction) => {
                self.resolve_reaction(false, reaction).await?
            }
            IncomingEvent::MessageCreated(message) => ResolvedEvent::MessageCreated(message),
            IncomingEvent::MessageEdited(edit) => {
                let message = self
                    .platform
                    .fetch_message(edit.channel_id, edit.message_id)
                    .await?;
                ResolvedEvent::MessageEdited {
                    message,
                    previous_content: edit.previous_content,
                }
            }
            IncomingEvent::VoiceStateChanged(change) => ResolvedEvent::Voice(change),
            IncomingEvent::CommandInvoked(inv) => ResolvedEvent::Command(inv),
        })
    }

    async fn resolve_reaction(&self, added: bool, reaction: ReactionEvent) -> Result<ResolvedEvent> {
        let message = self
            .platform
            .fetch_message(reaction.channel_id, reaction.message_id)
            .await?;
        Ok(ResolvedEvent::Reaction {
            added,
            reaction,
            message,
        })
    }

    async fn run_passive(&self, route: &Route, event: &ResolvedEvent) -> Result<()> {
        match (route, event) {
            (
                Route::Crosspost(target),
                ResolvedEvent::Reaction {
                    reaction, message, ..
                },
            ) => {
                self.crosspost(message, reaction.user_id, *target).await?;
                Ok(())
            }
            (Route::TodoVote { granted }, ResolvedEvent::Reaction { reaction, message, .. }) => {
                self.todo_vote(message, reaction.user_id, *granted).await
            }
            (Route::TalkingPoint(request), ResolvedEvent::MessageCreated(message))
            | (Route::TalkingPoint(request), ResolvedEvent::MessageEdited { message, .. }) => {
                self.talking_point(message, request.clone()).await
            }
            (Route::VoiceMove, ResolvedEvent::Voice(change)) => {
                self.voice
                    .on_user_moved(change.user_id, change.before, change.after);
                Ok(())
            }
            _ => Err(Error::MalformedState(format!(
                "route {route:?} does not apply to this event"
            ))),
        }
    }

    /// Resolve a configured channel that messages will be sent into.
    pub(crate) async fn text_channel(
        &self,
        channel: Option<ChannelId>,
        label: &str,
    ) -> Result<ChannelInfo> {
        let channel =
            channel.ok_or_else(|| Error::NotConfigured(format!("{label} channel is not set")))?;
        resolve_text_channel(self.platform.as_ref(), channel, label).await
    }

    /// Forward `message` into the target channel on behalf of `sender`.
    pub(crate) async fn crosspost(
        &self,
        message: &Message,
        sender: UserId,
        target: CrosspostTarget,
    ) -> Result<ChannelInfo> {
        let channel = self
            .text_channel(target.channel(&self.cfg), target.label())
            .await?;
        let body = formatting::crosspost_body(message, sender);
        self.platform.send_message(channel.id, &body).await?;
        info!(
            message = %message.id,
            from = %message.channel_id,
            to = %channel.id,
            target = target.label(),
            "message cross-posted"
        );
        Ok(channel)
    }

    async fn todo_vote(&self, message: &Message, actor: UserId, granted: bool) -> Result<()> {
        match self
            .approvals
            .vote(message.id, &message.content, actor, granted)
        {
            VoteOutcome::Rejected => {
                debug!(message = %message.id, user = %actor, "vote rejected");
                Ok(())
            }
            VoteOutcome::Recorded(state) => {
                debug!(message = %message.id, user = %actor, ?state, "vote recorded");
                Ok(())
            }
            VoteOutcome::Delete => match self.platform.delete_message(message.reference()).await {
                Ok(()) => {
                    self.approvals.complete(message.id);
                    info!(message = %message.id, "todo completed and removed");
                    Ok(())
                }
                Err(e) => {
                    self.approvals.release(message.id);
                    Err(e)
                }
            },
        }
    }

    async fn talking_point(&self, source: &Message, request: TalkingPointRequest) -> Result<()> {
        let forum = self.cfg.channels.talking_point.ok_or_else(|| {
            Error::NotConfigured("talking-point channel is not set".to_string())
        })?;

        let mut title = request.title;
        if title.is_empty() {
            let outcome = match self
                .prompts
                .ask(
                    self.platform.as_ref(),
                    source.author,
                    source.channel_id,
                    &format!(
                        "{} what should the talking point be called?",
                        formatting::user_mention(source.author)
                    ),
                    self.cfg.prompt_timeout,
                )
                .await
            {
                Ok(outcome) => outcome,
                Err(Error::PromptPending) => {
                    debug!(user = %source.author, "title prompt already open");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            match outcome {
                PromptOutcome::Reply(reply) => {
                    title = reply.content.lines().next().unwrap_or("").trim().to_string();
                }
                PromptOutcome::TimedOut => {
                    self.platform
                        .send_message(
                            source.channel_id,
                            "⌛ No title received in time, talking point cancelled.",
                        )
                        .await?;
                    return Ok(());
                }
            }
            if title.is_empty() {
                self.platform
                    .send_message(source.channel_id, "Empty title, talking point cancelled.")
                    .await?;
                return Ok(());
            }
        }

        let full_title = self.threads.assign_title(&title)?;
        let link = formatting::message_link(source.guild_id, source.channel_id, source.id);
        let body = formatting::talking_point_body(source.author, &request.body, &link);
        let thread = self.platform.create_thread(forum, &full_title, &body).await?;
        info!(thread = %thread.id, title = %full_title, "talking point created");

        self.platform
            .send_message(
                source.channel_id,
                &format!(
                    "🧵 Created **{full_title}**: {}",
                    formatting::channel_mention(thread.id)
                ),
            )
            .await?;
        Ok(())
    }
}

pub(crate) async fn resolve_text_channel(
    platform: &dyn ChatPlatform,
    channel: ChannelId,
    label: &str,
) -> Result<ChannelInfo> {
    let info = match platform.channel_info(channel).await {
        Ok(info) => info,
        Err(Error::NotFound(_)) => {
            return Err(Error::NotConfigured(format!(
                "{label} channel {channel} does not exist"
            )))
        }
        Err(e) => return Err(e),
    };
    if !info.kind.is_text_based() {
        return Err(Error::NotConfigured(format!(
            "{label} channel {channel} is not a text channel"
        )));
    }
    Ok(info)
}

/// Reminder sent to the general channel when a call has been going on for the
/// configured delay. A missing or non-text channel makes it a logged no-op.
fn voice_reminder(cfg: Arc<Config>, platform: Arc<dyn ChatPlatform>) -> ReminderFn {
    Arc::new(move |voice_channel| {
        let cfg = cfg.clone();
        let platform = platform.clone();
        Box::pin(async move {
            let Some(general) = cfg.channels.general else {
                warn!(channel = %voice_channel, "voice reminder skipped: general channel is not set");
                return;
            };
            let target = match resolve_text_channel(platform.as_ref(), general, "general").await {
                Ok(info) => info,
                Err(e) => {
                    warn!(channel = %voice_channel, error = %e, "voice reminder skipped");
                    return;
                }
            };
            let text = formatting::voice_reminder(&cfg.voice_reminder_text, voice_channel);
            match platform.send_message(target.id, &text).await {
                Ok(_) => info!(channel = %voice_channel, "voice reminder sent"),
                Err(e) => error!(channel = %voice_channel, error = %e, "voice reminder failed"),
            }
        })
    })
}
