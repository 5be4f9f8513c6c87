use std::sync::Arc;

use serenity::{
    all::{
        Context, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse, EventHandler, GatewayIntents, Guild, Interaction,
        Message as DcMessage, MessageUpdateEvent, Reaction, Ready, VoiceState,
    },
    async_trait,
    cache::Settings as CacheSettings,
    http::Http,
    Client,
};
use tracing::{debug, error, info, warn};

use courier_core::{
    config::Config,
    domain::{ChannelId, MessageId, UserId},
    platform::{
        port::ChatPlatform,
        throttled::{ThrottleConfig, ThrottledPlatform},
        types::{IncomingEvent, MessageEdit, VoiceStateChange},
    },
    router::CommandKind,
    Engine,
};

use crate::convert::{command_from, message_from, reaction_from};
use crate::DiscordPlatform;

/// Messages kept per channel so edits can be compared with their previous text.
const CACHED_MESSAGES: usize = 500;

pub struct Handler {
    engine: Arc<Engine>,
}

impl Handler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    async fn dispatch(&self, event: IncomingEvent) -> Option<String> {
        self.engine.handle(event).await
    }
}

fn voice_change(old: Option<&VoiceState>, new: &VoiceState) -> VoiceStateChange {
    VoiceStateChange {
        user_id: UserId(new.user_id.get()),
        user_is_bot: new.member.as_ref().is_some_and(|m| m.user.bot),
        before: old
            .and_then(|o| o.channel_id)
            .map(|c| ChannelId(c.get())),
        after: new.channel_id.map(|c| ChannelId(c.get())),
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "connected to gateway");
        self.engine.set_self_id(UserId(ready.user.id.get()));

        match self.engine.seed_thread_sequence().await {
            Ok(last) => info!(last, "talking-point counter seeded"),
            Err(e) => warn!(error = %e, "talking-point counter not seeded"),
        }
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        let mut seeded = 0usize;
        for state in guild.voice_states.values() {
            let Some(channel) = state.channel_id else {
                continue;
            };
            if state.member.as_ref().is_some_and(|m| m.user.bot) {
                continue;
            }
            self.engine
                .voice()
                .seed(UserId(state.user_id.get()), ChannelId(channel.get()));
            seeded += 1;
        }
        debug!(guild = %guild.id, seeded, "voice occupancy seeded");
    }

    async fn message(&self, _ctx: Context, msg: DcMessage) {
        self.dispatch(IncomingEvent::MessageCreated(message_from(&msg)))
            .await;
    }

    async fn message_update(
        &self,
        _ctx: Context,
        old_if_available: Option<DcMessage>,
        _new: Option<DcMessage>,
        event: MessageUpdateEvent,
    ) {
        // Embed-only updates carry no content change.
        if event.content.is_none() {
            return;
        }
        self.dispatch(IncomingEvent::MessageEdited(MessageEdit {
            channel_id: ChannelId(event.channel_id.get()),
            message_id: MessageId(event.id.get()),
            previous_content: old_if_available.map(|m| m.content),
        }))
        .await;
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        if let Some(r) = reaction_from(&reaction) {
            self.dispatch(IncomingEvent::ReactionAdded(r)).await;
        }
    }

    async fn reaction_remove(&self, _ctx: Context, reaction: Reaction) {
        if let Some(r) = reaction_from(&reaction) {
            self.dispatch(IncomingEvent::ReactionRemoved(r)).await;
        }
    }

    async fn voice_state_update(&self, _ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        self.dispatch(IncomingEvent::VoiceStateChanged(voice_change(
            old.as_ref(),
            &new,
        )))
        .await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(cmd) = interaction else {
            return;
        };

        let deferred = CommandKind::parse(&cmd.data.name).is_some_and(CommandKind::defers);
        if deferred {
            if let Err(e) = cmd.defer(&ctx.http).await {
                warn!(command = %cmd.data.name, error = %e, "failed to defer command");
                return;
            }
        }

        let reply = self
            .dispatch(IncomingEvent::CommandInvoked(command_from(&cmd)))
            .await
            .unwrap_or_else(|| "Nothing to do.".to_string());

        let res = if deferred {
            cmd.edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
                .await
                .map(|_| ())
        } else {
            cmd.create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new().content(reply),
                ),
            )
            .await
        };
        if let Err(e) = res {
            error!(command = %cmd.data.name, error = %e, "failed to answer command");
        }
    }
}

fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::GUILD_VOICE_STATES
}

pub async fn run_gateway(cfg: Arc<Config>) -> anyhow::Result<()> {
    let http = Arc::new(Http::new(&cfg.discord_token));

    // Outbound calls are paced by a decorator; serenity still handles the hard
    // rate-limit buckets on its own.
    let raw_platform: Arc<dyn ChatPlatform> = Arc::new(DiscordPlatform::new(http));
    let platform: Arc<dyn ChatPlatform> = Arc::new(ThrottledPlatform::new(
        raw_platform,
        ThrottleConfig {
            global_min_interval: cfg.throttle_global,
            per_channel_min_interval: cfg.throttle_channel,
        },
    ));
    let engine = Engine::new(cfg.clone(), platform);

    let mut cache = CacheSettings::default();
    cache.max_messages = CACHED_MESSAGES;

    let mut client = Client::builder(&cfg.discord_token, intents())
        .event_handler(Handler::new(engine))
        .cache_settings(cache)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_cover_every_workflow() {
        let i = intents();
        assert!(i.contains(GatewayIntents::MESSAGE_CONTENT));
        assert!(i.contains(GatewayIntents::GUILD_MESSAGE_REACTIONS));
        assert!(i.contains(GatewayIntents::GUILD_VOICE_STATES));
        assert!(!i.contains(GatewayIntents::GUILD_PRESENCES));
    }
}
