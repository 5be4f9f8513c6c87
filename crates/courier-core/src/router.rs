//! Stateless event classification.
//!
//! The engine resolves partial payloads first (a reaction only names its
//! message), then asks the router which workflows apply. The router never
//! touches state or the network.

use crate::{
    config::Config,
    domain::{ChannelId, Message, UserId},
    platform::types::{CommandInvocation, IncomingEvent, ReactionEvent, VoiceStateChange},
};

/// An event with every partial payload fetched.
#[derive(Clone, Debug)]
pub enum ResolvedEvent {
    Reaction {
        added: bool,
        reaction: ReactionEvent,
        message: Message,
    },
    MessageCreated(Message),
    MessageEdited {
        message: Message,
        previous_content: Option<String>,
    },
    Voice(VoiceStateChange),
    Command(CommandInvocation),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CrosspostTarget {
    Pin,
    Unread,
    Todo,
}

impl CrosspostTarget {
    pub fn channel(self, cfg: &Config) -> Option<ChannelId> {
        match self {
            CrosspostTarget::Pin => cfg.channels.pin,
            CrosspostTarget::Unread => cfg.channels.unread,
            CrosspostTarget::Todo => cfg.channels.todo,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CrosspostTarget::Pin => "pin",
            CrosspostTarget::Unread => "unread",
            CrosspostTarget::Todo => "todo",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    PinMessage,
    MessageCount,
    CheckReply,
}

impl CommandKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "pinmessage" => Some(CommandKind::PinMessage),
            "messagecount" => Some(CommandKind::MessageCount),
            "checkreply" => Some(CommandKind::CheckReply),
            _ => None,
        }
    }

    /// Commands that scan history acknowledge first and edit the reply later.
    pub fn defers(self) -> bool {
        matches!(self, CommandKind::MessageCount | CommandKind::CheckReply)
    }
}

/// Raw title and body of a talking-point request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TalkingPointRequest {
    pub title: String,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Crosspost(CrosspostTarget),
    /// Done-emoji vote on a cross-posted todo; `granted = false` on removal.
    TodoVote { granted: bool },
    TalkingPoint(TalkingPointRequest),
    VoiceMove,
    Command(CommandKind),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    OwnActor,
    BotActor,
    NoMatchingWorkflow,
}

pub struct Router<'a> {
    cfg: &'a Config,
    self_id: Option<UserId>,
}

impl<'a> Router<'a> {
    pub fn new(cfg: &'a Config, self_id: Option<UserId>) -> Self {
        Self { cfg, self_id }
    }

    fn is_self(&self, user: UserId) -> bool {
        self.self_id == Some(user)
    }

    /// Cheap check on the unresolved event, so that irrelevant events cost no
    /// fetch and the bot never reacts to itself.
    pub fn prefilter(&self, event: &IncomingEvent) -> Option<IgnoreReason> {
        match event {
            IncomingEvent::ReactionAdded(r) | IncomingEvent::ReactionRemoved(r) => {
                if self.is_self(r.user_id) {
                    return Some(IgnoreReason::OwnActor);
                }
                if r.user_is_bot {
                    return Some(IgnoreReason::BotActor);
                }
                let added = matches!(event, IncomingEvent::ReactionAdded(_));
                let relevant = r.emoji == self.cfg.emoji.done
                    || (added
                        && (r.emoji == self.cfg.emoji.pin
                            || r.emoji == self.cfg.emoji.unread
                            || r.emoji == self.cfg.emoji.todo));
                (!relevant).then_some(IgnoreReason::NoMatchingWorkflow)
            }
            IncomingEvent::MessageCreated(m) => {
                if self.is_self(m.author) {
                    Some(IgnoreReason::OwnActor)
                } else if m.author_is_bot {
                    Some(IgnoreReason::BotActor)
                } else {
                    None
                }
            }
            IncomingEvent::MessageEdited(_) => None,
            IncomingEvent::VoiceStateChanged(v) => {
                // Bots are never counted as occupants, matching start-up seeding.
                if self.is_self(v.user_id) {
                    Some(IgnoreReason::OwnActor)
                } else if v.user_is_bot {
                    Some(IgnoreReason::BotActor)
                } else {
                    None
                }
            }
            IncomingEvent::CommandInvoked(c) => {
                self.is_self(c.user_id).then_some(IgnoreReason::OwnActor)
            }
        }
    }

    /// Workflows that apply to a resolved event, in execution order.
    pub fn classify(&self, event: &ResolvedEvent) -> Vec<Route> {
        match event {
            ResolvedEvent::Reaction {
                added,
                reaction,
                message,
            } => self.classify_reaction(*added, reaction, message),
            ResolvedEvent::MessageCreated(message) => {
                if message.author_is_bot || self.is_self(message.author) {
                    return Vec::new();
                }
                parse_talking_point(&self.cfg.talking_point_prefix, &message.content)
                    .map(Route::TalkingPoint)
                    .into_iter()
                    .collect()
            }
            ResolvedEvent::MessageEdited {
                message,
                previous_content,
            } => {
                if message.author_is_bot || self.is_self(message.author) {
                    return Vec::new();
                }
                // Only an edit that turns a known non-trigger into a trigger counts;
                // anything else could create the same thread twice.
                let Some(previous) = previous_content else {
                    return Vec::new();
                };
                let prefix = &self.cfg.talking_point_prefix;
                if parse_talking_point(prefix, previous).is_some() {
                    return Vec::new();
                }
                parse_talking_point(prefix, &message.content)
                    .map(Route::TalkingPoint)
                    .into_iter()
                    .collect()
            }
            ResolvedEvent::Voice(_) => vec![Route::VoiceMove],
            ResolvedEvent::Command(c) => CommandKind::parse(&c.name)
                .map(Route::Command)
                .into_iter()
                .collect(),
        }
    }

    fn classify_reaction(&self, added: bool, reaction: &ReactionEvent, message: &Message) -> Vec<Route> {
        let emoji = &self.cfg.emoji;
        let mut routes = Vec::new();

        if added {
            if reaction.emoji == emoji.pin {
                routes.push(Route::Crosspost(CrosspostTarget::Pin));
            }
            if reaction.emoji == emoji.unread {
                routes.push(Route::Crosspost(CrosspostTarget::Unread));
            }
            if reaction.emoji == emoji.todo {
                routes.push(Route::Crosspost(CrosspostTarget::Todo));
            }
        }

        let in_todo = self.cfg.channels.todo == Some(message.channel_id);
        let posted_by_us = match self.self_id {
            Some(id) => message.author == id,
            None => message.author_is_bot,
        };
        if reaction.emoji == emoji.done && in_todo && posted_by_us {
            routes.push(Route::TodoVote { granted: added });
        }

        routes
    }
}

/// Parse `<prefix> <title>\n<body...>`. The prefix must be followed by
/// whitespace or the end of the message.
pub fn parse_talking_point(prefix: &str, content: &str) -> Option<TalkingPointRequest> {
    let rest = content.trim_start().strip_prefix(prefix)?;
    if !(rest.is_empty() || rest.starts_with(char::is_whitespace)) {
        return None;
    }

    let rest = rest.trim_start_matches([' ', '\t']);
    let (title, body) = match rest.split_once('\n') {
        Some((title, body)) => (title, body),
        None => (rest, ""),
    };
    Some(TalkingPointRequest {
        title: title.trim().to_string(),
        body: body.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;
    use crate::testing::msg;

    const BOT: UserId = UserId(900);
    const TODO: ChannelId = ChannelId(30);

    fn cfg() -> Config {
        let mut cfg = Config::default();
        cfg.channels.todo = Some(TODO);
        cfg
    }

    fn reaction(emoji: &str, user: UserId, channel: ChannelId) -> ReactionEvent {
        ReactionEvent {
            channel_id: channel,
            message_id: MessageId(5),
            user_id: user,
            user_is_bot: false,
            emoji: emoji.to_string(),
        }
    }

    #[test]
    fn ignores_own_and_bot_reactions() {
        let cfg = cfg();
        let router = Router::new(&cfg, Some(BOT));
        let own = IncomingEvent::ReactionAdded(reaction("📌", BOT, ChannelId(1)));
        assert_eq!(router.prefilter(&own), Some(IgnoreReason::OwnActor));

        let mut other_bot = reaction("📌", UserId(5), ChannelId(1));
        other_bot.user_is_bot = true;
        assert_eq!(
            router.prefilter(&IncomingEvent::ReactionAdded(other_bot)),
            Some(IgnoreReason::BotActor)
        );
    }

    #[test]
    fn bot_voice_moves_are_not_counted() {
        let cfg = cfg();
        let router = Router::new(&cfg, Some(BOT));
        let change = |user: UserId, user_is_bot: bool| {
            IncomingEvent::VoiceStateChanged(VoiceStateChange {
                user_id: user,
                user_is_bot,
                before: Some(ChannelId(50)),
                after: None,
            })
        };
        assert_eq!(router.prefilter(&change(UserId(7), true)), Some(IgnoreReason::BotActor));
        assert_eq!(router.prefilter(&change(BOT, false)), Some(IgnoreReason::OwnActor));
        assert_eq!(router.prefilter(&change(UserId(1), false)), None);
    }

    #[test]
    fn prefilter_skips_unrouted_emoji() {
        let cfg = cfg();
        let router = Router::new(&cfg, Some(BOT));
        let wave = IncomingEvent::ReactionAdded(reaction("👋", UserId(1), ChannelId(1)));
        assert_eq!(router.prefilter(&wave), Some(IgnoreReason::NoMatchingWorkflow));

        // Removing a pin reaction does nothing; removing a done reaction revokes a vote.
        let unpin = IncomingEvent::ReactionRemoved(reaction("📌", UserId(1), ChannelId(1)));
        assert_eq!(router.prefilter(&unpin), Some(IgnoreReason::NoMatchingWorkflow));
        let undone = IncomingEvent::ReactionRemoved(reaction("✅", UserId(1), TODO));
        assert_eq!(router.prefilter(&undone), None);
    }

    #[test]
    fn emoji_selects_crosspost_target() {
        let cfg = cfg();
        let router = Router::new(&cfg, Some(BOT));
        let message = msg(ChannelId(1), 5, UserId(2), "hello");
        for (emoji, target) in [
            ("📌", CrosspostTarget::Pin),
            ("🔖", CrosspostTarget::Unread),
            ("📝", CrosspostTarget::Todo),
        ] {
            let routes = router.classify(&ResolvedEvent::Reaction {
                added: true,
                reaction: reaction(emoji, UserId(1), ChannelId(1)),
                message: message.clone(),
            });
            assert_eq!(routes, vec![Route::Crosspost(target)]);
        }
    }

    #[test]
    fn done_emoji_votes_only_on_our_todo_posts() {
        let cfg = cfg();
        let router = Router::new(&cfg, Some(BOT));

        let ours = msg(TODO, 5, BOT, "<@1> <@2> x");
        let routes = router.classify(&ResolvedEvent::Reaction {
            added: false,
            reaction: reaction("✅", UserId(1), TODO),
            message: ours,
        });
        assert_eq!(routes, vec![Route::TodoVote { granted: false }]);

        let theirs = msg(TODO, 6, UserId(3), "<@1> <@2> x");
        assert!(router
            .classify(&ResolvedEvent::Reaction {
                added: true,
                reaction: reaction("✅", UserId(1), TODO),
                message: theirs,
            })
            .is_empty());

        let elsewhere = msg(ChannelId(31), 7, BOT, "<@1> <@2> x");
        assert!(router
            .classify(&ResolvedEvent::Reaction {
                added: true,
                reaction: reaction("✅", UserId(1), ChannelId(31)),
                message: elsewhere,
            })
            .is_empty());
    }

    #[test]
    fn parses_talking_point_requests() {
        assert_eq!(
            parse_talking_point("!tp", "!tp Budget review\nwe are over by 10%"),
            Some(TalkingPointRequest {
                title: "Budget review".to_string(),
                body: "we are over by 10%".to_string(),
            })
        );
        assert_eq!(
            parse_talking_point("!tp", "!tp"),
            Some(TalkingPointRequest {
                title: String::new(),
                body: String::new(),
            })
        );
        assert_eq!(parse_talking_point("!tp", "!tpx nope"), None);
        assert_eq!(parse_talking_point("!tp", "hello !tp"), None);
    }

    #[test]
    fn edits_trigger_only_when_they_introduce_the_prefix() {
        let cfg = cfg();
        let router = Router::new(&cfg, Some(BOT));
        let edited = msg(ChannelId(1), 5, UserId(2), "!tp Roadmap");

        let introduced = router.classify(&ResolvedEvent::MessageEdited {
            message: edited.clone(),
            previous_content: Some("Roadmap".to_string()),
        });
        assert!(matches!(introduced.as_slice(), [Route::TalkingPoint(_)]));

        let already = router.classify(&ResolvedEvent::MessageEdited {
            message: edited.clone(),
            previous_content: Some("!tp Roadmp".to_string()),
        });
        assert!(already.is_empty());

        let unknown = router.classify(&ResolvedEvent::MessageEdited {
            message: edited,
            previous_content: None,
        });
        assert!(unknown.is_empty());
    }

    #[test]
    fn commands_route_by_name() {
        let cfg = cfg();
        let router = Router::new(&cfg, Some(BOT));
        let inv = |name: &str| {
            ResolvedEvent::Command(CommandInvocation {
                guild_id: None,
                channel_id: ChannelId(1),
                user_id: UserId(1),
                name: name.to_string(),
                options: Vec::new(),
            })
        };
        assert_eq!(
            router.classify(&inv("messagecount")),
            vec![Route::Command(CommandKind::MessageCount)]
        );
        assert!(router.classify(&inv("nope")).is_empty());
        assert!(CommandKind::MessageCount.defers());
        assert!(!CommandKind::PinMessage.defers());
    }
}
