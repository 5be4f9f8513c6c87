use std::{env, fs, path::Path, time::Duration};

use crate::{domain::ChannelId, errors::Error, Result};

const DEFAULT_VOICE_REMINDER_TEXT: &str =
    "📝 A call has been running in {channel} for a while. Don't forget to write down the talking points!";

/// Routing emoji. Compared against the reaction's unicode value (or custom emoji name).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmojiSet {
    pub pin: String,
    pub unread: String,
    pub todo: String,
    pub done: String,
}

impl Default for EmojiSet {
    fn default() -> Self {
        Self {
            pin: "📌".to_string(),
            unread: "🔖".to_string(),
            todo: "📝".to_string(),
            done: "✅".to_string(),
        }
    }
}

/// Channel targets. Any of them may be absent; workflows that need a missing
/// one fail with `Error::NotConfigured`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelTargets {
    pub pin: Option<ChannelId>,
    pub unread: Option<ChannelId>,
    pub todo: Option<ChannelId>,
    pub talking_point: Option<ChannelId>,
    pub general: Option<ChannelId>,
}

/// Typed, immutable configuration, shared as `Arc<Config>`.
#[derive(Clone, Debug)]
pub struct Config {
    pub discord_token: String,
    pub channels: ChannelTargets,
    pub emoji: EmojiSet,

    // Talking-point threads
    pub talking_point_prefix: String,

    // Voice reminders
    pub voice_reminder_delay: Duration,
    pub voice_reminder_text: String,

    // Correlation timeouts
    pub prompt_timeout: Duration,
    pub approval_ttl: Duration,

    // Outbound pacing
    pub throttle_global: Duration,
    pub throttle_channel: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            channels: ChannelTargets::default(),
            emoji: EmojiSet::default(),
            talking_point_prefix: "!tp".to_string(),
            voice_reminder_delay: Duration::from_secs(30 * 60),
            voice_reminder_text: DEFAULT_VOICE_REMINDER_TEXT.to_string(),
            prompt_timeout: Duration::from_secs(60),
            approval_ttl: Duration::from_secs(24 * 60 * 60),
            throttle_global: Duration::from_millis(20),
            throttle_channel: Duration::from_millis(250),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).and_then(non_empty);

        let discord_token = get("DISCORD_TOKEN").unwrap_or_default();
        if discord_token.is_empty() {
            return Err(Error::Config(
                "DISCORD_TOKEN environment variable is required".to_string(),
            ));
        }

        // Older deployments used positional names for the three cross-post targets.
        let channel = |key: &str, legacy: Option<&str>| -> Result<Option<ChannelId>> {
            let raw = get(key).or_else(|| legacy.and_then(|l| get(l)));
            raw.map(|v| parse_id(key, &v)).transpose()
        };
        let channels = ChannelTargets {
            pin: channel("PIN_CHANNEL_ID", Some("TARGET_CHANNEL_ID"))?,
            unread: channel("UNREAD_CHANNEL_ID", Some("SECOND_TARGET_CHANNEL_ID"))?,
            todo: channel("TODO_CHANNEL_ID", Some("THIRD_TARGET_CHANNEL_ID"))?,
            talking_point: channel("TALKING_POINT_CHANNEL_ID", None)?,
            general: channel("GENERAL_CHANNEL_ID", None)?,
        };

        let emoji = EmojiSet {
            pin: get("PIN_EMOJI").unwrap_or(defaults.emoji.pin),
            unread: get("UNREAD_EMOJI").unwrap_or(defaults.emoji.unread),
            todo: get("TODO_EMOJI").unwrap_or(defaults.emoji.todo),
            done: get("DONE_EMOJI").unwrap_or(defaults.emoji.done),
        };

        let secs = |key: &str, default: Duration| -> Result<Duration> {
            match get(key) {
                Some(v) => v
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| Error::Config(format!("{key} must be a number of seconds"))),
                None => Ok(default),
            }
        };
        let millis = |key: &str, default: Duration| -> Result<Duration> {
            match get(key) {
                Some(v) => v
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| Error::Config(format!("{key} must be a number of milliseconds"))),
                None => Ok(default),
            }
        };

        Ok(Self {
            discord_token,
            channels,
            emoji,
            talking_point_prefix: get("TALKING_POINT_PREFIX")
                .unwrap_or(defaults.talking_point_prefix),
            voice_reminder_delay: secs("VOICE_REMINDER_DELAY_SECS", defaults.voice_reminder_delay)?,
            voice_reminder_text: get("VOICE_REMINDER_TEXT").unwrap_or(defaults.voice_reminder_text),
            prompt_timeout: secs("PROMPT_TIMEOUT_SECS", defaults.prompt_timeout)?,
            approval_ttl: secs("APPROVAL_TTL_SECS", defaults.approval_ttl)?,
            throttle_global: millis("THROTTLE_GLOBAL_MS", defaults.throttle_global)?,
            throttle_channel: millis("THROTTLE_CHANNEL_MS", defaults.throttle_channel)?,
        })
    }
}

fn parse_id(key: &str, raw: &str) -> Result<ChannelId> {
    match raw.parse::<u64>() {
        Ok(id) if id != 0 => Ok(ChannelId(id)),
        _ => Err(Error::Config(format!("{key} must be a non-zero numeric id"))),
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
