use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::ChannelId, errors::Error, Result};

pub const DEFAULT_WHAT_CATEGORY_ID: u64 = 1_373_594_566_997_053_472;

/// Typed configuration, loaded once from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub discord_token: String,
    pub command_prefix: String,

    // Channels
    pub welcome_channel: Option<ChannelId>,
    pub rules_channel: Option<ChannelId>,
    pub relay_channel: Option<ChannelId>,
    pub what_category: ChannelId,

    // Photos
    pub photos_dir: PathBuf,

    // Inactivity enforcement
    pub inactivity_threshold_days: u64,
    pub inactivity_check_interval: Duration,
    pub activity_history_limit: usize,

    // Store bounds
    pub relay_mapping_capacity: usize,
    pub command_log_capacity: usize,
}

impl Config {
    /// Load from the process environment, reading `.env` first if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let discord_token = get("DISCORD_TOKEN").unwrap_or_default();
        if discord_token.trim().is_empty() {
            return Err(Error::Config(
                "DISCORD_TOKEN not set. Put it in a .env file or env var.".to_string(),
            ));
        }

        let command_prefix = get("BOT_PREFIX").unwrap_or_else(|| "!".to_string());

        let welcome_channel = get("WELCOME_CHANNEL_ID").and_then(parse_id).map(ChannelId);
        let rules_channel = get("RULES_CHANNEL_ID").and_then(parse_id).map(ChannelId);
        let relay_channel = get("MOD_RELAY_CHANNEL_ID").and_then(parse_id).map(ChannelId);
        let what_category = ChannelId(
            get("WHAT_CATEGORY_ID")
                .and_then(parse_id)
                .unwrap_or(DEFAULT_WHAT_CATEGORY_ID),
        );

        let photos_dir = PathBuf::from(get("PHOTOS_DIR").unwrap_or_else(|| "photos".to_string()));

        let inactivity_threshold_days = get("INACTIVITY_THRESHOLD_DAYS")
            .and_then(parse_u64)
            .unwrap_or(7);
        let inactivity_check_interval = Duration::from_secs(
            get("INACTIVITY_CHECK_INTERVAL_SECS")
                .and_then(parse_u64)
                .unwrap_or(3600)
                .max(1),
        );
        let activity_history_limit = get("ACTIVITY_HISTORY_LIMIT")
            .and_then(parse_usize)
            .unwrap_or(200);

        let relay_mapping_capacity = get("RELAY_MAPPING_CAPACITY")
            .and_then(parse_usize)
            .unwrap_or(5000)
            .max(1);
        let command_log_capacity = get("COMMAND_LOG_CAPACITY")
            .and_then(parse_usize)
            .unwrap_or(500)
            .max(1);

        Ok(Self {
            discord_token,
            command_prefix,
            welcome_channel,
            rules_channel,
            relay_channel,
            what_category,
            photos_dir,
            inactivity_threshold_days,
            inactivity_check_interval,
            activity_history_limit,
            relay_mapping_capacity,
            command_log_capacity,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_id(s: String) -> Option<u64> {
    s.trim().parse::<u64>().ok().filter(|v| *v != 0)
}

fn parse_u64(s: String) -> Option<u64> {
    s.trim().parse::<u64>().ok()
}

fn parse_usize(s: String) -> Option<usize> {
    s.trim().parse::<usize>().ok()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
