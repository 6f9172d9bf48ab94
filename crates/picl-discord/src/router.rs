use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};

use async_trait::async_trait;
use serenity::{
    all::{Context, EventHandler, GatewayIntents, Member, Message, Ready},
    Client,
};
use tracing::{info, warn};

use picl_core::{
    activity::ActivityTracker,
    capture::CommandLogCapture,
    config::Config,
    enforcer::{EnforcementPolicy, InactivityEnforcer},
    messaging::port::{CommunityPort, MessagingPort},
    relay::RelayRouter,
};

use crate::handlers;
use crate::DiscordPlatform;

pub struct AppState {
    pub cfg: Arc<Config>,
    pub platform: Arc<DiscordPlatform>,
    pub messenger: Arc<dyn MessagingPort>,
    pub community: Arc<dyn CommunityPort>,
    pub tracker: Arc<ActivityTracker>,
    pub relay: RelayRouter,
    pub enforcer: InactivityEnforcer,
    pub logs: CommandLogCapture,
    seeded: AtomicBool,
}

impl AppState {
    pub fn new(cfg: Arc<Config>, platform: Arc<DiscordPlatform>) -> Self {
        let messenger: Arc<dyn MessagingPort> = platform.clone();
        let community: Arc<dyn CommunityPort> = platform.clone();
        let tracker = Arc::new(ActivityTracker::new());

        let relay = RelayRouter::new(
            cfg.relay_channel,
            messenger.clone(),
            cfg.relay_mapping_capacity,
        );
        let enforcer = InactivityEnforcer::new(
            EnforcementPolicy {
                threshold_days: cfg.inactivity_threshold_days,
                interval: cfg.inactivity_check_interval,
            },
            tracker.clone(),
            community.clone(),
            messenger.clone(),
        );
        let logs = CommandLogCapture::new(cfg.command_log_capacity);

        Self {
            cfg,
            platform,
            messenger,
            community,
            tracker,
            relay,
            enforcer,
            logs,
            seeded: AtomicBool::new(false),
        }
    }

    /// Seed activity from history, then start enforcement. Runs once per
    /// process even if the gateway reports ready again after a reconnect.
    fn start_background(self: &Arc<Self>) {
        if self.seeded.swap(true, Ordering::SeqCst) {
            return;
        }
        let state = self.clone();
        tokio::spawn(async move {
            state
                .tracker
                .initialize(state.community.as_ref(), state.cfg.activity_history_limit)
                .await;
            state.enforcer.start().await;
        });
    }
}

struct Handler {
    state: Arc<OnceLock<Arc<AppState>>>,
}

impl Handler {
    fn state(&self) -> Option<Arc<AppState>> {
        self.state.get().cloned()
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, id = ready.user.id.get(), "Picl is online");
        if let Some(state) = self.state() {
            state.start_background();
        }
    }

    async fn guild_member_addition(&self, _ctx: Context, new_member: Member) {
        if let Some(state) = self.state() {
            handlers::handle_member_join(new_member, state).await;
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if let Some(state) = self.state() {
            handlers::handle_message(msg, state).await;
        }
    }
}

pub async fn run(cfg: Arc<Config>) -> anyhow::Result<()> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Filled before the gateway starts, so every event sees it.
    let slot: Arc<OnceLock<Arc<AppState>>> = Arc::new(OnceLock::new());
    let mut client = Client::builder(&cfg.discord_token, intents)
        .event_handler(Handler {
            state: slot.clone(),
        })
        .await?;

    let platform = Arc::new(DiscordPlatform::new(
        client.http.clone(),
        client.cache.clone(),
    ));
    if slot.set(Arc::new(AppState::new(cfg.clone(), platform))).is_err() {
        warn!("application state was already initialized");
    }

    match cfg.relay_channel {
        Some(c) => info!(channel = c.0, "DM relay enabled"),
        None => info!("DM relay disabled (MOD_RELAY_CHANNEL_ID not set)"),
    }

    client.start().await?;
    Ok(())
}
