//! Discord adapter (serenity).
//!
//! This crate implements the `picl-core` ports over the Discord HTTP API and
//! gateway cache, and routes gateway events into the core.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use serenity::all::{
    Cache, ChannelId as DcChannelId, ChannelType, CreateAttachment, CreateEmbed,
    CreateEmbedAuthor, CreateEmbedFooter, CreateMessage, GetMessages, GuildChannel,
    GuildId as DcGuildId, Http, Message, MessageId as DcMessageId, PermissionOverwrite,
    PermissionOverwriteType, Permissions, ReactionType, Role, RoleId, User, UserId as DcUserId,
};
use tracing::debug;

pub mod handlers;
pub mod router;

use picl_core::{
    domain::{
        ChannelId, CommunityId, HistoryEntry, MemberRecord, MessageId, MessageRef, UserId,
        UserProfile,
    },
    errors::Error,
    messaging::{
        port::{CommunityPort, MessagingPort},
        types::{EmbedCard, OutgoingMessage},
    },
    Result,
};

const MEMBER_PAGE: u64 = 1000;
const HISTORY_PAGE: usize = 100;

#[derive(Clone)]
pub struct DiscordPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
    downloader: reqwest::Client,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self {
            http,
            cache,
            downloader: reqwest::Client::new(),
        }
    }

    fn http(&self) -> &Http {
        &self.http
    }

    fn cache_http(&self) -> (&Arc<Cache>, &Http) {
        (&self.cache, &self.http)
    }

    pub fn current_user_id(&self) -> UserId {
        UserId(self.cache.current_user().id.get())
    }

    /// Parent category of a guild channel, if any.
    pub async fn parent_category(&self, channel: ChannelId) -> Option<ChannelId> {
        let resolved = dc_channel(channel).to_channel(self.cache_http()).await.ok()?;
        let guild_channel = resolved.guild()?;
        guild_channel.parent_id.map(|p| ChannelId(p.get()))
    }

    /// Where to greet new members: the preferred channel if it resolves,
    /// else the system channel, else the first text channel by position.
    /// The fallbacks only consider channels the bot can post in.
    pub async fn welcome_channel(
        &self,
        community: CommunityId,
        preferred: Option<ChannelId>,
    ) -> Option<ChannelId> {
        if let Some(preferred) = preferred {
            match self.resolve_channel(preferred).await {
                Ok(Some(c)) => return Some(c),
                Ok(None) => debug!(channel = preferred.0, "welcome channel override not found"),
                Err(e) => debug!(channel = preferred.0, error = %e, "welcome channel lookup failed"),
            }
        }

        let gid = dc_guild(community);
        let me = dc_user(self.current_user_id());
        let cached = self.cache.guild(gid).map(|g| {
            let sender = g.members.get(&me).map(|m| {
                SendRights::new(g.owner_id == me, gid, me, &g.roles, &m.roles)
            });
            pick_welcome_channel(
                g.system_channel_id,
                g.channels.values().collect(),
                sender.as_ref(),
            )
        });

        let picked = match cached {
            Some(picked) => picked,
            None => {
                let partial = gid.to_partial_guild(self.http()).await.ok()?;
                let channels = gid.channels(self.http()).await.ok()?;
                let sender = match gid.member(self.http(), me).await {
                    Ok(m) => Some(SendRights::new(
                        partial.owner_id == me,
                        gid,
                        me,
                        &partial.roles,
                        &m.roles,
                    )),
                    Err(e) => {
                        debug!(error = %e, "own member lookup failed; not checking send rights");
                        None
                    }
                };
                pick_welcome_channel(
                    partial.system_channel_id,
                    channels.values().collect(),
                    sender.as_ref(),
                )
            }
        };

        picked.map(|c| ChannelId(c.get()))
    }

    fn cached_kick_permission(&self, gid: DcGuildId, me: DcUserId) -> Option<bool> {
        let guild = self.cache.guild(gid)?;
        let member = guild.members.get(&me)?;
        Some(grants_removal(
            guild.owner_id == me,
            gid,
            &guild.roles,
            &member.roles,
        ))
    }
}

// === conversions ===

fn dc_channel(c: ChannelId) -> DcChannelId {
    DcChannelId::new(c.0)
}

fn dc_message(m: MessageId) -> DcMessageId {
    DcMessageId::new(m.0)
}

fn dc_user(u: UserId) -> DcUserId {
    DcUserId::new(u.0)
}

fn dc_guild(g: CommunityId) -> DcGuildId {
    DcGuildId::new(g.0)
}

pub(crate) fn message_ref(msg: &Message) -> MessageRef {
    MessageRef {
        channel_id: ChannelId(msg.channel_id.get()),
        message_id: MessageId(msg.id.get()),
    }
}

pub(crate) fn display_name(user: &User) -> String {
    user.global_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| user.name.clone())
}

fn build_message(msg: OutgoingMessage) -> CreateMessage {
    let mut out = CreateMessage::new();
    if let Some(content) = msg.content {
        out = out.content(content);
    }
    if let Some(card) = msg.embed {
        out = out.embed(build_embed(card));
    }
    for file in msg.files {
        out = out.add_file(CreateAttachment::bytes(file.data, file.filename));
    }
    if let Some(r) = msg.reply_to {
        out = out.reference_message((dc_channel(r.channel_id), dc_message(r.message_id)));
    }
    out
}

fn build_embed(card: EmbedCard) -> CreateEmbed {
    let mut embed = CreateEmbed::new();
    if let Some(author) = card.author {
        embed = embed.author(CreateEmbedAuthor::new(author));
    }
    if let Some(description) = card.description {
        embed = embed.description(description);
    }
    for field in card.fields {
        embed = embed.field(field.name, field.value, false);
    }
    if let Some(footer) = card.footer {
        embed = embed.footer(CreateEmbedFooter::new(footer));
    }
    embed
}

/// The bot's guild-level permissions, before channel overwrites.
struct SendRights {
    gid: DcGuildId,
    me: DcUserId,
    base: Permissions,
    roles: Vec<RoleId>,
}

impl SendRights {
    fn new(
        is_owner: bool,
        gid: DcGuildId,
        me: DcUserId,
        roles: &HashMap<RoleId, Role>,
        member_roles: &[RoleId],
    ) -> Self {
        Self {
            gid,
            me,
            base: base_permissions(is_owner, gid, roles, member_roles),
            roles: member_roles.to_vec(),
        }
    }

    fn can_send(&self, channel: &GuildChannel) -> bool {
        let layers = overwrite_layers(&channel.permission_overwrites, self.gid, self.me, &self.roles);
        channel_permissions(self.base, &layers)
            .contains(Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES)
    }
}

/// System channel if writable, else the first writable text channel.
///
/// Without `rights` every channel counts as writable.
fn pick_welcome_channel(
    system: Option<DcChannelId>,
    channels: Vec<&GuildChannel>,
    rights: Option<&SendRights>,
) -> Option<DcChannelId> {
    let writable = |c: &GuildChannel| rights.map_or(true, |r| r.can_send(c));
    if let Some(system) = system {
        if channels.iter().any(|c| c.id == system && writable(*c)) {
            return Some(system);
        }
    }
    channels
        .into_iter()
        .filter(|c| c.kind == ChannelType::Text && writable(*c))
        .min_by_key(|c| (c.position, c.id))
        .map(|c| c.id)
}

/// Union of @everyone and the member's role permissions. Owners and
/// administrators get everything.
fn base_permissions(
    is_owner: bool,
    gid: DcGuildId,
    roles: &HashMap<RoleId, Role>,
    member_roles: &[RoleId],
) -> Permissions {
    if is_owner {
        return Permissions::all();
    }
    let everyone = RoleId::new(gid.get());
    let perms = std::iter::once(&everyone)
        .chain(member_roles.iter())
        .filter_map(|r| roles.get(r))
        .fold(Permissions::empty(), |acc, r| acc | r.permissions);
    if perms.contains(Permissions::ADMINISTRATOR) {
        Permissions::all()
    } else {
        perms
    }
}

/// Channel overwrites as (allow, deny) layers: @everyone, member roles
/// combined, then the member itself.
fn overwrite_layers(
    overwrites: &[PermissionOverwrite],
    gid: DcGuildId,
    me: DcUserId,
    member_roles: &[RoleId],
) -> [(Permissions, Permissions); 3] {
    let everyone = RoleId::new(gid.get());
    let mut layers = [(Permissions::empty(), Permissions::empty()); 3];
    for ow in overwrites {
        match &ow.kind {
            PermissionOverwriteType::Role(r) if *r == everyone => layers[0] = (ow.allow, ow.deny),
            PermissionOverwriteType::Role(r) if member_roles.contains(r) => {
                layers[1].0 |= ow.allow;
                layers[1].1 |= ow.deny;
            }
            PermissionOverwriteType::Member(u) if *u == me => layers[2] = (ow.allow, ow.deny),
            _ => {}
        }
    }
    layers
}

fn channel_permissions(base: Permissions, layers: &[(Permissions, Permissions)]) -> Permissions {
    if base.contains(Permissions::ADMINISTRATOR) {
        return base;
    }
    layers
        .iter()
        .fold(base, |acc, (allow, deny)| (acc & !*deny) | *allow)
}

/// Whether the given role set may remove members (owner, admin or kick).
fn grants_removal(
    is_owner: bool,
    gid: DcGuildId,
    roles: &HashMap<RoleId, Role>,
    member_roles: &[RoleId],
) -> bool {
    base_permissions(is_owner, gid, roles, member_roles).contains(Permissions::KICK_MEMBERS)
}

fn classify_status(status: u16, detail: String) -> Error {
    match status {
        401 | 403 => Error::Permission(detail),
        404 => Error::NotFound(detail),
        _ => Error::External(detail),
    }
}

fn map_err(e: serenity::Error) -> Error {
    let detail = format!("discord error: {e}");
    if let serenity::Error::Http(http_err) = &e {
        if let Some(status) = http_err.status_code() {
            return classify_status(status.as_u16(), detail);
        }
    }
    Error::External(detail)
}

fn map_reqwest_err(e: reqwest::Error) -> Error {
    let detail = format!("download error: {e}");
    match e.status() {
        Some(status) => classify_status(status.as_u16(), detail),
        None => Error::External(detail),
    }
}

#[async_trait]
impl MessagingPort for DiscordPlatform {
    async fn send_message(&self, channel: ChannelId, msg: OutgoingMessage) -> Result<MessageRef> {
        let sent = dc_channel(channel)
            .send_message(self.http(), build_message(msg))
            .await
            .map_err(map_err)?;
        Ok(message_ref(&sent))
    }

    async fn send_direct(&self, user: UserId, msg: OutgoingMessage) -> Result<MessageRef> {
        let dm = dc_user(user)
            .create_dm_channel(self.http())
            .await
            .map_err(map_err)?;
        let sent = dm
            .id
            .send_message(self.http(), build_message(msg))
            .await
            .map_err(map_err)?;
        Ok(message_ref(&sent))
    }

    async fn add_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        dc_channel(msg.channel_id)
            .create_reaction(
                self.http(),
                dc_message(msg.message_id),
                ReactionType::Unicode(emoji.to_string()),
            )
            .await
            .map_err(map_err)
    }

    async fn resolve_channel(&self, channel: ChannelId) -> Result<Option<ChannelId>> {
        match dc_channel(channel).to_channel(self.cache_http()).await {
            Ok(c) => Ok(Some(ChannelId(c.id().get()))),
            Err(e) => match map_err(e) {
                Error::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn resolve_user(&self, user: UserId) -> Result<Option<UserProfile>> {
        match dc_user(user).to_user(self.cache_http()).await {
            Ok(u) => Ok(Some(UserProfile {
                user_id: UserId(u.id.get()),
                display_name: display_name(&u),
            })),
            Err(e) => match map_err(e) {
                Error::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .downloader
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(map_reqwest_err)?;
        let bytes = resp.bytes().await.map_err(map_reqwest_err)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl CommunityPort for DiscordPlatform {
    async fn primary_community(&self) -> Result<Option<CommunityId>> {
        // Same order the API lists guilds in: ascending id.
        let mut guilds = self.cache.guilds();
        guilds.sort();
        if let Some(first) = guilds.first() {
            return Ok(Some(CommunityId(first.get())));
        }

        let listed = self.http.get_guilds(None, Some(1)).await.map_err(map_err)?;
        Ok(listed.first().map(|g| CommunityId(g.id.get())))
    }

    async fn community_name(&self, community: CommunityId) -> Result<Option<String>> {
        let gid = dc_guild(community);
        if let Some(name) = self.cache.guild(gid).map(|g| g.name.clone()) {
            return Ok(Some(name));
        }
        match gid.to_partial_guild(self.http()).await {
            Ok(g) => Ok(Some(g.name)),
            Err(e) => match map_err(e) {
                Error::NotFound(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn can_remove_members(&self, community: CommunityId) -> Result<bool> {
        let gid = dc_guild(community);
        let me = dc_user(self.current_user_id());
        if let Some(allowed) = self.cached_kick_permission(gid, me) {
            return Ok(allowed);
        }

        let guild = gid.to_partial_guild(self.http()).await.map_err(map_err)?;
        let member = gid.member(self.http(), me).await.map_err(map_err)?;
        Ok(grants_removal(
            guild.owner_id == me,
            gid,
            &guild.roles,
            &member.roles,
        ))
    }

    async fn list_members(&self, community: CommunityId) -> Result<Vec<MemberRecord>> {
        let gid = dc_guild(community);
        let mut out = Vec::new();
        let mut after: Option<DcUserId> = None;
        loop {
            let page = gid
                .members(self.http(), Some(MEMBER_PAGE), after)
                .await
                .map_err(map_err)?;
            let full = page.len() as u64 >= MEMBER_PAGE;
            after = page.last().map(|m| m.user.id);
            out.extend(page.into_iter().map(|m| MemberRecord {
                user_id: UserId(m.user.id.get()),
                joined_at: m.joined_at.map(|t| t.unix_timestamp()),
                is_bot: m.user.bot,
            }));
            if !full || after.is_none() {
                break;
            }
        }
        Ok(out)
    }

    async fn remove_member(
        &self,
        community: CommunityId,
        user: UserId,
        reason: &str,
    ) -> Result<()> {
        dc_guild(community)
            .kick_with_reason(self.http(), dc_user(user), reason)
            .await
            .map_err(map_err)
    }

    async fn readable_channels(&self) -> Result<Vec<ChannelId>> {
        let mut out = Vec::new();
        for gid in self.cache.guilds() {
            let channels = match gid.channels(self.http()).await {
                Ok(v) => v,
                Err(e) => {
                    debug!(guild = gid.get(), error = %e, "could not list guild channels");
                    continue;
                }
            };
            let mut text: Vec<&GuildChannel> = channels
                .values()
                .filter(|c| matches!(c.kind, ChannelType::Text | ChannelType::News))
                .collect();
            text.sort_by_key(|c| (c.position, c.id));
            out.extend(text.into_iter().map(|c| ChannelId(c.id.get())));
        }
        Ok(out)
    }

    async fn recent_messages(&self, channel: ChannelId, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut out = Vec::new();
        let mut before: Option<DcMessageId> = None;
        while out.len() < limit {
            let want = (limit - out.len()).min(HISTORY_PAGE);
            let mut req = GetMessages::new().limit(want as u8);
            if let Some(b) = before {
                req = req.before(b);
            }
            let page = dc_channel(channel)
                .messages(self.http(), req)
                .await
                .map_err(map_err)?;
            before = page.last().map(|m| m.id);
            let short = page.len() < want;
            out.extend(page.iter().map(|m| HistoryEntry {
                author: UserId(m.author.id.get()),
                author_is_bot: m.author.bot,
            }));
            if short || before.is_none() {
                break;
            }
        }
        Ok(out)
    }
}
