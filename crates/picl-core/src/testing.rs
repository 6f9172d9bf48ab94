//! In-memory port fakes shared by the unit tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{
        ChannelId, CommunityId, HistoryEntry, MemberRecord, MessageId, MessageRef, UserId,
        UserProfile,
    },
    messaging::{
        port::{CommunityPort, MessagingPort},
        types::OutgoingMessage,
    },
    Error, Result,
};

/// Recording fake for both ports. Failures are scripted per target.
pub struct FakePlatform {
    next_id: Mutex<u64>,
    pub sent: Mutex<Vec<(ChannelId, OutgoingMessage)>>,
    pub direct: Mutex<Vec<(UserId, OutgoingMessage)>>,
    pub reactions: Mutex<Vec<(MessageRef, String)>>,
    pub removals: Mutex<Vec<(CommunityId, UserId, String)>>,
    /// Ordered trace of side-effecting calls (`dm:<user>`, `remove:<user>`, ...).
    pub calls: Mutex<Vec<String>>,

    channels: Mutex<HashSet<ChannelId>>,
    channel_lookup_fails: AtomicBool,
    users: Mutex<HashMap<UserId, UserProfile>>,
    downloads: Mutex<HashMap<String, Vec<u8>>>,
    send_fails: Mutex<HashSet<ChannelId>>,
    direct_fails: Mutex<HashSet<UserId>>,

    community: Mutex<Option<CommunityId>>,
    community_name: Mutex<Option<String>>,
    can_remove: AtomicBool,
    members: Mutex<Vec<MemberRecord>>,
    members_fail: AtomicBool,
    members_panic: AtomicBool,
    remove_fails: Mutex<HashSet<UserId>>,
    history: Mutex<BTreeMap<ChannelId, Vec<HistoryEntry>>>,
    history_fails: Mutex<BTreeMap<ChannelId, String>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1000),
            sent: Mutex::default(),
            direct: Mutex::default(),
            reactions: Mutex::default(),
            removals: Mutex::default(),
            calls: Mutex::default(),
            channels: Mutex::default(),
            channel_lookup_fails: AtomicBool::new(false),
            users: Mutex::default(),
            downloads: Mutex::default(),
            send_fails: Mutex::default(),
            direct_fails: Mutex::default(),
            community: Mutex::new(Some(CommunityId(1))),
            community_name: Mutex::new(Some("Picl Club".to_string())),
            can_remove: AtomicBool::new(true),
            members: Mutex::default(),
            members_fail: AtomicBool::new(false),
            members_panic: AtomicBool::new(false),
            remove_fails: Mutex::default(),
            history: Mutex::default(),
            history_fails: Mutex::default(),
        }
    }

    fn alloc(&self, channel_id: ChannelId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageRef {
            channel_id,
            message_id: MessageId(*guard),
        }
    }

    fn trace(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    // --- scripting ---

    pub fn add_channel(&self, channel: ChannelId) {
        self.channels.lock().unwrap().insert(channel);
    }

    pub fn fail_channel_lookup(&self) {
        self.channel_lookup_fails.store(true, Ordering::SeqCst);
    }

    pub fn add_user(&self, user: UserId, name: &str) {
        self.users.lock().unwrap().insert(
            user,
            UserProfile {
                user_id: user,
                display_name: name.to_string(),
            },
        );
    }

    pub fn add_download(&self, url: &str, data: &[u8]) {
        self.downloads
            .lock()
            .unwrap()
            .insert(url.to_string(), data.to_vec());
    }

    pub fn fail_send_to(&self, channel: ChannelId) {
        self.send_fails.lock().unwrap().insert(channel);
    }

    pub fn fail_direct_to(&self, user: UserId) {
        self.direct_fails.lock().unwrap().insert(user);
    }

    pub fn set_community(&self, community: Option<CommunityId>) {
        *self.community.lock().unwrap() = community;
    }

    pub fn set_community_name(&self, name: Option<&str>) {
        *self.community_name.lock().unwrap() = name.map(str::to_string);
    }

    pub fn set_can_remove(&self, can: bool) {
        self.can_remove.store(can, Ordering::SeqCst);
    }

    pub fn set_members(&self, members: Vec<MemberRecord>) {
        *self.members.lock().unwrap() = members;
    }

    pub fn fail_member_listing(&self) {
        self.members_fail.store(true, Ordering::SeqCst);
    }

    pub fn panic_on_member_listing(&self, on: bool) {
        self.members_panic.store(on, Ordering::SeqCst);
    }

    pub fn fail_removal_of(&self, user: UserId) {
        self.remove_fails.lock().unwrap().insert(user);
    }

    pub fn add_history(&self, channel: ChannelId, entries: Vec<HistoryEntry>) {
        self.history.lock().unwrap().insert(channel, entries);
    }

    pub fn fail_history(&self, channel: ChannelId, err: Error) {
        self.history_fails
            .lock()
            .unwrap()
            .insert(channel, err.to_string());
    }

    pub fn removed_users(&self) -> Vec<UserId> {
        self.removals
            .lock()
            .unwrap()
            .iter()
            .map(|(_, u, _)| *u)
            .collect()
    }
}

#[async_trait]
impl MessagingPort for FakePlatform {
    async fn send_message(&self, channel: ChannelId, msg: OutgoingMessage) -> Result<MessageRef> {
        self.trace(format!("send:{}", channel.0));
        if self.send_fails.lock().unwrap().contains(&channel) {
            return Err(Error::External("send failed".to_string()));
        }
        self.sent.lock().unwrap().push((channel, msg));
        Ok(self.alloc(channel))
    }

    async fn send_direct(&self, user: UserId, msg: OutgoingMessage) -> Result<MessageRef> {
        self.trace(format!("dm:{}", user.0));
        if self.direct_fails.lock().unwrap().contains(&user) {
            return Err(Error::Permission("cannot send messages to this user".to_string()));
        }
        self.direct.lock().unwrap().push((user, msg));
        Ok(self.alloc(ChannelId(user.0)))
    }

    async fn add_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        self.reactions.lock().unwrap().push((msg, emoji.to_string()));
        Ok(())
    }

    async fn resolve_channel(&self, channel: ChannelId) -> Result<Option<ChannelId>> {
        if self.channel_lookup_fails.load(Ordering::SeqCst) {
            return Err(Error::External("gateway timeout".to_string()));
        }
        Ok(self
            .channels
            .lock()
            .unwrap()
            .contains(&channel)
            .then_some(channel))
    }

    async fn resolve_user(&self, user: UserId) -> Result<Option<UserProfile>> {
        Ok(self.users.lock().unwrap().get(&user).cloned())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.downloads
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::NotFound(url.to_string()))
    }
}

#[async_trait]
impl CommunityPort for FakePlatform {
    async fn primary_community(&self) -> Result<Option<CommunityId>> {
        Ok(*self.community.lock().unwrap())
    }

    async fn community_name(&self, _community: CommunityId) -> Result<Option<String>> {
        Ok(self.community_name.lock().unwrap().clone())
    }

    async fn can_remove_members(&self, _community: CommunityId) -> Result<bool> {
        Ok(self.can_remove.load(Ordering::SeqCst))
    }

    async fn list_members(&self, _community: CommunityId) -> Result<Vec<MemberRecord>> {
        if self.members_panic.load(Ordering::SeqCst) {
            panic!("member listing exploded");
        }
        if self.members_fail.load(Ordering::SeqCst) {
            return Err(Error::External("member listing failed".to_string()));
        }
        Ok(self.members.lock().unwrap().clone())
    }

    async fn remove_member(
        &self,
        community: CommunityId,
        user: UserId,
        reason: &str,
    ) -> Result<()> {
        self.trace(format!("remove:{}", user.0));
        if self.remove_fails.lock().unwrap().contains(&user) {
            return Err(Error::Permission("missing kick permission".to_string()));
        }
        self.removals
            .lock()
            .unwrap()
            .push((community, user, reason.to_string()));
        Ok(())
    }

    async fn readable_channels(&self) -> Result<Vec<ChannelId>> {
        let mut out: Vec<ChannelId> = self.history.lock().unwrap().keys().copied().collect();
        out.extend(self.history_fails.lock().unwrap().keys().copied());
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn recent_messages(&self, channel: ChannelId, limit: usize) -> Result<Vec<HistoryEntry>> {
        if let Some(reason) = self.history_fails.lock().unwrap().get(&channel) {
            return Err(Error::Permission(reason.clone()));
        }
        let mut entries = self
            .history
            .lock()
            .unwrap()
            .get(&channel)
            .cloned()
            .unwrap_or_default();
        entries.truncate(limit);
        Ok(entries)
    }
}
