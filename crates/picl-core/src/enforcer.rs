//! Periodic removal of members who joined long ago and never spoke.
//!
//! One background loop per process, ticking on a fixed interval. Each tick is
//! best-effort: per-member failures are logged and skipped, and a failing or
//! panicking tick is logged without stopping the loop.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    activity::ActivityTracker,
    domain::{CommunityId, MemberRecord, UserId},
    messaging::{
        port::{CommunityPort, MessagingPort},
        types::OutgoingMessage,
    },
    texts, Result,
};

pub const REMOVAL_REASON: &str = "Inactive: no messages since joining";

/// Private notice sent just before a member is removed.
pub fn removal_notice(community_name: &str) -> String {
    format!(
        "You have been removed from {community_name} for inactivity. \
You're welcome to rejoin and say hi!"
    )
}

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Checking,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnforcementPolicy {
    pub threshold_days: u64,
    pub interval: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NoCommunity,
    NoRemovalPermission,
}

/// Outcome of one enforcement pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub skipped: Option<SkipReason>,
    pub candidates: usize,
    pub removed: Vec<UserId>,
    pub notices_failed: usize,
    pub denied: usize,
    pub failed: usize,
    pub spoke_meanwhile: usize,
}

impl TickReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }
}

/// Members eligible for removal at `now` (unix seconds).
///
/// A member qualifies when it is not a bot, has a known join time at least
/// `threshold_days` old, and has never been seen speaking.
pub fn select_candidates(
    members: &[MemberRecord],
    now: i64,
    threshold_days: u64,
    tracker: &ActivityTracker,
) -> Vec<UserId> {
    let threshold_secs = i64::try_from(threshold_days)
        .unwrap_or(i64::MAX)
        .saturating_mul(SECONDS_PER_DAY);

    members
        .iter()
        .filter(|m| !m.is_bot)
        .filter(|m| {
            m.joined_at
                .map(|joined| now.saturating_sub(joined) >= threshold_secs)
                .unwrap_or(false)
        })
        .filter(|m| !tracker.has_spoken(m.user_id))
        .map(|m| m.user_id)
        .collect()
}

#[derive(Clone)]
pub struct InactivityEnforcer {
    inner: Arc<EnforcerInner>,
}

struct EnforcerInner {
    policy: EnforcementPolicy,
    tracker: Arc<ActivityTracker>,
    community: Arc<dyn CommunityPort>,
    messenger: Arc<dyn MessagingPort>,
    phase: Mutex<Phase>,
    state: tokio::sync::Mutex<LoopState>,
}

#[derive(Default)]
struct LoopState {
    handle: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

/// Resets the phase to `Idle` however the check exits.
struct PhaseGuard<'a>(&'a Mutex<Phase>);

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a Mutex<Phase>) -> Self {
        *phase.lock().unwrap_or_else(|e| e.into_inner()) = Phase::Checking;
        Self(phase)
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Phase::Idle;
    }
}

impl InactivityEnforcer {
    pub fn new(
        policy: EnforcementPolicy,
        tracker: Arc<ActivityTracker>,
        community: Arc<dyn CommunityPort>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            inner: Arc::new(EnforcerInner {
                policy,
                tracker,
                community,
                messenger,
                phase: Mutex::new(Phase::Idle),
                state: tokio::sync::Mutex::new(LoopState::default()),
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.inner.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start the periodic loop. Returns `false` if it is already running.
    ///
    /// The first check happens one full interval after start.
    pub async fn start(&self) -> bool {
        let mut st = self.inner.state.lock().await;
        if st.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return false;
        }

        let tok = CancellationToken::new();
        st.cancel = Some(tok.clone());
        let enforcer = self.clone();
        let every = self.inner.policy.interval;
        let handle = tokio::spawn(async move {
            let mut tick = interval_at(Instant::now() + every, every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tok.cancelled() => break,
                    _ = tick.tick() => {
                        enforcer.run_tick().await;
                    }
                }
            }
            debug!("inactivity loop stopped");
        });

        st.handle = Some(handle);
        info!(
            interval_secs = every.as_secs(),
            threshold_days = self.inner.policy.threshold_days,
            "inactivity enforcement started"
        );
        true
    }

    pub async fn stop(&self) {
        let mut st = self.inner.state.lock().await;
        if let Some(tok) = st.cancel.take() {
            tok.cancel();
        }
        st.handle.take(); // exits on cancellation
    }

    pub async fn is_running(&self) -> bool {
        let st = self.inner.state.lock().await;
        st.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Run one check now, containing both errors and panics.
    ///
    /// Returns `None` when the check failed; the failure has been logged.
    pub async fn run_tick(&self) -> Option<TickReport> {
        let enforcer = self.clone();
        let now = chrono::Utc::now().timestamp();
        match tokio::spawn(async move { enforcer.check_at(now).await }).await {
            Ok(Ok(report)) => Some(report),
            Ok(Err(e)) => {
                error!(error = %e, "inactivity check failed");
                None
            }
            Err(e) => {
                error!(error = %e, "inactivity check aborted");
                None
            }
        }
    }

    /// One enforcement pass evaluated at `now` (unix seconds).
    pub async fn check_at(&self, now: i64) -> Result<TickReport> {
        let _phase = PhaseGuard::enter(&self.inner.phase);

        let Some(community) = self.inner.community.primary_community().await? else {
            debug!("not in any community; skipping inactivity check");
            return Ok(TickReport::skipped(SkipReason::NoCommunity));
        };

        match self.inner.community.can_remove_members(community).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(community = community.0, "no removal permission; skipping inactivity check");
                return Ok(TickReport::skipped(SkipReason::NoRemovalPermission));
            }
            Err(e) if e.is_permission() => {
                debug!(community = community.0, error = %e, "no removal permission; skipping inactivity check");
                return Ok(TickReport::skipped(SkipReason::NoRemovalPermission));
            }
            Err(e) => return Err(e),
        }

        let members = self.inner.community.list_members(community).await?;
        let candidates = select_candidates(
            &members,
            now,
            self.inner.policy.threshold_days,
            &self.inner.tracker,
        );

        let mut report = TickReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        if candidates.is_empty() {
            debug!(members = members.len(), "no inactive members");
            return Ok(report);
        }
        info!(count = candidates.len(), "removing inactive members");

        let name = match self.inner.community.community_name(community).await {
            Ok(Some(name)) => name,
            Ok(None) => texts::UNNAMED_COMMUNITY.to_string(),
            Err(e) => {
                debug!(community = community.0, error = %e, "community name lookup failed");
                texts::UNNAMED_COMMUNITY.to_string()
            }
        };
        let notice = removal_notice(&name);

        for user in candidates {
            self.remove_one(community, user, &notice, &mut report).await;
        }

        Ok(report)
    }

    async fn remove_one(
        &self,
        community: CommunityId,
        user: UserId,
        notice: &str,
        report: &mut TickReport,
    ) {
        // Activity seen while earlier candidates were processed wins.
        if self.inner.tracker.has_spoken(user) {
            report.spoke_meanwhile += 1;
            return;
        }

        if let Err(e) = self
            .inner
            .messenger
            .send_direct(user, OutgoingMessage::text(notice))
            .await
        {
            debug!(user = user.0, error = %e, "removal notice not delivered");
            report.notices_failed += 1;
        }

        match self
            .inner
            .community
            .remove_member(community, user, REMOVAL_REASON)
            .await
        {
            Ok(()) => {
                info!(user = user.0, "removed inactive member");
                report.removed.push(user);
            }
            Err(e) if e.is_permission() => {
                warn!(user = user.0, error = %e, "not permitted to remove member");
                report.denied += 1;
            }
            Err(e) => {
                warn!(user = user.0, error = %e, "failed to remove member");
                report.failed += 1;
            }
        }
    }
}
