//! Tracks which users have ever spoken in a community channel.
//!
//! The set only grows. It is seeded from recent channel history at startup so
//! a restart does not make every existing member look silent; members whose
//! only messages fall outside the sampled window are still unprotected.

use std::{collections::HashSet, sync::RwLock};

use tracing::{debug, info};

use crate::{domain::UserId, messaging::port::CommunityPort};

#[derive(Debug, Default)]
pub struct ActivityTracker {
    active: RwLock<HashSet<UserId>>,
}

/// Summary of a startup history scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub channels_scanned: usize,
    pub channels_skipped: usize,
    pub authors_marked: usize,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every non-bot author found in the last `limit` messages of each
    /// readable channel as active.
    ///
    /// Per-channel failures (missing permission, transport errors) are
    /// swallowed and the scan moves on.
    pub async fn initialize(&self, community: &dyn CommunityPort, limit: usize) -> SeedReport {
        let mut report = SeedReport::default();

        let channels = match community.readable_channels().await {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "could not list channels for activity seeding");
                return report;
            }
        };

        for channel in channels {
            let history = match community.recent_messages(channel, limit).await {
                Ok(v) => v,
                Err(e) => {
                    debug!(channel = channel.0, error = %e, "skipping channel history");
                    report.channels_skipped += 1;
                    continue;
                }
            };

            report.channels_scanned += 1;
            for entry in history.into_iter().filter(|e| !e.author_is_bot) {
                if self.record_activity(entry.author) {
                    report.authors_marked += 1;
                }
            }
        }

        info!(
            scanned = report.channels_scanned,
            skipped = report.channels_skipped,
            marked = report.authors_marked,
            "activity tracker seeded"
        );
        report
    }

    /// Record that `user` spoke. Returns `true` the first time only.
    pub fn record_activity(&self, user: UserId) -> bool {
        // Poisoning only happens if a writer panicked mid-insert; the set is
        // still valid, so keep using it.
        let mut set = self.active.write().unwrap_or_else(|e| e.into_inner());
        set.insert(user)
    }

    pub fn has_spoken(&self, user: UserId) -> bool {
        let set = self.active.read().unwrap_or_else(|e| e.into_inner());
        set.contains(&user)
    }

    pub fn len(&self) -> usize {
        self.active.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChannelId, HistoryEntry};
    use crate::errors::Error;
    use crate::testing::FakePlatform;

    fn human(id: u64) -> HistoryEntry {
        HistoryEntry {
            author: UserId(id),
            author_is_bot: false,
        }
    }

    fn bot(id: u64) -> HistoryEntry {
        HistoryEntry {
            author: UserId(id),
            author_is_bot: true,
        }
    }

    #[test]
    fn record_is_idempotent() {
        let t = ActivityTracker::new();
        assert!(!t.has_spoken(UserId(1)));
        assert!(t.record_activity(UserId(1)));
        assert!(!t.record_activity(UserId(1)));
        assert!(t.has_spoken(UserId(1)));
        assert_eq!(t.len(), 1);
    }

    #[tokio::test]
    async fn seeding_skips_bots_and_failed_channels() {
        let platform = FakePlatform::new();
        platform.add_history(ChannelId(10), vec![human(1), bot(2), human(3), human(1)]);
        platform.fail_history(ChannelId(11), Error::Permission("no read".to_string()));
        platform.add_history(ChannelId(12), vec![human(4)]);

        let t = ActivityTracker::new();
        let report = t.initialize(&platform, 200).await;

        assert_eq!(report.channels_scanned, 2);
        assert_eq!(report.channels_skipped, 1);
        assert_eq!(report.authors_marked, 3);
        assert!(t.has_spoken(UserId(1)));
        assert!(!t.has_spoken(UserId(2)));
        assert!(t.has_spoken(UserId(3)));
        assert!(t.has_spoken(UserId(4)));
    }

    #[tokio::test]
    async fn seeding_honours_the_sampling_limit() {
        let platform = FakePlatform::new();
        platform.add_history(ChannelId(10), vec![human(1), human(2), human(3)]);

        let t = ActivityTracker::new();
        t.initialize(&platform, 2).await;

        assert!(t.has_spoken(UserId(1)));
        assert!(t.has_spoken(UserId(2)));
        assert!(!t.has_spoken(UserId(3)));
    }
}
