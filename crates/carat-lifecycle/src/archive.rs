//! Bounded FIFO archive of retired game channels.
//!
//! The platform caps a category at 50 channels, so the archive category
//! holds at most that many retired games. When it is full the oldest
//! retirement is destroyed to make room for the next one.

use std::collections::VecDeque;

use carat_platform::{Channel, ChannelId};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::error::{LifecycleError, Result};
use crate::naming::{NamingConvention, ResourceKind};
use crate::session::SessionNumber;

/// Default archive capacity (the platform's per-category channel limit).
pub const DEFAULT_ARCHIVE_CAPACITY: usize = 50;

/// Separator between a game channel's name and its retirement stamp.
pub const ARCHIVED_ON: &str = " Archived on ";

/// Timestamp layout embedded in archived channel names.
const RETIRED_AT_FORMAT: &str = "%a, %d %b %Y %H %M %S";

/// A retired game channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    /// Channel id of the retired channel
    pub channel: ChannelId,

    /// Name the channel carries in the archive
    pub name: String,

    /// Game the channel belonged to, when it can be recovered from the name
    pub session: Option<SessionNumber>,

    /// Retirement time, when known
    pub retired_at: Option<DateTime<Utc>>,

    /// Insertion order; lower is older
    pub sequence: u64,
}

impl ArchiveEntry {
    /// Entry for a channel retired now (sequence assigned on insert).
    pub fn new(
        channel: ChannelId,
        name: String,
        session: Option<SessionNumber>,
        retired_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            channel,
            name,
            session,
            retired_at,
            sequence: 0,
        }
    }
}

/// Name a game channel gets when it is retired at `at`.
pub fn retired_name(name: &str, at: DateTime<Utc>) -> String {
    format!("{}{}{}", name, ARCHIVED_ON, at.format(RETIRED_AT_FORMAT))
}

/// Split an archived channel name into its original name and stamp.
pub fn parse_retired_name(name: &str) -> Option<(&str, Option<DateTime<Utc>>)> {
    let (original, stamp) = name.split_once(ARCHIVED_ON)?;
    let retired_at = NaiveDateTime::parse_from_str(stamp.trim(), RETIRED_AT_FORMAT)
        .ok()
        .map(|t| t.and_utc());
    Some((original, retired_at))
}

/// The archive's contents, oldest first.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    capacity: usize,
    entries: VecDeque<ArchiveEntry>,
    next_sequence: u64,
}

impl ArchiveStore {
    /// An empty archive.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            next_sequence: 0,
        }
    }

    /// Rebuild the archive from the archive category's channel listing.
    ///
    /// `listing` is sorted by position; the top of the category holds the
    /// most recent retirement, so the listing is read bottom-up.
    pub fn from_listing(capacity: usize, listing: &[Channel], naming: &NamingConvention) -> Self {
        let mut store = Self::new(capacity);
        for channel in listing.iter().rev() {
            let (session, retired_at) = match parse_retired_name(&channel.name) {
                Some((original, retired_at)) => (
                    naming.session_of(ResourceKind::GameChannel, original),
                    retired_at,
                ),
                None => (None, None),
            };
            store.push(ArchiveEntry::new(
                channel.id,
                channel.name.clone(),
                session,
                retired_at,
            ));
        }
        store
    }

    fn push(&mut self, mut entry: ArchiveEntry) {
        entry.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.push_back(entry);
    }

    /// Insert a newly retired channel, evicting the oldest entry first if
    /// the archive is full. Returns the evicted entry.
    pub fn insert(&mut self, entry: ArchiveEntry) -> Result<Option<ArchiveEntry>> {
        let evicted = if self.is_full() {
            self.pop_oldest()
        } else {
            None
        };
        self.push(entry);
        self.check_capacity()?;
        Ok(evicted)
    }

    /// Fail if the archive is over capacity.
    pub fn check_capacity(&self) -> Result<()> {
        if self.entries.len() > self.capacity {
            return Err(LifecycleError::CapacityInvariantViolation {
                len: self.entries.len(),
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// The earliest retirement still held.
    pub fn oldest(&self) -> Option<&ArchiveEntry> {
        self.entries.front()
    }

    /// Remove and return the earliest retirement.
    pub fn pop_oldest(&mut self) -> Option<ArchiveEntry> {
        self.entries.pop_front()
    }

    /// Whether another insert would evict.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter()
    }

    /// Whether a channel is held in the archive.
    pub fn contains(&self, channel: ChannelId) -> bool {
        self.entries.iter().any(|e| e.channel == channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(id: u64) -> ArchiveEntry {
        ArchiveEntry::new(ChannelId(id), format!("archived-{}", id), None, None)
    }

    #[test]
    fn insert_below_capacity_keeps_everything() {
        let mut store = ArchiveStore::new(3);
        assert!(store.insert(entry(1)).unwrap().is_none());
        assert!(store.insert(entry(2)).unwrap().is_none());
        assert_eq!(store.len(), 2);
        assert!(!store.is_full());
    }

    #[test]
    fn full_archive_evicts_oldest() {
        let mut store = ArchiveStore::new(3);
        for id in 1..=3 {
            store.insert(entry(id)).unwrap();
        }
        assert!(store.is_full());

        let evicted = store.insert(entry(4)).unwrap().unwrap();
        assert_eq!(evicted.channel, ChannelId(1));
        assert_eq!(store.len(), 3);
        assert!(!store.contains(ChannelId(1)));
        assert!(store.contains(ChannelId(4)));
        assert_eq!(store.oldest().unwrap().channel, ChannelId(2));
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let mut store = ArchiveStore::new(DEFAULT_ARCHIVE_CAPACITY);
        for id in 0..500 {
            let before_oldest = store.oldest().map(|e| e.sequence);
            let evicted = store.insert(entry(id)).unwrap();
            assert!(store.len() <= DEFAULT_ARCHIVE_CAPACITY);
            if let Some(evicted) = evicted {
                // The evicted entry was the earliest one held.
                assert_eq!(Some(evicted.sequence), before_oldest);
                assert!(store.entries().all(|e| e.sequence > evicted.sequence));
            }
        }
        assert_eq!(store.len(), DEFAULT_ARCHIVE_CAPACITY);
    }

    #[test]
    fn retired_name_round_trips() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 18, 5, 9).unwrap();
        let name = retired_name("text-game-7", at);
        assert_eq!(name, "text-game-7 Archived on Mon, 19 Oct 2026 18 05 09");

        let (original, parsed) = parse_retired_name(&name).unwrap();
        assert_eq!(original, "text-game-7");
        assert_eq!(parsed, Some(at));
        assert!(parse_retired_name("text-game-7").is_none());
    }

    #[test]
    fn listing_is_read_bottom_up() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let listing: Vec<Channel> = [
            (30, retired_name("text-game-3", at)),
            (20, "notes".to_string()),
            (10, retired_name("text-game-1", at)),
        ]
        .into_iter()
        .enumerate()
        .map(|(position, (id, name))| Channel {
            id: ChannelId(id),
            name,
            topic: String::new(),
            position: position as u32,
            category: None,
            overwrites: Vec::new(),
        })
        .collect();

        let store = ArchiveStore::from_listing(50, &listing, &NamingConvention::default());
        let order: Vec<u64> = store.entries().map(|e| e.channel.get()).collect();
        assert_eq!(order, vec![10, 20, 30]);

        let oldest = store.oldest().unwrap();
        assert_eq!(oldest.session.as_ref().map(|s| s.as_str()), Some("1"));
        assert_eq!(oldest.retired_at, Some(at));
        assert_eq!(store.entries().nth(1).unwrap().session, None);
    }
}
