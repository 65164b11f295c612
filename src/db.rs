//! The keyspace façade: named sorted sets addressed by string keys.
//!
//! [`Store`] maps each key to an independent [`SortedSet`] and exposes the
//! familiar command surface on top of the core primitives. This layer owns
//! every convention the core deliberately does not: ranks are 0-based here,
//! range windows accept negative indices counted from the tail, and scores
//! can arrive as text, floats, or integers and leave as fixed-precision
//! decimal strings.
//!
//! # Examples
//!
//! ## Basic usage
//!
//! ```
//! use ratset::db::Store;
//!
//! let store = Store::new();
//! store.zadd_i64("board", "alice", 100);
//! store.zadd_i64("board", "bob", 250);
//!
//! assert_eq!(store.zrank("board", "alice"), Some(0));
//! assert_eq!(store.zrevrank("board", "bob"), Some(0));
//! assert_eq!(store.zcard("board"), Some(2));
//!
//! let popped = store.zpopmax("board", 1);
//! assert_eq!(popped[0].member, "bob");
//! ```
//!
//! ## Exact decimal scores
//!
//! Scores parsed from text keep every digit; a 20-digit fraction survives a
//! round trip that would shred an IEEE-754 double.
//!
//! ```
//! use ratset::db::Store;
//!
//! let store = Store::new();
//! store
//!     .zadd_str("acct", "m", "12345678901234567890.12345678901234567890")
//!     .unwrap();
//! assert_eq!(
//!     store.zscore_string("acct", "m").unwrap(),
//!     "12345678901234567890.12345678901234567890"
//! );
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::error::Error;
use crate::score::Score;
use crate::{Entry, SkipList};

/// Fractional digits in the decimal strings this layer returns.
const DECIMAL_PRECISION: usize = 20;

/// A sorted set with `String` members, as stored under each key.
pub type SortedSet = SkipList<String>;

/// Translates a 0-based, possibly negative `[start, stop]` window over a set
/// of `card` entries into the core's 1-based inclusive ranks.
fn normalize_window(card: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if card == 0 {
        return None;
    }
    let card = card as i64;
    let mut start = if start < 0 { card + start } else { start };
    let mut stop = if stop < 0 { card + stop } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= card {
        stop = card - 1;
    }
    if start > stop {
        return None;
    }
    Some((start as usize + 1, stop as usize + 1))
}

/// Applies `offset`/`count` pagination to a collected score range.
fn paginate(entries: Vec<Entry<String>>, offset: usize, count: Option<usize>) -> Vec<Entry<String>> {
    entries
        .into_iter()
        .skip(offset)
        .take(count.unwrap_or(usize::MAX))
        .collect()
}

/// A keyspace of independent sorted sets.
///
/// The key map sits behind its own readers–writer lock; each set carries its
/// own lock inside. Reads on a missing key return empty or absent results,
/// removals report zero, and writes create the set on first touch.
pub struct Store {
    sets: RwLock<HashMap<String, Arc<SortedSet>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty keyspace.
    pub fn new() -> Self {
        Store {
            sets: RwLock::new(HashMap::new()),
        }
    }

    /// Fetches the set under `key`, or `None` if the key is unused.
    fn lookup(&self, key: &str) -> Option<Arc<SortedSet>> {
        self.sets.read().get(key).cloned()
    }

    /// Fetches or creates the set under `key`.
    ///
    /// Probes under the shared lock first; only a genuinely new key pays for
    /// the exclusive lock, and the entry is re-checked there in case another
    /// writer won the race in between.
    fn lookup_or_create(&self, key: &str) -> Arc<SortedSet> {
        if let Some(set) = self.sets.read().get(key) {
            return Arc::clone(set);
        }
        let mut sets = self.sets.write();
        Arc::clone(sets.entry(key.to_string()).or_insert_with(|| {
            debug!("creating sorted set for key {key:?}");
            Arc::new(SortedSet::new())
        }))
    }

    // --- adding members ---

    /// Adds `member` with an exact `score`, updating it if already present.
    pub fn zadd(&self, key: &str, member: &str, score: Score) {
        self.lookup_or_create(key).insert(member.to_string(), score);
    }

    /// Adds `member` with a score parsed from decimal text.
    pub fn zadd_str(&self, key: &str, member: &str, score: &str) -> Result<(), Error> {
        let score: Score = score.parse()?;
        self.zadd(key, member, score);
        Ok(())
    }

    /// Adds `member` with the exact rational value of a finite `f64`.
    pub fn zadd_f64(&self, key: &str, member: &str, score: f64) -> Result<(), Error> {
        let score = Score::from_f64(score)?;
        self.zadd(key, member, score);
        Ok(())
    }

    /// Adds `member` with an integer score.
    pub fn zadd_i64(&self, key: &str, member: &str, score: i64) {
        self.zadd(key, member, Score::from(score));
    }

    /// Adds every `(member, score)` pair, returning how many were processed.
    pub fn zadd_multiple(
        &self,
        key: &str,
        members: impl IntoIterator<Item = (String, Score)>,
    ) -> usize {
        let set = self.lookup_or_create(key);
        let mut count = 0;
        for (member, score) in members {
            set.insert(member, score);
            count += 1;
        }
        count
    }

    // --- removing members ---

    /// Removes `member`. Returns whether it was present.
    pub fn zrem(&self, key: &str, member: &str) -> bool {
        match self.lookup(key) {
            Some(set) => set.remove_member(member),
            None => false,
        }
    }

    /// Removes every listed member, returning how many were present.
    pub fn zrem_multiple(&self, key: &str, members: &[&str]) -> usize {
        let set = match self.lookup(key) {
            Some(set) => set,
            None => return 0,
        };
        members
            .iter()
            .filter(|member| set.remove_member(**member))
            .count()
    }

    // --- scores ---

    /// Returns a copy of the member's exact score.
    pub fn zscore(&self, key: &str, member: &str) -> Option<Score> {
        self.lookup(key)?.score(member)
    }

    /// Returns the member's score as decimal text with 20 fractional digits.
    pub fn zscore_string(&self, key: &str, member: &str) -> Option<String> {
        Some(self.zscore(key, member)?.to_decimal(DECIMAL_PRECISION))
    }

    // --- ranks ---

    /// Returns the member's 0-based ascending rank.
    pub fn zrank(&self, key: &str, member: &str) -> Option<usize> {
        Some(self.member_rank(key, member)? - 1)
    }

    /// Returns the member's 0-based descending rank.
    pub fn zrevrank(&self, key: &str, member: &str) -> Option<usize> {
        let set = self.lookup(key)?;
        let score = set.score(member)?;
        let rank = set.rank(member, &score)?;
        set.len().checked_sub(rank)
    }

    /// Returns the member's 1-based ascending rank.
    pub fn member_rank(&self, key: &str, member: &str) -> Option<usize> {
        let set = self.lookup(key)?;
        let score = set.score(member)?;
        set.rank(member, &score)
    }

    // --- neighbors ---

    /// Returns the entry ordered immediately before `member`.
    pub fn prev_member(&self, key: &str, member: &str) -> Option<Entry<String>> {
        self.lookup(key)?.prev(member)
    }

    /// Returns the entry ordered immediately after `member`.
    pub fn next_member(&self, key: &str, member: &str) -> Option<Entry<String>> {
        self.lookup(key)?.next(member)
    }

    /// Like [`Store::prev_member`], with the score as 20-digit decimal text.
    pub fn prev_member_string(&self, key: &str, member: &str) -> Option<(String, String)> {
        let entry = self.prev_member(key, member)?;
        Some((entry.member, entry.score.to_decimal(DECIMAL_PRECISION)))
    }

    /// Like [`Store::next_member`], with the score as 20-digit decimal text.
    pub fn next_member_string(&self, key: &str, member: &str) -> Option<(String, String)> {
        let entry = self.next_member(key, member)?;
        Some((entry.member, entry.score.to_decimal(DECIMAL_PRECISION)))
    }

    // --- rank windows ---

    /// Returns the entries in the 0-based window `[start, stop]`, ascending.
    /// Negative indices count back from the last entry, `-1` being the last.
    pub fn zrange(&self, key: &str, start: i64, stop: i64) -> Vec<Entry<String>> {
        let set = match self.lookup(key) {
            Some(set) => set,
            None => return Vec::new(),
        };
        match normalize_window(set.len(), start, stop) {
            Some((lo, hi)) => set.range(lo, hi, false),
            None => Vec::new(),
        }
    }

    /// Returns the same window as [`Store::zrange`], emitted in descending
    /// order.
    pub fn zrevrange(&self, key: &str, start: i64, stop: i64) -> Vec<Entry<String>> {
        let set = match self.lookup(key) {
            Some(set) => set,
            None => return Vec::new(),
        };
        match normalize_window(set.len(), start, stop) {
            Some((lo, hi)) => set.range(lo, hi, true),
            None => Vec::new(),
        }
    }

    // --- score windows ---

    /// Returns the entries with scores in `[min, max]` (inclusive),
    /// ascending, skipping `offset` entries and yielding at most `count`
    /// when given.
    pub fn zrange_by_score(
        &self,
        key: &str,
        min: &Score,
        max: &Score,
        offset: usize,
        count: Option<usize>,
    ) -> Vec<Entry<String>> {
        match self.lookup(key) {
            Some(set) => paginate(set.range_by_score(min, max, false), offset, count),
            None => Vec::new(),
        }
    }

    /// Returns the entries with scores in `[min, max]` (inclusive),
    /// descending from `max`, with the same pagination.
    pub fn zrevrange_by_score(
        &self,
        key: &str,
        max: &Score,
        min: &Score,
        offset: usize,
        count: Option<usize>,
    ) -> Vec<Entry<String>> {
        match self.lookup(key) {
            Some(set) => paginate(set.range_by_score(min, max, true), offset, count),
            None => Vec::new(),
        }
    }

    // --- cardinality and counting ---

    /// Returns the number of members under `key`, or `None` for an unused key.
    pub fn zcard(&self, key: &str) -> Option<usize> {
        Some(self.lookup(key)?.len())
    }

    /// Counts the members with scores in `[min, max]`.
    pub fn zcount(&self, key: &str, min: &Score, max: &Score) -> usize {
        match self.lookup(key) {
            Some(set) => set.count_by_score(min, max),
            None => 0,
        }
    }

    // --- bulk removal ---

    /// Removes the entries in the 0-based window `[start, stop]` (negative
    /// indices as in [`Store::zrange`]). Returns the number removed.
    pub fn zremrange_by_rank(&self, key: &str, start: i64, stop: i64) -> usize {
        let set = match self.lookup(key) {
            Some(set) => set,
            None => return 0,
        };
        match normalize_window(set.len(), start, stop) {
            Some((lo, hi)) => set.remove_by_rank(lo, hi),
            None => 0,
        }
    }

    /// Removes the entries with scores in `[min, max]`. Returns the number
    /// removed.
    pub fn zremrange_by_score(&self, key: &str, min: &Score, max: &Score) -> usize {
        match self.lookup(key) {
            Some(set) => set.remove_by_score(min, max),
            None => 0,
        }
    }

    // --- increments ---

    /// Adds `delta` to the member's score (starting from `delta` if absent)
    /// and returns the resulting exact score.
    pub fn zincrby(&self, key: &str, member: &str, delta: &Score) -> Score {
        self.lookup_or_create(key)
            .increment(member.to_string(), delta)
    }

    // --- pops ---

    /// Removes and returns the `count` lowest-scored entries, ascending.
    pub fn zpopmin(&self, key: &str, count: usize) -> Vec<Entry<String>> {
        match self.lookup(key) {
            Some(set) => set.pop_min(count),
            None => Vec::new(),
        }
    }

    /// Removes and returns the `count` highest-scored entries, descending.
    pub fn zpopmax(&self, key: &str, count: usize) -> Vec<Entry<String>> {
        match self.lookup(key) {
            Some(set) => set.pop_max(count),
            None => Vec::new(),
        }
    }

    // --- keyspace ---

    /// Drops whole sets. Returns how many of the keys existed.
    pub fn del(&self, keys: &[&str]) -> usize {
        let mut sets = self.sets.write();
        keys.iter().filter(|key| sets.remove(**key).is_some()).count()
    }

    /// Returns whether `key` holds a set.
    pub fn exists(&self, key: &str) -> bool {
        self.sets.read().contains_key(key)
    }

    /// Returns every key currently holding a set, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.sets.read().keys().cloned().collect()
    }

    /// Drops every set.
    pub fn flush(&self) {
        let mut sets = self.sets.write();
        debug!("flushing {} sorted sets", sets.len());
        sets.clear();
    }
}
