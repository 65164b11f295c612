#![doc = include_str!("../README.md")]
//! The core, ranked skip-list implementation.
//!
//! This module provides `SkipList`, the ordered structure that underpins every
//! sorted set in ratset. It keeps entries in ascending `(score, member)` order
//! and answers rank queries in O(log N) in both directions.
//!
//! # Internals
//!
//! -   **Spine:** a multi-level forward chain. Level 0 links every node; each
//!     higher level links a geometrically thinner subsequence, giving the
//!     expected logarithmic search depth.
//! -   **Spans:** each forward pointer carries the number of level-0 positions
//!     it crosses. Summing spans while descending translates a rank into a
//!     node (and back) without walking the spine.
//! -   **Member index:** a hash map from member to node makes score lookups
//!     and existence checks O(1), and lets an update find the node it replaces
//!     without a search.
//! -   **Back-chain:** a level-0 backward pointer per node supports
//!     predecessor queries and reverse ranges.
//!
//! Nodes live in an index arena (`Vec` slots addressed by `usize`, with a
//! free list of recycled slots), so the bidirectional links need no unsafe
//! pointer juggling. A single readers–writer lock guards the whole structure:
//! reads share it, mutations take it exclusively, and compound operations
//! such as [`SkipList::increment`] and [`SkipList::pop_min`] stay atomic by
//! holding it across both halves.

pub mod db;
pub mod error;
pub mod score;

pub use crate::error::Error;
pub use crate::score::Score;

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;

const DEFAULT_MAX_LEVEL: usize = 32;
const DEFAULT_P: f64 = 0.25;

/// Arena index standing in for "no node".
const NIL: usize = usize::MAX;

/// A `(score, member)` pair, the unit of ordering.
///
/// Entries returned by queries are deep copies: the score is an independent
/// rational whose lifetime is unrelated to the node it came from, so a caller
/// can never observe a later mutation through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<M> {
    pub score: Score,
    pub member: M,
}

impl<M: Ord> PartialOrd for Entry<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M: Ord> Ord for Entry<M> {
    /// Orders by score, then by member. Ties on score are broken by the
    /// member's own ordering, so equal-scored entries still have one
    /// well-defined rank each.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| self.member.cmp(&other.member))
    }
}

/// A node in the arena. The head sentinel and recycled slots carry no entry.
struct Node<M> {
    entry: Option<Entry<M>>,
    /// Forward links, one per level of this node.
    forward: Vec<usize>,
    /// Level-0 positions crossed by the matching forward link.
    span: Vec<usize>,
    /// Level-0 predecessor, `NIL` for the first node.
    backward: usize,
}

impl<M> Node<M> {
    /// Creates the head sentinel, sized to the configured maximum level.
    fn head(max_level: usize) -> Self {
        Node {
            entry: None,
            forward: vec![NIL; max_level],
            span: vec![0; max_level],
            backward: NIL,
        }
    }

    fn level(&self) -> usize {
        self.forward.len()
    }
}

/// The unsynchronized interior of a [`SkipList`]: every method here assumes
/// the caller already holds the appropriate side of the outer lock.
struct ListCore<M> {
    /// Slot 0 is always the head sentinel.
    nodes: Vec<Node<M>>,
    /// Recycled arena slots, reused before the arena grows.
    free: Vec<usize>,
    /// Last node on level 0, `NIL` when empty.
    tail: usize,
    len: usize,
    /// Highest level currently occupied by any node, at least 1.
    level: usize,
    max_level: usize,
    p: f64,
    rng: fastrand::Rng,
    /// member -> arena slot of the node holding it.
    index: HashMap<M, usize>,
}

impl<M> ListCore<M>
where
    M: Ord + Hash + Eq + Clone,
{
    fn new(max_level: usize, p: f64, rng: fastrand::Rng) -> Self {
        ListCore {
            nodes: vec![Node::head(max_level)],
            free: Vec::new(),
            tail: NIL,
            len: 0,
            level: 1,
            max_level,
            p,
            rng,
            index: HashMap::new(),
        }
    }

    /// Draws a level from the truncated geometric distribution.
    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < self.max_level && self.rng.f64() < self.p {
            level += 1;
        }
        level
    }

    /// Borrows the entry of a data node. Only the head sentinel and free
    /// slots lack one, and neither is reachable through a forward pointer.
    fn entry(&self, id: usize) -> &Entry<M> {
        self.nodes[id]
            .entry
            .as_ref()
            .expect("only data nodes are linked into the spine")
    }

    /// Whether node `id` orders strictly before the key `(score, member)`.
    fn precedes_entry<Q>(&self, id: usize, score: &Score, member: &Q) -> bool
    where
        M: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let e = self.entry(id);
        match e.score.cmp(score) {
            Ordering::Less => true,
            Ordering::Equal => e.member.borrow() < member,
            Ordering::Greater => false,
        }
    }

    /// Whether node `a` orders strictly before node `b`.
    fn precedes_node(&self, a: usize, b: usize) -> bool {
        self.entry(a) < self.entry(b)
    }

    fn alloc(&mut self, node: Node<M>) -> usize {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// Inserts `(member, score)`, replacing the member's old entry if its
    /// score differs and doing nothing if it is identical.
    fn insert(&mut self, member: M, score: Score) {
        if let Some(existing) = self.index.get(&member).copied() {
            if self.entry(existing).score == score {
                return;
            }
            // A score change rebuilds the node so the ordering-dependent
            // links and spans are recomputed from scratch.
            self.unlink(existing);
        }

        // Rightmost node preceding the insert point per level, and its
        // level-0 position (the head sits at position 0).
        let mut update = vec![0usize; self.max_level];
        let mut rank = vec![0usize; self.max_level];
        let mut x = 0usize;
        for i in (0..self.level).rev() {
            rank[i] = if i + 1 == self.level { 0 } else { rank[i + 1] };
            loop {
                let next = self.nodes[x].forward[i];
                if next == NIL || !self.precedes_entry(next, &score, &member) {
                    break;
                }
                rank[i] += self.nodes[x].span[i];
                x = next;
            }
            update[i] = x;
        }

        let level = self.random_level();
        if level > self.level {
            // Freshly opened levels descend from the head and cross the whole
            // list; seeding their spans with the current length keeps the
            // span formula below uniform across old and new levels.
            for i in self.level..level {
                rank[i] = 0;
                update[i] = 0;
                self.nodes[0].span[i] = self.len;
            }
            self.level = level;
        }

        let id = self.alloc(Node {
            entry: Some(Entry {
                score,
                member: member.clone(),
            }),
            forward: vec![NIL; level],
            span: vec![0; level],
            backward: NIL,
        });

        for i in 0..level {
            let u = update[i];
            let u_forward = self.nodes[u].forward[i];
            let u_span = self.nodes[u].span[i];
            let preceding = rank[0] - rank[i];
            {
                let node = &mut self.nodes[id];
                node.forward[i] = u_forward;
                node.span[i] = u_span - preceding;
            }
            let up = &mut self.nodes[u];
            up.forward[i] = id;
            up.span[i] = preceding + 1;
        }
        // Levels above the new node gained one position inside their span.
        for i in level..self.level {
            self.nodes[update[i]].span[i] += 1;
        }

        self.nodes[id].backward = if update[0] != 0 { update[0] } else { NIL };
        let next0 = self.nodes[id].forward[0];
        if next0 != NIL {
            self.nodes[next0].backward = id;
        } else {
            self.tail = id;
        }

        self.len += 1;
        self.index.insert(member, id);
    }

    /// Unlinks `target` from every level, repairs spans, the back-chain,
    /// the tail, the current level, and the member index, then recycles the
    /// arena slot.
    fn unlink(&mut self, target: usize) {
        let mut update = vec![0usize; self.level];
        let mut x = 0usize;
        for i in (0..self.level).rev() {
            loop {
                let next = self.nodes[x].forward[i];
                if next == NIL || next == target || !self.precedes_node(next, target) {
                    break;
                }
                x = next;
            }
            update[i] = x;
        }

        for i in 0..self.level {
            let u = update[i];
            if self.nodes[u].forward[i] == target {
                let t_span = self.nodes[target].span[i];
                let t_forward = self.nodes[target].forward[i];
                let up = &mut self.nodes[u];
                up.span[i] += t_span - 1;
                up.forward[i] = t_forward;
            } else {
                // The span crosses the removed position without landing on it.
                self.nodes[u].span[i] -= 1;
            }
        }

        let backward = self.nodes[target].backward;
        let next0 = self.nodes[target].forward[0];
        if next0 != NIL {
            self.nodes[next0].backward = backward;
        } else {
            self.tail = backward;
        }

        while self.level > 1 && self.nodes[0].forward[self.level - 1] == NIL {
            self.level -= 1;
        }

        let node = &mut self.nodes[target];
        let entry = node.entry.take();
        node.forward.clear();
        node.span.clear();
        node.backward = NIL;
        if let Some(entry) = entry {
            self.index.remove(&entry.member);
        }
        self.len -= 1;
        self.free.push(target);
    }

    /// 1-based rank of `(member, score)`, or 0 when no such entry exists.
    ///
    /// The search key is the pair: a caller holding a stale score will not
    /// find the member, because the traversal follows `(score, member)`
    /// order, not the member index.
    fn rank_of<Q>(&self, member: &Q, score: &Score) -> usize
    where
        M: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut rank = 0usize;
        let mut x = 0usize;
        for i in (0..self.level).rev() {
            loop {
                let next = self.nodes[x].forward[i];
                if next == NIL {
                    break;
                }
                let e = self.entry(next);
                let advance = match e.score.cmp(score) {
                    Ordering::Less => true,
                    Ordering::Equal => e.member.borrow() <= member,
                    Ordering::Greater => false,
                };
                if !advance {
                    break;
                }
                rank += self.nodes[x].span[i];
                x = next;
                if self.entry(x).member.borrow() == member {
                    return rank;
                }
            }
        }
        0
    }

    /// Arena slot of the node at 1-based `rank`, or `NIL` when out of range.
    fn node_at_rank(&self, rank: usize) -> usize {
        if rank < 1 || rank > self.len {
            return NIL;
        }
        let mut traversed = 0usize;
        let mut x = 0usize;
        for i in (0..self.level).rev() {
            while self.nodes[x].forward[i] != NIL && traversed + self.nodes[x].span[i] <= rank {
                traversed += self.nodes[x].span[i];
                x = self.nodes[x].forward[i];
            }
            if traversed == rank {
                return x;
            }
        }
        NIL
    }

    /// First node whose score is at least `min`, or `NIL`.
    fn first_at_least(&self, min: &Score) -> usize {
        let mut x = 0usize;
        for i in (0..self.level).rev() {
            loop {
                let next = self.nodes[x].forward[i];
                if next != NIL && self.entry(next).score < *min {
                    x = next;
                } else {
                    break;
                }
            }
        }
        self.nodes[x].forward[0]
    }

    fn range(&self, mut start: usize, mut stop: usize, reverse: bool) -> Vec<Entry<M>> {
        if start < 1 {
            start = 1;
        }
        if stop > self.len {
            stop = self.len;
        }
        if start > stop {
            return Vec::new();
        }
        let mut remaining = stop - start + 1;
        let mut out = Vec::with_capacity(remaining);
        if reverse {
            let mut x = self.node_at_rank(stop);
            while x != NIL && remaining > 0 {
                out.push(self.entry(x).clone());
                x = self.nodes[x].backward;
                remaining -= 1;
            }
        } else {
            let mut x = self.node_at_rank(start);
            while x != NIL && remaining > 0 {
                out.push(self.entry(x).clone());
                x = self.nodes[x].forward[0];
                remaining -= 1;
            }
        }
        out
    }

    fn range_by_score(&self, min: &Score, max: &Score, reverse: bool) -> Vec<Entry<M>> {
        let mut out = Vec::new();
        if reverse {
            let mut x = self.tail;
            while x != NIL && self.entry(x).score > *max {
                x = self.nodes[x].backward;
            }
            while x != NIL && self.entry(x).score >= *min {
                out.push(self.entry(x).clone());
                x = self.nodes[x].backward;
            }
        } else {
            let mut x = self.first_at_least(min);
            while x != NIL && self.entry(x).score <= *max {
                out.push(self.entry(x).clone());
                x = self.nodes[x].forward[0];
            }
        }
        out
    }

    fn count_by_score(&self, min: &Score, max: &Score) -> usize {
        let mut count = 0usize;
        let mut x = self.first_at_least(min);
        while x != NIL && self.entry(x).score <= *max {
            count += 1;
            x = self.nodes[x].forward[0];
        }
        count
    }

    fn remove_by_score(&mut self, min: &Score, max: &Score) -> usize {
        // Materialize the victims first; unlinking while walking would pull
        // the chain out from under the iteration.
        let mut victims = Vec::new();
        let mut x = self.first_at_least(min);
        while x != NIL && self.entry(x).score <= *max {
            victims.push(x);
            x = self.nodes[x].forward[0];
        }
        for id in &victims {
            self.unlink(*id);
        }
        victims.len()
    }

    fn remove_by_rank(&mut self, mut start: usize, mut stop: usize) -> usize {
        if start < 1 {
            start = 1;
        }
        if stop > self.len {
            stop = self.len;
        }
        if start > stop {
            return 0;
        }
        let mut victims = Vec::with_capacity(stop - start + 1);
        let mut x = self.node_at_rank(start);
        let mut remaining = stop - start + 1;
        while x != NIL && remaining > 0 {
            victims.push(x);
            x = self.nodes[x].forward[0];
            remaining -= 1;
        }
        for id in &victims {
            self.unlink(*id);
        }
        victims.len()
    }

    fn all(&self) -> Vec<Entry<M>> {
        let mut out = Vec::with_capacity(self.len);
        let mut x = self.nodes[0].forward[0];
        while x != NIL {
            out.push(self.entry(x).clone());
            x = self.nodes[x].forward[0];
        }
        out
    }

    fn clear(&mut self) {
        let max_level = self.max_level;
        self.nodes.clear();
        self.nodes.push(Node::head(max_level));
        self.free.clear();
        self.tail = NIL;
        self.len = 0;
        self.level = 1;
        self.index.clear();
    }

    /// Verifies every structural invariant, returning a description of the
    /// first violation found.
    fn audit(&self) -> Result<(), String> {
        // Level-0 walk: ordering, back-chain, tail, and index coherence.
        let mut position: HashMap<usize, usize> = HashMap::new();
        let mut prev = NIL;
        let mut count = 0usize;
        let mut x = self.nodes[0].forward[0];
        while x != NIL {
            count += 1;
            let node = &self.nodes[x];
            let entry = node
                .entry
                .as_ref()
                .ok_or_else(|| format!("spine node {x} has no entry"))?;
            if prev != NIL && !self.precedes_node(prev, x) {
                return Err(format!("entries out of order at position {count}"));
            }
            if node.backward != prev {
                return Err(format!("bad backward pointer at position {count}"));
            }
            if self.index.get(&entry.member) != Some(&x) {
                return Err(format!("member index does not map back to node {x}"));
            }
            position.insert(x, count);
            prev = x;
            x = node.forward[0];
        }
        if count != self.len {
            return Err(format!("len is {} but the spine holds {count}", self.len));
        }
        if self.index.len() != self.len {
            return Err(format!(
                "member index holds {} entries for {} nodes",
                self.index.len(),
                self.len
            ));
        }
        if self.tail != prev {
            return Err("tail does not point at the last spine node".to_string());
        }

        // Level occupancy.
        if self.level < 1 || self.level > self.max_level {
            return Err(format!("current level {} out of bounds", self.level));
        }
        let highest = position
            .keys()
            .map(|&id| self.nodes[id].level())
            .max()
            .unwrap_or(1);
        if highest != self.level && !(self.len == 0 && self.level == 1) {
            return Err(format!(
                "current level is {} but the tallest node has level {highest}",
                self.level
            ));
        }
        for i in self.level..self.max_level {
            if self.nodes[0].forward[i] != NIL {
                return Err(format!("head links above the current level at {i}"));
            }
        }

        // Per-level chains: spans must equal observed level-0 distances, and
        // level i must link exactly the nodes taller than i.
        for i in 0..self.level {
            let mut chain = 0usize;
            let mut at = 0usize;
            let mut pos_at = 0usize;
            loop {
                let next = self.nodes[at].forward[i];
                let span = self.nodes[at].span[i];
                if next == NIL {
                    if span != self.len - pos_at {
                        return Err(format!(
                            "span {span} at the end of level {i} should be {}",
                            self.len - pos_at
                        ));
                    }
                    break;
                }
                let pos_next = *position
                    .get(&next)
                    .ok_or_else(|| format!("level {i} links a node off the spine"))?;
                if self.nodes[next].level() <= i {
                    return Err(format!("node at position {pos_next} linked above its level"));
                }
                if span != pos_next - pos_at {
                    return Err(format!(
                        "span {span} on level {i} should be {}",
                        pos_next - pos_at
                    ));
                }
                chain += 1;
                at = next;
                pos_at = pos_next;
            }
            let tall = position
                .keys()
                .filter(|&&id| self.nodes[id].level() > i)
                .count();
            if chain != tall {
                return Err(format!(
                    "level {i} links {chain} nodes but {tall} reach that level"
                ));
            }
        }
        Ok(())
    }
}

/// A sorted set of `(member, score)` entries backed by a ranked skip list.
///
/// Members are unique; entries order by `(score, member)`. Every operation
/// takes `&self`: an internal readers–writer lock serializes mutations and
/// lets queries run concurrently. Returned scores and entries are deep
/// copies, independent of any later mutation.
///
/// Rank is 1-based throughout: the entry with the lowest `(score, member)`
/// has rank 1.
pub struct SkipList<M> {
    core: RwLock<ListCore<M>>,
}

impl<M> Default for SkipList<M>
where
    M: Ord + Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> SkipList<M>
where
    M: Ord + Hash + Eq + Clone,
{
    /// Creates an empty list with the default maximum level.
    pub fn new() -> Self {
        Self::with_max_level(DEFAULT_MAX_LEVEL)
    }

    /// Creates an empty list with a specified maximum level.
    pub fn with_max_level(max_level: usize) -> Self {
        Self::with_max_level_and_p(max_level, DEFAULT_P)
    }

    /// Creates an empty list with a specified maximum level and promotion
    /// probability.
    pub fn with_max_level_and_p(max_level: usize, p: f64) -> Self {
        assert!(max_level >= 1, "max_level must be at least 1");
        assert!((0.0..1.0).contains(&p), "p must lie in [0, 1)");
        SkipList {
            core: RwLock::new(ListCore::new(max_level, p, fastrand::Rng::new())),
        }
    }

    /// Creates an empty list whose level draws come from a seeded generator,
    /// so the tower shape is reproducible across runs.
    pub fn with_seed(seed: u64) -> Self {
        SkipList {
            core: RwLock::new(ListCore::new(
                DEFAULT_MAX_LEVEL,
                DEFAULT_P,
                fastrand::Rng::with_seed(seed),
            )),
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.core.read().len
    }

    /// Returns `true` if the list holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `(member, score)`.
    ///
    /// If the member is already present with an equal score this is a no-op;
    /// with a different score the old entry is replaced and the member's rank
    /// follows the new score.
    pub fn insert(&self, member: M, score: Score) {
        self.core.write().insert(member, score);
    }

    /// Removes the member, but only if its stored score equals `score`.
    /// Returns whether an entry was removed.
    pub fn remove<Q>(&self, member: &Q, score: &Score) -> bool
    where
        M: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut core = self.core.write();
        let id = match core.index.get(member) {
            Some(&id) => id,
            None => return false,
        };
        if core.entry(id).score != *score {
            return false;
        }
        core.unlink(id);
        true
    }

    /// Removes the member regardless of its score. Returns whether an entry
    /// was removed.
    pub fn remove_member<Q>(&self, member: &Q) -> bool
    where
        M: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut core = self.core.write();
        match core.index.get(member).copied() {
            Some(id) => {
                core.unlink(id);
                true
            }
            None => false,
        }
    }

    /// Returns a copy of the member's score, in O(1).
    pub fn score<Q>(&self, member: &Q) -> Option<Score>
    where
        M: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let core = self.core.read();
        let &id = core.index.get(member)?;
        Some(core.entry(id).score.clone())
    }

    /// Returns the 1-based rank of `(member, score)`.
    ///
    /// The score is part of the search key: if it disagrees with the stored
    /// score the member will not be found. Callers that only know the member
    /// should fetch the score first via [`SkipList::score`].
    pub fn rank<Q>(&self, member: &Q, score: &Score) -> Option<usize>
    where
        M: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self.core.read().rank_of(member, score) {
            0 => None,
            rank => Some(rank),
        }
    }

    /// Returns the entry at 1-based `rank`.
    pub fn at_rank(&self, rank: usize) -> Option<Entry<M>> {
        let core = self.core.read();
        match core.node_at_rank(rank) {
            NIL => None,
            id => Some(core.entry(id).clone()),
        }
    }

    /// Returns `true` if `(member, score)` exists and its rank lies within
    /// `[start, stop]` (1-based, inclusive).
    pub fn in_rank_range<Q>(&self, member: &Q, score: &Score, start: usize, stop: usize) -> bool
    where
        M: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self.core.read().rank_of(member, score) {
            0 => false,
            rank => rank >= start && rank <= stop,
        }
    }

    /// Returns the entries with ranks in `[start, stop]` (1-based,
    /// inclusive). `start` is clamped up to 1 and `stop` down to the length;
    /// an inverted range after clamping is empty.
    ///
    /// Forward walks emit ascending entry order; with `reverse` the same
    /// ranks emit in descending order.
    pub fn range(&self, start: usize, stop: usize, reverse: bool) -> Vec<Entry<M>> {
        self.core.read().range(start, stop, reverse)
    }

    /// Returns the entries whose scores lie in `[min, max]`, both endpoints
    /// inclusive, in ascending order (descending with `reverse`). Empty when
    /// `min > max`.
    pub fn range_by_score(&self, min: &Score, max: &Score, reverse: bool) -> Vec<Entry<M>> {
        self.core.read().range_by_score(min, max, reverse)
    }

    /// Counts the entries whose scores lie in `[min, max]`.
    pub fn count_by_score(&self, min: &Score, max: &Score) -> usize {
        self.core.read().count_by_score(min, max)
    }

    /// Removes every entry whose score lies in `[min, max]`. Returns the
    /// number removed.
    pub fn remove_by_score(&self, min: &Score, max: &Score) -> usize {
        self.core.write().remove_by_score(min, max)
    }

    /// Removes the entries with ranks in `[start, stop]` (1-based, inclusive,
    /// clamped like [`SkipList::range`]). Returns the number removed.
    pub fn remove_by_rank(&self, start: usize, stop: usize) -> usize {
        self.core.write().remove_by_rank(start, stop)
    }

    /// Adds `delta` to the member's score, inserting the member at `delta`
    /// if absent, and returns the resulting score.
    ///
    /// The read-modify-write happens under one exclusive-lock acquisition,
    /// so no intermediate state is observable.
    pub fn increment(&self, member: M, delta: &Score) -> Score {
        let mut core = self.core.write();
        let new_score = match core.index.get(&member) {
            Some(&id) => &core.entry(id).score + delta,
            None => delta.clone(),
        };
        core.insert(member, new_score.clone());
        new_score
    }

    /// Returns the entry ordered immediately before the member, or `None` if
    /// the member is unknown or first.
    pub fn prev<Q>(&self, member: &Q) -> Option<Entry<M>>
    where
        M: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let core = self.core.read();
        let &id = core.index.get(member)?;
        match core.nodes[id].backward {
            NIL => None,
            prev => Some(core.entry(prev).clone()),
        }
    }

    /// Returns the entry ordered immediately after the member, or `None` if
    /// the member is unknown or last.
    pub fn next<Q>(&self, member: &Q) -> Option<Entry<M>>
    where
        M: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let core = self.core.read();
        let &id = core.index.get(member)?;
        match core.nodes[id].forward[0] {
            NIL => None,
            next => Some(core.entry(next).clone()),
        }
    }

    /// Removes and returns the `count` lowest-scored entries, in ascending
    /// order. The read and the removal happen under one exclusive-lock
    /// acquisition.
    pub fn pop_min(&self, count: usize) -> Vec<Entry<M>> {
        let mut core = self.core.write();
        let count = count.min(core.len);
        if count == 0 {
            return Vec::new();
        }
        let out = core.range(1, count, false);
        core.remove_by_rank(1, count);
        out
    }

    /// Removes and returns the `count` highest-scored entries, in descending
    /// order, atomically like [`SkipList::pop_min`].
    pub fn pop_max(&self, count: usize) -> Vec<Entry<M>> {
        let mut core = self.core.write();
        let count = count.min(core.len);
        if count == 0 {
            return Vec::new();
        }
        let start = core.len - count + 1;
        let stop = core.len;
        let out = core.range(start, stop, true);
        core.remove_by_rank(start, stop);
        out
    }

    /// Returns every entry in ascending order.
    pub fn all(&self) -> Vec<Entry<M>> {
        self.core.read().all()
    }

    /// Removes every entry and resets the tower to a single level.
    pub fn clear(&self) {
        self.core.write().clear();
    }

    /// Walks the whole structure and checks every internal invariant: spine
    /// ordering, span arithmetic on every level, back-chain, tail, level
    /// occupancy, and member-index coherence. Returns a description of the
    /// first violation. Intended for tests and debugging; O(N · max level).
    pub fn audit(&self) -> Result<(), String> {
        self.core.read().audit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: i64) -> Score {
        Score::from(v)
    }

    fn list_of(pairs: &[(&'static str, i64)]) -> SkipList<&'static str> {
        let list = SkipList::new();
        for &(m, v) in pairs {
            list.insert(m, s(v));
        }
        list
    }

    #[test]
    fn test_new_skip_list() {
        let list: SkipList<&str> = SkipList::new();
        assert_eq!(list.len(), 0);
        assert!(list.is_empty());
        list.audit().unwrap();
    }

    #[test]
    fn test_insert_and_rank() {
        let list = list_of(&[("a", 10), ("b", 20), ("c", 30)]);
        assert_eq!(list.rank(&"a", &s(10)), Some(1));
        assert_eq!(list.rank(&"b", &s(20)), Some(2));
        assert_eq!(list.rank(&"c", &s(30)), Some(3));
        let all = list.all();
        assert_eq!(
            all.iter().map(|e| e.member).collect::<Vec<_>>(),
            ["a", "b", "c"]
        );
        assert_eq!(all[0].score, s(10));
        list.audit().unwrap();
    }

    #[test]
    fn test_rank_with_stale_score_misses() {
        let list = list_of(&[("a", 10)]);
        assert_eq!(list.rank(&"a", &s(11)), None);
    }

    #[test]
    fn test_insert_order_independent_of_arrival() {
        let list = list_of(&[("c", 30), ("a", 10), ("b", 20)]);
        let members: Vec<_> = list.all().into_iter().map(|e| e.member).collect();
        assert_eq!(members, ["a", "b", "c"]);
    }

    #[test]
    fn test_score_ties_break_on_member() {
        let list = list_of(&[("z", 5), ("x", 5), ("y", 5)]);
        assert_eq!(list.rank(&"x", &s(5)), Some(1));
        assert_eq!(list.rank(&"y", &s(5)), Some(2));
        assert_eq!(list.rank(&"z", &s(5)), Some(3));
        list.audit().unwrap();
    }

    #[test]
    fn test_reinsert_same_score_is_noop() {
        let list = list_of(&[("a", 10), ("b", 20)]);
        list.insert("a", s(10));
        assert_eq!(list.len(), 2);
        assert_eq!(list.rank(&"a", &s(10)), Some(1));
        list.audit().unwrap();
    }

    #[test]
    fn test_update_score_moves_member() {
        let list = list_of(&[("a", 10), ("b", 20), ("c", 30)]);
        list.insert("a", s(25));
        assert_eq!(list.len(), 3);
        assert_eq!(list.score(&"a"), Some(s(25)));
        assert_eq!(list.rank(&"a", &s(25)), Some(2));
        assert_eq!(list.rank(&"a", &s(10)), None);
        list.audit().unwrap();
    }

    #[test]
    fn test_remove_checks_score() {
        let list = list_of(&[("a", 10), ("b", 20)]);
        assert!(!list.remove(&"a", &s(99)));
        assert_eq!(list.len(), 2);
        assert!(list.remove(&"a", &s(10)));
        assert_eq!(list.len(), 1);
        assert!(!list.remove(&"missing", &s(10)));
        list.audit().unwrap();
    }

    #[test]
    fn test_remove_member_ignores_score() {
        let list = list_of(&[("a", 10), ("b", 20), ("c", 30)]);
        assert!(list.remove_member(&"b"));
        assert!(!list.remove_member(&"b"));
        assert_eq!(list.len(), 2);
        assert_eq!(list.at_rank(2).unwrap().member, "c");
        assert_eq!(list.rank(&"c", &s(30)), Some(2));
        list.audit().unwrap();
    }

    #[test]
    fn test_at_rank_bounds() {
        let list = list_of(&[("a", 10), ("b", 20)]);
        assert!(list.at_rank(0).is_none());
        assert!(list.at_rank(3).is_none());
        assert_eq!(list.at_rank(1).unwrap().member, "a");
        assert_eq!(list.at_rank(2).unwrap().member, "b");
    }

    #[test]
    fn test_range_forward_and_reverse() {
        let list = list_of(&[("a", 10), ("b", 20), ("c", 30), ("d", 40)]);
        let fwd = list.range(2, 3, false);
        assert_eq!(
            fwd.iter().map(|e| e.member).collect::<Vec<_>>(),
            ["b", "c"]
        );
        let rev = list.range(2, 3, true);
        assert_eq!(
            rev.iter().map(|e| e.member).collect::<Vec<_>>(),
            ["c", "b"]
        );
    }

    #[test]
    fn test_range_clamps() {
        let list = list_of(&[("a", 10), ("b", 20)]);
        assert_eq!(list.range(0, 99, false).len(), 2);
        assert!(list.range(5, 9, false).is_empty());
        assert!(list.range(2, 1, false).is_empty());
    }

    #[test]
    fn test_range_by_score() {
        let list = list_of(&[("a", 10), ("b", 20), ("c", 30), ("d", 40)]);
        let mid = list.range_by_score(&s(15), &s(35), false);
        assert_eq!(
            mid.iter().map(|e| e.member).collect::<Vec<_>>(),
            ["b", "c"]
        );
        let rev = list.range_by_score(&s(15), &s(35), true);
        assert_eq!(
            rev.iter().map(|e| e.member).collect::<Vec<_>>(),
            ["c", "b"]
        );
        assert!(list.range_by_score(&s(50), &s(40), false).is_empty());
        // Endpoints are inclusive.
        assert_eq!(list.range_by_score(&s(10), &s(10), false).len(), 1);
    }

    #[test]
    fn test_count_by_score() {
        let list = list_of(&[("a", 10), ("b", 20), ("c", 30)]);
        assert_eq!(list.count_by_score(&s(10), &s(30)), 3);
        assert_eq!(list.count_by_score(&s(15), &s(25)), 1);
        assert_eq!(list.count_by_score(&s(31), &s(99)), 0);
    }

    #[test]
    fn test_remove_by_score() {
        let list = list_of(&[("a", 10), ("b", 20), ("c", 30), ("d", 40)]);
        assert_eq!(list.remove_by_score(&s(15), &s(35)), 2);
        let members: Vec<_> = list.all().into_iter().map(|e| e.member).collect();
        assert_eq!(members, ["a", "d"]);
        list.audit().unwrap();
    }

    #[test]
    fn test_remove_by_rank() {
        let list = list_of(&[("a", 10), ("b", 20), ("c", 30), ("d", 40)]);
        assert_eq!(list.remove_by_rank(2, 3), 2);
        let members: Vec<_> = list.all().into_iter().map(|e| e.member).collect();
        assert_eq!(members, ["a", "d"]);
        assert_eq!(list.rank(&"d", &s(40)), Some(2));
        list.audit().unwrap();
    }

    #[test]
    fn test_increment() {
        let list: SkipList<&str> = SkipList::new();
        list.insert("a", s(100));
        let bumped = list.increment("a", &s(50));
        assert_eq!(bumped, s(150));
        assert_eq!(list.score(&"a"), Some(s(150)));
        assert_eq!(list.rank(&"a", &s(150)), Some(1));
        // Incrementing an absent member starts it from the delta.
        assert_eq!(list.increment("fresh", &s(7)), s(7));
        assert_eq!(list.len(), 2);
        list.audit().unwrap();
    }

    #[test]
    fn test_prev_and_next() {
        let list = list_of(&[("a", 10), ("b", 20), ("c", 30)]);
        assert!(list.prev(&"a").is_none());
        assert_eq!(list.prev(&"b").unwrap().member, "a");
        assert_eq!(list.next(&"b").unwrap().member, "c");
        assert!(list.next(&"c").is_none());
        assert!(list.prev(&"missing").is_none());
    }

    #[test]
    fn test_pop_min_and_max() {
        let list = list_of(&[("a", 10), ("b", 20), ("c", 30), ("d", 40)]);
        let low = list.pop_min(2);
        assert_eq!(
            low.iter().map(|e| e.member).collect::<Vec<_>>(),
            ["a", "b"]
        );
        let high = list.pop_max(1);
        assert_eq!(high[0].member, "d");
        assert_eq!(list.len(), 1);
        assert!(list.pop_min(0).is_empty());
        // Popping more than remain drains the list without complaint.
        assert_eq!(list.pop_max(10).len(), 1);
        assert!(list.is_empty());
        list.audit().unwrap();
    }

    #[test]
    fn test_in_rank_range() {
        let list = list_of(&[("a", 10), ("b", 20), ("c", 30)]);
        assert!(list.in_rank_range(&"b", &s(20), 1, 3));
        assert!(list.in_rank_range(&"b", &s(20), 2, 2));
        assert!(!list.in_rank_range(&"b", &s(20), 3, 5));
        assert!(!list.in_rank_range(&"b", &s(99), 1, 3));
        assert!(!list.in_rank_range(&"nope", &s(20), 1, 3));
    }

    #[test]
    fn test_clear() {
        let list = list_of(&[("a", 10), ("b", 20)]);
        list.clear();
        assert!(list.is_empty());
        assert!(list.all().is_empty());
        assert!(list.at_rank(1).is_none());
        list.audit().unwrap();
        list.insert("z", s(1));
        assert_eq!(list.len(), 1);
        list.audit().unwrap();
    }

    #[test]
    fn test_high_precision_scores_round_trip() {
        let list: SkipList<&str> = SkipList::new();
        let big: Score = "12345678901234567890.12345678901234567890".parse().unwrap();
        let slightly_more: Score = "12345678901234567890.12345678901234567891".parse().unwrap();
        list.insert("m", big.clone());
        list.insert("n", slightly_more.clone());
        assert_eq!(list.score(&"m"), Some(big));
        // A double would collapse these two, but rationals keep them apart.
        assert_eq!(list.rank(&"m", &list.score(&"m").unwrap()), Some(1));
        assert_eq!(list.rank(&"n", &slightly_more), Some(2));
    }

    #[test]
    fn test_seeded_lists_agree() {
        let a: SkipList<String> = SkipList::with_seed(7);
        let b: SkipList<String> = SkipList::with_seed(7);
        for i in 0..200 {
            a.insert(format!("m{i}"), s(i * 3 % 101));
            b.insert(format!("m{i}"), s(i * 3 % 101));
        }
        a.audit().unwrap();
        b.audit().unwrap();
        assert_eq!(a.all(), b.all());
    }

    #[test]
    fn test_audit_through_level_collapse() {
        // Drive the tower up with many inserts, then force collapses by
        // deleting from the top of the order.
        let list: SkipList<String> = SkipList::with_seed(42);
        for i in 0..512 {
            list.insert(format!("m{i:04}"), s(i));
        }
        list.audit().unwrap();
        for i in (0..512).rev() {
            assert!(list.remove_member(format!("m{i:04}").as_str()));
            if i % 64 == 0 {
                list.audit().unwrap();
            }
        }
        assert!(list.is_empty());
        list.audit().unwrap();
    }
}
