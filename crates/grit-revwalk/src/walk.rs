//! Commit walkers: pre-order, post-order, BFS-filtered, committer-time.

use std::collections::{BinaryHeap, HashSet, VecDeque};

use grit_hash::ObjectId;
use grit_object::Commit;
use grit_odb::ObjectStore;

use crate::{load_commit, RevWalkError};

/// Depth-first walk yielding each commit before its parents.
///
/// Already-seen hashes are skipped, so a diamond yields each commit once.
/// Hashes in the ignore set (and everything only reachable through them)
/// are never yielded.
pub struct PreOrderWalk<'a> {
    store: &'a dyn ObjectStore,
    stack: Vec<ObjectId>,
    seen: HashSet<ObjectId>,
}

impl<'a> PreOrderWalk<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        starts: impl IntoIterator<Item = ObjectId>,
        ignore: impl IntoIterator<Item = ObjectId>,
    ) -> Self {
        let seen: HashSet<ObjectId> = ignore.into_iter().collect();
        let mut stack: Vec<ObjectId> = starts.into_iter().collect();
        // Pop order should match push order for the heads.
        stack.reverse();
        Self { store, stack, seen }
    }
}

impl Iterator for PreOrderWalk<'_> {
    type Item = Result<(ObjectId, Commit), RevWalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let oid = self.stack.pop()?;
            if !self.seen.insert(oid) {
                continue;
            }
            let commit = match load_commit(self.store, &oid) {
                Ok(commit) => commit,
                Err(e) => return Some(Err(e)),
            };
            // First parent is visited first.
            for parent in commit.parents.iter().rev() {
                if !self.seen.contains(parent) {
                    self.stack.push(*parent);
                }
            }
            return Some(Ok((oid, commit)));
        }
    }
}

/// Depth-first walk yielding each commit only after all its parents.
pub struct PostOrderWalk<'a> {
    store: &'a dyn ObjectStore,
    starts: VecDeque<ObjectId>,
    stack: Vec<Frame>,
    seen: HashSet<ObjectId>,
}

struct Frame {
    oid: ObjectId,
    commit: Commit,
    next_parent: usize,
}

impl<'a> PostOrderWalk<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        starts: impl IntoIterator<Item = ObjectId>,
    ) -> Self {
        Self {
            store,
            starts: starts.into_iter().collect(),
            stack: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn push_frame(&mut self, oid: ObjectId) -> Result<(), RevWalkError> {
        let commit = load_commit(self.store, &oid)?;
        self.stack.push(Frame {
            oid,
            commit,
            next_parent: 0,
        });
        Ok(())
    }
}

impl Iterator for PostOrderWalk<'_> {
    type Item = Result<(ObjectId, Commit), RevWalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.stack.is_empty() {
                let start = loop {
                    let candidate = self.starts.pop_front()?;
                    if self.seen.insert(candidate) {
                        break candidate;
                    }
                };
                if let Err(e) = self.push_frame(start) {
                    return Some(Err(e));
                }
            }

            let top = self.stack.last_mut().expect("stack not empty");
            if top.next_parent < top.commit.parents.len() {
                let parent = top.commit.parents[top.next_parent];
                top.next_parent += 1;
                if self.seen.insert(parent) {
                    if let Err(e) = self.push_frame(parent) {
                        return Some(Err(e));
                    }
                }
                continue;
            }

            let frame = self.stack.pop().expect("stack not empty");
            return Some(Ok((frame.oid, frame.commit)));
        }
    }
}

/// Breadth-first walk with a validity filter and a descent limit.
///
/// Commits for which `is_valid` holds are yielded; parents of commits for
/// which `is_limit` holds are not visited.
pub struct BfsFilterWalk<'a> {
    store: &'a dyn ObjectStore,
    queue: VecDeque<ObjectId>,
    seen: HashSet<ObjectId>,
    is_valid: Box<dyn Fn(&ObjectId, &Commit) -> bool + 'a>,
    is_limit: Box<dyn Fn(&ObjectId, &Commit) -> bool + 'a>,
}

impl<'a> BfsFilterWalk<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        start: ObjectId,
        is_valid: impl Fn(&ObjectId, &Commit) -> bool + 'a,
        is_limit: impl Fn(&ObjectId, &Commit) -> bool + 'a,
    ) -> Self {
        let mut seen = HashSet::new();
        seen.insert(start);
        Self {
            store,
            queue: VecDeque::from([start]),
            seen,
            is_valid: Box::new(is_valid),
            is_limit: Box::new(is_limit),
        }
    }
}

impl Iterator for BfsFilterWalk<'_> {
    type Item = Result<(ObjectId, Commit), RevWalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let oid = self.queue.pop_front()?;
            let commit = match load_commit(self.store, &oid) {
                Ok(commit) => commit,
                Err(e) => return Some(Err(e)),
            };

            if !(self.is_limit)(&oid, &commit) {
                for parent in &commit.parents {
                    if self.seen.insert(*parent) {
                        self.queue.push_back(*parent);
                    }
                }
            }

            if (self.is_valid)(&oid, &commit) {
                return Some(Ok((oid, commit)));
            }
        }
    }
}

/// Walk yielding the newest (by committer time) reachable commit first.
///
/// Equal timestamps are broken by hash, so the order is deterministic.
pub struct CommitTimeWalk<'a> {
    store: &'a dyn ObjectStore,
    heap: BinaryHeap<TimeEntry>,
    seen: HashSet<ObjectId>,
}

struct TimeEntry {
    time: i64,
    oid: ObjectId,
}

impl PartialEq for TimeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.oid == other.oid
    }
}
impl Eq for TimeEntry {}
impl PartialOrd for TimeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.oid.cmp(&other.oid))
    }
}

impl<'a> CommitTimeWalk<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        starts: impl IntoIterator<Item = ObjectId>,
    ) -> Result<Self, RevWalkError> {
        let mut walk = Self {
            store,
            heap: BinaryHeap::new(),
            seen: HashSet::new(),
        };
        for start in starts {
            walk.push(start)?;
        }
        Ok(walk)
    }

    fn push(&mut self, oid: ObjectId) -> Result<(), RevWalkError> {
        if self.seen.insert(oid) {
            let commit = load_commit(self.store, &oid)?;
            self.heap.push(TimeEntry {
                time: commit.committer.date.timestamp,
                oid,
            });
        }
        Ok(())
    }
}

impl Iterator for CommitTimeWalk<'_> {
    type Item = Result<(ObjectId, Commit), RevWalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.heap.pop()?;
        let commit = match load_commit(self.store, &entry.oid) {
            Ok(commit) => commit,
            Err(e) => return Some(Err(e)),
        };
        for parent in commit.parents.clone() {
            if let Err(e) = self.push(parent) {
                return Some(Err(e));
            }
        }
        Some(Ok((entry.oid, commit)))
    }
}
