//! Merge-base computation via the paint algorithm.
//!
//! Commits reachable from each input are painted with a color flag,
//! walking newest-first. A commit painted both colors is a common
//! ancestor; redundant ancestors (those reachable from another candidate)
//! are dropped, leaving the best common ancestor(s).

use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use grit_hash::ObjectId;
use grit_odb::ObjectStore;

use crate::{load_commit, RevWalkError};

const PARENT1: u8 = 1;
const PARENT2: u8 = 2;
const STALE: u8 = 4;

struct PaintEntry {
    date: i64,
    oid: ObjectId,
}

impl PartialEq for PaintEntry {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid && self.date == other.date
    }
}
impl Eq for PaintEntry {}
impl PartialOrd for PaintEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PaintEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap by committer date, hash as the deterministic tiebreak.
        self.date
            .cmp(&other.date)
            .then_with(|| self.oid.cmp(&other.oid))
    }
}

/// The best common ancestor(s) of two commits.
///
/// Returns one hash in the common case; a criss-cross history can have
/// several. Identical inputs are their own merge base.
pub fn merge_base(
    store: &dyn ObjectStore,
    a: &ObjectId,
    b: &ObjectId,
) -> Result<Vec<ObjectId>, RevWalkError> {
    if a == b {
        return Ok(vec![*a]);
    }
    let candidates = paint_down_to_common(store, a, b)?;
    remove_redundant(store, candidates)
}

/// Is `ancestor` reachable from `descendant` (or equal to it)?
pub fn is_ancestor(
    store: &dyn ObjectStore,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> Result<bool, RevWalkError> {
    if ancestor == descendant {
        return Ok(true);
    }
    reachable_from(store, descendant, ancestor)
}

fn paint_down_to_common(
    store: &dyn ObjectStore,
    a: &ObjectId,
    b: &ObjectId,
) -> Result<Vec<ObjectId>, RevWalkError> {
    let mut flags: HashMap<ObjectId, u8> = HashMap::new();
    let mut queue: BinaryHeap<PaintEntry> = BinaryHeap::new();
    let mut results: Vec<ObjectId> = Vec::new();

    let commit_a = load_commit(store, a)?;
    let commit_b = load_commit(store, b)?;
    flags.insert(*a, PARENT1);
    flags.insert(*b, PARENT2);
    queue.push(PaintEntry {
        date: commit_a.committer.date.timestamp,
        oid: *a,
    });
    queue.push(PaintEntry {
        date: commit_b.committer.date.timestamp,
        oid: *b,
    });

    while let Some(entry) = queue.pop() {
        let current = *flags.get(&entry.oid).unwrap_or(&0);
        if current & STALE != 0 {
            continue;
        }

        if current & (PARENT1 | PARENT2) == (PARENT1 | PARENT2) {
            // Painted both colors: a common ancestor. Its own ancestry is
            // stale — anything below it cannot be a *best* ancestor.
            flags.insert(entry.oid, current | STALE);
            results.push(entry.oid);

            let commit = load_commit(store, &entry.oid)?;
            for parent in &commit.parents {
                let parent_flags = flags.entry(*parent).or_insert(0);
                *parent_flags |= current | STALE;
            }
            continue;
        }

        let commit = load_commit(store, &entry.oid)?;
        for parent in &commit.parents {
            let parent_flags = flags.entry(*parent).or_insert(0);
            let merged = *parent_flags | current;
            if merged != *parent_flags {
                *parent_flags = merged;
                let parent_commit = load_commit(store, parent)?;
                queue.push(PaintEntry {
                    date: parent_commit.committer.date.timestamp,
                    oid: *parent,
                });
            }
        }
    }

    Ok(results)
}

/// Drop candidates that are ancestors of another candidate.
fn remove_redundant(
    store: &dyn ObjectStore,
    candidates: Vec<ObjectId>,
) -> Result<Vec<ObjectId>, RevWalkError> {
    if candidates.len() <= 1 {
        return Ok(candidates);
    }

    let mut dropped: HashSet<usize> = HashSet::new();
    for i in 0..candidates.len() {
        if dropped.contains(&i) {
            continue;
        }
        for j in 0..candidates.len() {
            if i == j || dropped.contains(&j) {
                continue;
            }
            if reachable_from(store, &candidates[j], &candidates[i])? {
                dropped.insert(i);
                break;
            }
        }
    }

    Ok(candidates
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !dropped.contains(i))
        .map(|(_, oid)| oid)
        .collect())
}

/// BFS reachability: is `target` an ancestor of `from`?
fn reachable_from(
    store: &dyn ObjectStore,
    from: &ObjectId,
    target: &ObjectId,
) -> Result<bool, RevWalkError> {
    let mut queue = VecDeque::from([*from]);
    let mut visited = HashSet::from([*from]);

    while let Some(current) = queue.pop_front() {
        let commit = load_commit(store, &current)?;
        for parent in &commit.parents {
            if parent == target {
                return Ok(true);
            }
            if visited.insert(*parent) {
                queue.push_back(*parent);
            }
        }
    }
    Ok(false)
}
