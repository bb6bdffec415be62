//! Batch-parallel augmented skip list.
//!
//! Every element holds a value, and `values[i]` for `i > 0` caches the sum of
//! `values[i - 1]` over the run of level `i - 1` elements that starts at the
//! element and stops before the next element taller than `i`. The sums are kept
//! up to date by the batch operations, so `get_sum` only walks the top level.
//!
//! With the default value of 1 per element, `get_sum` is the length of the list.

use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering::Relaxed, Ordering::SeqCst};
use std::sync::Arc;

use derivative::Derivative;
use rayon::prelude::*;

use super::{Idx, Links, SkipList, EMPTY};
use crate::array_allocator::ArrayAllocator;
use crate::random::Random;

/// Marker value of an element that needs no update.
const CLEAR: usize = usize::MAX;
/// Below this level the top-down pass does not spawn tasks.
const SEQUENTIAL_LEVELS: usize = 6;

fn values_fmt(values: &[AtomicI32], f: &mut Formatter) -> std::fmt::Result {
    f.debug_list()
        .entries(values.iter().map(|v| v.load(Relaxed)))
        .finish()
}

fn level_fmt(level: &AtomicUsize, f: &mut Formatter) -> std::fmt::Result {
    match level.load(Relaxed) {
        CLEAR => write!(f, "-"),
        l => write!(f, "{l}"),
    }
}

/// Payload of an augmented element.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Augmented<P = ()> {
    #[derivative(Debug(format_with = "values_fmt"))]
    values: Box<[AtomicI32]>,
    /// Lowest level whose value must be recomputed, or CLEAR. Only set during a
    /// batch operation.
    #[derivative(Debug(format_with = "level_fmt"))]
    update_level: AtomicUsize,
    inner: P,
}

impl<P> Augmented<P> {
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

pub struct AugmentedSkipList<P = ()> {
    list: SkipList<Augmented<P>>,
    values_alloc: Arc<ArrayAllocator<AtomicI32>>,
}

impl<P: Debug> Debug for AugmentedSkipList<P> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        self.list.fmt(f)
    }
}

impl AugmentedSkipList<()> {
    /// `len` singleton elements, each with value 1.
    pub fn new(len: usize) -> Self {
        Self::with_seed(len, 0)
    }
    pub fn with_seed(len: usize, seed: u64) -> Self {
        Self::with_payload(
            len,
            Random::new(seed),
            Default::default(),
            Default::default(),
            |_| (1, ()),
        )
    }
}

impl<P> AugmentedSkipList<P> {
    /// Builds `len` singleton elements; `init(i)` gives element `i`'s value and
    /// payload.
    pub fn with_payload(
        len: usize,
        randomness: Random,
        links_alloc: Arc<ArrayAllocator<Links>>,
        values_alloc: Arc<ArrayAllocator<AtomicI32>>,
        init: impl Fn(Idx) -> (i32, P) + Sync,
    ) -> Self
    where
        P: Send,
    {
        let list = SkipList::with_payload(len, randomness, links_alloc, |i, height| {
            let (value, inner) = init(i);
            let values = values_alloc
                .allocate(height)
                .unwrap_or_else(|e| panic!("height {height} out of range: {e}"));
            for v in &values[..height] {
                v.store(value, Relaxed);
            }
            Augmented {
                values,
                update_level: AtomicUsize::new(CLEAR),
                inner,
            }
        });
        Self { list, values_alloc }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
    pub fn height(&self, u: Idx) -> usize {
        self.list.height(u)
    }
    pub fn inner(&self, u: Idx) -> &P {
        &self.list.payload(u).inner
    }
    pub fn prev(&self, u: Idx) -> Idx {
        self.list.prev(u)
    }
    pub fn next(&self, u: Idx) -> Idx {
        self.list.next(u)
    }
    pub fn find_representative(&self, u: Idx) -> Idx {
        self.list.find_representative(u)
    }
    pub fn on_same_list(&self, u: Idx, v: Idx) -> bool {
        self.list.on_same_list(u, v)
    }
    pub fn sequence(&self, u: Idx) -> Vec<Idx> {
        self.list.sequence(u)
    }
    /// Own value of `u`.
    pub fn value(&self, u: Idx) -> i32 {
        self.value_at(u, 0)
    }

    fn value_at(&self, u: Idx, level: usize) -> i32 {
        self.list.payload(u).values[level].load(Relaxed)
    }
    fn set_value_at(&self, u: Idx, level: usize, value: i32) {
        self.list.payload(u).values[level].store(value, Relaxed);
    }
    fn update_level(&self, u: Idx) -> &AtomicUsize {
        &self.list.payload(u).update_level
    }
    fn needs_update(&self, u: Idx, level: usize) -> bool {
        let l = self.update_level(u).load(SeqCst);
        l != CLEAR && l < level
    }

    /// Turns an unreachable element back into a singleton holding `value`.
    pub(crate) fn reset(&self, u: Idx, value: i32) {
        self.list.reset(u);
        for level in 0..self.height(u) {
            self.set_value_at(u, level, value);
        }
        self.update_level(u).store(CLEAR, SeqCst);
    }

    /// Sum of the values of the whole sequence containing `u`.
    pub fn get_sum(&self, u: Idx) -> i32 {
        // The representative reaches the top level; on an acyclic list it is the
        // leftmost top-level element.
        let root = self.list.find_representative(u);
        let top = self.height(root) - 1;
        let mut sum = self.value_at(root, top);
        let mut cur = self.list.next_at(root, top);
        while cur != EMPTY && cur != root {
            sum += self.value_at(cur, top);
            cur = self.list.next_at(cur, top);
        }
        if cur == EMPTY {
            // Not a cycle: also add everything left of the root.
            cur = root;
            let mut levels = top + 1;
            while levels > 0 {
                let level = levels - 1;
                if self.list.prev_at(cur, level) == EMPTY {
                    levels -= 1;
                    continue;
                }
                while self.list.prev_at(cur, level) != EMPTY {
                    cur = self.list.prev_at(cur, level);
                    sum += self.value_at(cur, level);
                }
            }
        }
        sum
    }

    /// Sum of the values from `left` to `right` inclusive. `left` must precede
    /// `right` in the same sequence.
    pub fn get_subsequence_sum(&self, mut left: Idx, mut right: Idx) -> i32 {
        let mut sum = self.value_at(right, 0);
        while left != right {
            let level = self.height(left).min(self.height(right)) - 1;
            if level == self.height(left) - 1 {
                sum += self.value_at(left, level);
                left = self.list.next_at(left, level);
            } else {
                right = self.list.prev_at(right, level);
                sum += self.value_at(right, level);
            }
        }
        sum
    }

    /// Joins every `(left, right)` pair as `SkipList::join` does, in parallel,
    /// then repairs the sums. Lefts must be pairwise distinct, as must rights.
    pub fn batch_join(&self, joins: &[(Idx, Idx)])
    where
        P: Sync,
    {
        joins
            .par_iter()
            .for_each(|&(left, right)| self.list.join(left, right));
        let lefts: Vec<Idx> = joins.par_iter().map(|&(left, _)| left).collect();
        self.update_ancestors(&lefts);
    }

    pub fn join(&self, left: Idx, right: Idx)
    where
        P: Sync,
    {
        self.batch_join(&[(left, right)]);
    }

    /// Splits after every given element in parallel. Duplicates are allowed.
    /// Returns the former successors in input order (`EMPTY` where there was none
    /// or where a duplicate split won).
    pub fn batch_split(&self, splits: &[Idx]) -> Vec<Idx>
    where
        P: Sync,
    {
        let successors: Vec<Idx> = splits.par_iter().map(|&u| self.list.split(u)).collect();
        splits.par_iter().for_each(|&u| {
            // Of several splits at the same element, only one walks up.
            if self
                .update_level(u)
                .compare_exchange(CLEAR, 0, SeqCst, SeqCst)
                .is_ok()
            {
                self.update_split_ancestors(u);
            }
        });
        splits
            .par_iter()
            .for_each(|&u| self.update_level(u).store(CLEAR, SeqCst));
        successors
    }

    pub fn split(&self, u: Idx) -> Idx
    where
        P: Sync,
    {
        self.batch_split(&[u])[0]
    }

    /// `u` is now last in its list: every ancestor's run ends at `u`, so one walk
    /// left and up recomputes them all.
    fn update_split_ancestors(&self, mut cur: Idx) {
        let mut sum = self.value_at(cur, 0);
        let mut level = 0;
        loop {
            if level + 1 < self.height(cur) {
                level += 1;
                self.set_value_at(cur, level, sum);
            } else {
                cur = self.list.prev_at(cur, level);
                if cur == EMPTY {
                    break;
                }
                sum += self.value_at(cur, level);
            }
        }
    }

    /// Assigns new own values and repairs the sums above them.
    pub fn batch_update(&self, updates: &[(Idx, i32)])
    where
        P: Sync,
    {
        updates
            .par_iter()
            .for_each(|&(u, value)| self.set_value_at(u, 0, value));
        let elements: Vec<Idx> = updates.par_iter().map(|&(u, _)| u).collect();
        self.update_ancestors(&elements);
    }

    /// Recomputes the sums of every ancestor of `elements`. Ancestors shared by
    /// several elements are claimed by the first walker that reaches them, so
    /// each one is recomputed exactly once, top-down from the unclaimed roots.
    fn update_ancestors(&self, elements: &[Idx])
    where
        P: Sync,
    {
        let tops: Vec<Idx> = elements
            .par_iter()
            .map(|&u| self.claim_ancestors(u))
            .collect();
        tops.par_iter()
            .filter(|&&t| t != EMPTY)
            .for_each(|&t| self.update_top_down(t, self.height(t) - 1));
    }

    /// Marks ancestors of `cur` until reaching one with no left parent (returned)
    /// or one already claimed by another walker (`EMPTY` is returned).
    fn claim_ancestors(&self, mut cur: Idx) -> Idx {
        let mut level = 0;
        loop {
            match self
                .update_level(cur)
                .compare_exchange(CLEAR, level, SeqCst, SeqCst)
            {
                Ok(_) => {
                    level = self.height(cur) - 1;
                    let parent = self.list.find_left_parent(cur, level);
                    if parent == EMPTY {
                        return cur;
                    }
                    cur = parent;
                    level += 1;
                }
                Err(_) => {
                    self.update_level(cur).fetch_min(level, SeqCst);
                    return EMPTY;
                }
            }
        }
    }

    /// Recomputes `values[level]` of `u` from the run below it, after recursing
    /// into the marked elements of that run. Clears the marker of every element
    /// whose top level is reached.
    fn update_top_down(&self, u: Idx, level: usize)
    where
        P: Sync,
    {
        if level <= SEQUENTIAL_LEVELS {
            return self.update_top_down_sequential(u, level);
        }
        rayon::scope(|s| {
            let mut cur = u;
            loop {
                if self.needs_update(cur, level) {
                    s.spawn(move |_| self.update_top_down(cur, level - 1));
                }
                cur = self.list.next_at(cur, level - 1);
                if cur == EMPTY || self.height(cur) > level {
                    break;
                }
            }
        });
        self.recompute(u, level);
    }

    fn update_top_down_sequential(&self, u: Idx, level: usize) {
        if level == 0 {
            if self.height(u) == 1 {
                self.update_level(u).store(CLEAR, SeqCst);
            }
            return;
        }
        let own = self.update_level(u).load(SeqCst);
        if own == CLEAR || own < level {
            self.update_top_down_sequential(u, level - 1);
        }
        let mut cur = self.list.next_at(u, level - 1);
        while cur != EMPTY && self.height(cur) <= level {
            if self.needs_update(cur, level) {
                self.update_top_down_sequential(cur, level - 1);
            }
            cur = self.list.next_at(cur, level - 1);
        }
        self.recompute(u, level);
    }

    fn recompute(&self, u: Idx, level: usize) {
        let mut sum = self.value_at(u, level - 1);
        let mut cur = self.list.next_at(u, level - 1);
        while cur != EMPTY && self.height(cur) <= level {
            sum += self.value_at(cur, level - 1);
            cur = self.list.next_at(cur, level - 1);
        }
        self.set_value_at(u, level, sum);
        if self.height(u) == level + 1 {
            self.update_level(u).store(CLEAR, SeqCst);
        }
    }
}

impl<P> Drop for AugmentedSkipList<P> {
    fn drop(&mut self) {
        for payload in self.list.payloads_mut() {
            self.values_alloc.free(std::mem::take(&mut payload.values));
        }
    }
}
