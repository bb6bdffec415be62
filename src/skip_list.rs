//! Phase-concurrent skip list supporting joins and splits.
//!
//! The list is an arena of elements addressed by `Idx`. Each element takes part
//! in levels `0..height`; level 0 holds every element of its sequence and level
//! `i` only the elements taller than `i`. A sequence is either acyclic or a
//! single cycle, at every level.
//!
//! `join` may run concurrently with other `join` calls as long as all `left`s are
//! distinct and all `right`s are distinct. `split` may run concurrently with other
//! `split` calls, even on the same element. Read-only calls may run concurrently
//! with each other but not with a join or split phase.
//!
//! Elements carry a payload `P` so that richer element kinds (the augmented list,
//! the Euler tour elements) reuse these primitives.

use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
use std::sync::Arc;

use debug_tree::TreeBuilder;
use derivative::Derivative;
use rayon::prelude::*;

use crate::array_allocator::{ArrayAllocator, MAX_ARRAY_LENGTH};
use crate::random::Random;

pub mod augmented;

pub type Idx = usize;
/// Null link.
pub const EMPTY: Idx = usize::MAX;
pub const MAX_HEIGHT: usize = MAX_ARRAY_LENGTH;

fn node_fmt(u: &Idx, f: &mut Formatter) -> std::fmt::Result {
    if *u == EMPTY {
        write!(f, "∅")
    } else {
        write!(f, "{u}")
    }
}

/// Used to pretty print a Idx, outputting ∅ if it is EMPTY.
pub struct PrettyIdx(pub Idx);

impl Display for PrettyIdx {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        node_fmt(&self.0, f)
    }
}

impl Debug for PrettyIdx {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

use PrettyIdx as I;

/// Neighbors of an element on one level.
#[derive(Default)]
pub struct Links {
    prev: AtomicUsize,
    next: AtomicUsize,
}

impl Debug for Links {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}]",
            I(self.prev.load(SeqCst)),
            I(self.next.load(SeqCst))
        )
    }
}

fn links_fmt(links: &[Links], f: &mut Formatter) -> std::fmt::Result {
    f.debug_list().entries(links).finish()
}

/// Geometric(1/2) height from the trailing one bits of a random word.
pub fn generate_height(random_int: u64) -> usize {
    (random_int.trailing_ones() as usize + 1).min(MAX_HEIGHT)
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Element<P> {
    height: usize,
    /// `links[i]` for levels `0..height`. May be longer than `height`.
    #[derivative(Debug(format_with = "links_fmt"))]
    links: Box<[Links]>,
    payload: P,
}

pub struct SkipList<P = ()> {
    elements: Vec<Element<P>>,
    links_alloc: Arc<ArrayAllocator<Links>>,
}

impl<P: Debug> Debug for SkipList<P> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let builder = TreeBuilder::new();
        {
            let _b = builder.add_branch("SkipList");
            let mut seen = vec![false; self.len()];
            for u in 0..self.len() {
                if seen[u] {
                    continue;
                }
                let _l = builder.add_branch(&format!("list of {u}"));
                for v in self.sequence(u) {
                    seen[v] = true;
                    builder.add_leaf(&format!("[{v}] {:?}", self.elements[v]));
                }
            }
        }
        writeln!(f, "{}", builder.string())
    }
}

impl SkipList<()> {
    /// `len` singleton elements, heights drawn from the default seed.
    pub fn new(len: usize) -> Self {
        Self::with_seed(len, 0)
    }
    pub fn with_seed(len: usize, seed: u64) -> Self {
        Self::with_payload(len, Random::new(seed), Default::default(), |_, _| ())
    }
}

impl<P> SkipList<P> {
    /// Builds `len` singleton elements in parallel. Element `i` gets its height
    /// from `randomness.ith_rand(i)` and its payload from `payload(i, height)`.
    pub fn with_payload(
        len: usize,
        randomness: Random,
        links_alloc: Arc<ArrayAllocator<Links>>,
        payload: impl Fn(Idx, usize) -> P + Sync,
    ) -> Self
    where
        P: Send,
    {
        let elements = (0..len)
            .into_par_iter()
            .map(|i| {
                let height = generate_height(randomness.ith_rand(i as u64));
                let links = links_alloc
                    .allocate(height)
                    .unwrap_or_else(|e| panic!("height {height} out of range: {e}"));
                for l in &links[..height] {
                    l.prev.store(EMPTY, SeqCst);
                    l.next.store(EMPTY, SeqCst);
                }
                Element {
                    height,
                    links,
                    payload: payload(i, height),
                }
            })
            .collect();
        Self {
            elements,
            links_alloc,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
    pub fn height(&self, u: Idx) -> usize {
        self.elements[u].height
    }
    pub fn payload(&self, u: Idx) -> &P {
        &self.elements[u].payload
    }
    pub(crate) fn payloads_mut(&mut self) -> impl Iterator<Item = &mut P> {
        self.elements.iter_mut().map(|e| &mut e.payload)
    }

    fn links(&self, u: Idx, level: usize) -> &Links {
        &self.elements[u].links[level]
    }
    pub(crate) fn next_at(&self, u: Idx, level: usize) -> Idx {
        self.links(u, level).next.load(SeqCst)
    }
    pub(crate) fn prev_at(&self, u: Idx, level: usize) -> Idx {
        self.links(u, level).prev.load(SeqCst)
    }
    pub fn next(&self, u: Idx) -> Idx {
        self.next_at(u, 0)
    }
    pub fn prev(&self, u: Idx) -> Idx {
        self.prev_at(u, 0)
    }

    /// Turns `u` back into a singleton. Only valid once `u` is unreachable from
    /// every other element.
    pub(crate) fn reset(&self, u: Idx) {
        for l in &self.elements[u].links[..self.height(u)] {
            l.prev.store(EMPTY, SeqCst);
            l.next.store(EMPTY, SeqCst);
        }
    }

    /// Searches left starting from and including `u` for the first element that
    /// reaches `level + 1`.
    pub(crate) fn find_left_parent(&self, u: Idx, level: usize) -> Idx {
        let mut cur = u;
        loop {
            if self.height(cur) > level + 1 {
                return cur;
            }
            cur = self.prev_at(cur, level);
            if cur == EMPTY || cur == u {
                return EMPTY;
            }
        }
    }

    /// Searches right starting from and including `u` for the first element that
    /// reaches `level + 1`.
    pub(crate) fn find_right_parent(&self, u: Idx, level: usize) -> Idx {
        let mut cur = u;
        loop {
            if self.height(cur) > level + 1 {
                return cur;
            }
            cur = self.next_at(cur, level);
            if cur == EMPTY || cur == u {
                return EMPTY;
            }
        }
    }

    /// Element identifying the sequence `u` lives in. Two elements have the same
    /// representative iff they are in the same sequence. Valid until the next
    /// join or split.
    ///
    /// On a cycle this is the tallest element with the lowest index; on an acyclic
    /// sequence it is the leftmost element of the top level.
    pub fn find_representative(&self, u: Idx) -> Idx {
        let mut cur = u;
        let mut seen = EMPTY;
        let mut level = self.height(cur) - 1;

        // Walk up while moving forward.
        while self.next_at(cur, level) != EMPTY && seen != cur {
            if seen == EMPTY || cur < seen {
                seen = cur;
            }
            cur = self.next_at(cur, level);
            let top = self.height(cur) - 1;
            if level < top {
                level = top;
                seen = EMPTY;
            }
        }

        if seen == cur {
            // Cycle.
            return seen;
        }
        // Walk up while moving backward.
        while self.prev_at(cur, level) != EMPTY {
            cur = self.prev_at(cur, level);
            level = self.height(cur) - 1;
        }
        cur
    }

    pub fn on_same_list(&self, u: Idx, v: Idx) -> bool {
        self.find_representative(u) == self.find_representative(v)
    }

    /// Concatenates the sequence of `left` with the sequence of `right`. `left`
    /// must be last in its sequence and `right` first in its own; they may be in
    /// the same sequence, which closes it into a cycle.
    pub fn join(&self, mut left: Idx, mut right: Idx) {
        let mut level = 0;
        while left != EMPTY && right != EMPTY {
            if self
                .links(left, level)
                .next
                .compare_exchange(EMPTY, right, SeqCst, SeqCst)
                .is_err()
            {
                // Another join already linked this level.
                return;
            }
            // A CAS rather than a store, so that concurrent joins always find
            // each other's links when climbing.
            let _ = self
                .links(right, level)
                .prev
                .compare_exchange(EMPTY, left, SeqCst, SeqCst);
            left = self.find_left_parent(left, level);
            right = self.find_right_parent(right, level);
            level += 1;
        }
    }

    /// Splits the sequence right after `u`. Returns the former successor of `u`,
    /// or `EMPTY` if there was none or a concurrent split of `u` won.
    pub fn split(&self, u: Idx) -> Idx {
        let mut successor = EMPTY;
        let mut cur = u;
        let mut level = 0;
        while cur != EMPTY {
            let next = self.next_at(cur, level);
            if next == EMPTY
                || self
                    .links(cur, level)
                    .next
                    .compare_exchange(next, EMPTY, SeqCst, SeqCst)
                    .is_err()
            {
                break;
            }
            if level == 0 {
                successor = next;
            }
            // May race with a climb that reads this pointer; at worst the climb
            // does a little extra work.
            self.links(next, level).prev.store(EMPTY, SeqCst);
            cur = self.find_left_parent(cur, level);
            level += 1;
        }
        successor
    }

    /// Elements of `u`'s sequence in order, starting from its first element (or
    /// from `u` on a cycle). Linear time, for tests and debugging.
    pub fn sequence(&self, u: Idx) -> Vec<Idx> {
        let mut first = u;
        loop {
            let p = self.prev(first);
            if p == EMPTY {
                break;
            }
            if p == u {
                first = u;
                break;
            }
            first = p;
        }
        let mut out = vec![first];
        let mut cur = self.next(first);
        while cur != EMPTY && cur != first {
            out.push(cur);
            cur = self.next(cur);
        }
        out
    }
}

impl<P> Drop for SkipList<P> {
    fn drop(&mut self) {
        for e in &mut self.elements {
            self.links_alloc.free(std::mem::take(&mut e.links));
        }
    }
}
