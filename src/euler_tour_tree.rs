//! Batch-parallel Euler tour trees over a fixed set of vertices.
//!
//! Each tree is stored as a cyclic sequence in an augmented skip list: one
//! element per vertex (value 1) and one per directed edge (value 0). A vertex
//! with no edges is a one element cycle. The first `n` arena slots are the
//! vertices; the remaining `2 * (n - 1)` slots are edge elements grouped in
//! twin pairs, which is all a forest can ever use.
//!
//! Mutations take `&mut self` and run in parallel internally; queries take
//! `&self` and may run concurrently with each other.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering::SeqCst};
use std::sync::Arc;

use rayon::prelude::*;

use crate::array_allocator::ArrayAllocator;
use crate::error::{Error, Result};
use crate::random::Random;
use crate::skip_list::augmented::AugmentedSkipList;
use crate::skip_list::{Idx, Links, EMPTY};

pub mod edge_map;

use edge_map::EdgeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForestConfig {
    /// Seeds element heights and the choice of postponed cuts.
    pub seed: u64,
    /// Batches of at most this many edges are applied one edge at a time.
    pub sequential_threshold: usize,
    /// Each round of a batch cut postpones about one cut in this many. Values
    /// below 2 postpone nothing.
    pub cut_ignore_factor: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            sequential_threshold: 75,
            cut_ignore_factor: 100,
        }
    }
}

#[derive(Debug, Default)]
pub struct TourData {
    /// Set on the elements of the edges being cut in the current round.
    split_mark: AtomicBool,
}

fn alg_panic() -> ! {
    panic!("EulerTourTree algorithm incorrect")
}

#[derive(Debug)]
pub struct EulerTourTree {
    num_vertices: usize,
    list: AugmentedSkipList<TourData>,
    edges: EdgeMap,
    /// Unused edge element pairs. Pair `p` is elements `n + 2p` and `n + 2p + 1`.
    free_pairs: Vec<usize>,
    randomness: Random,
    config: ForestConfig,
}

impl EulerTourTree {
    /// Forest of `num_vertices` isolated vertices.
    pub fn new(num_vertices: usize) -> Self {
        Self::with_config(num_vertices, ForestConfig::default())
    }

    pub fn with_config(num_vertices: usize, config: ForestConfig) -> Self {
        Self::with_allocators(
            num_vertices,
            config,
            Default::default(),
            Default::default(),
        )
    }

    /// Like `with_config`, drawing element arrays from the given pools.
    pub fn with_allocators(
        num_vertices: usize,
        config: ForestConfig,
        links_alloc: Arc<ArrayAllocator<Links>>,
        values_alloc: Arc<ArrayAllocator<AtomicI32>>,
    ) -> Self {
        debug_assert!(num_vertices < u32::MAX as usize);
        let num_pairs = num_vertices.saturating_sub(1);
        let randomness = Random::new(config.seed);
        let list = AugmentedSkipList::with_payload(
            num_vertices + 2 * num_pairs,
            randomness,
            links_alloc,
            values_alloc,
            |i| ((i < num_vertices) as i32, TourData::default()),
        );
        let loops: Vec<(Idx, Idx)> = (0..num_vertices).map(|v| (v, v)).collect();
        list.batch_join(&loops);
        log::debug!("Created forest with {num_vertices} vertices");
        Self {
            num_vertices,
            list,
            edges: EdgeMap::new(num_vertices),
            free_pairs: (0..num_pairs).rev().collect(),
            randomness: randomness.fork(1),
            config,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }
    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.edges.contains(u, v)
    }
    /// Every edge as `(min, max)`, in no particular order.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.edges.edges()
    }

    fn twin(&self, x: Idx) -> Idx {
        self.num_vertices + ((x - self.num_vertices) ^ 1)
    }
    fn pair_elements(&self, pair: usize) -> (Idx, Idx) {
        let uv = self.num_vertices + 2 * pair;
        (uv, uv + 1)
    }
    fn pair_of(&self, x: Idx) -> usize {
        (x - self.num_vertices) / 2
    }
    fn split_mark(&self, x: Idx) -> &AtomicBool {
        &self.list.inner(x).split_mark
    }
    fn is_marked(&self, x: Idx) -> bool {
        self.split_mark(x).load(SeqCst)
    }

    fn check_pool(&self, requested: usize) -> Result<()> {
        if requested > self.free_pairs.len() {
            return Err(Error::PoolExhausted {
                requested,
                available: self.free_pairs.len(),
            });
        }
        Ok(())
    }

    pub fn is_connected(&self, u: usize, v: usize) -> bool {
        self.list.on_same_list(u, v)
    }

    pub fn batch_connected(&self, queries: &[(usize, usize)]) -> Vec<bool> {
        queries
            .par_iter()
            .map(|&(u, v)| self.is_connected(u, v))
            .collect()
    }

    /// Number of vertices in the tree of `v`.
    pub fn component_size(&self, v: usize) -> usize {
        self.list.get_sum(v) as usize
    }

    /// Vertices in the tree of `v`, in tour order starting at `v`.
    pub fn component_vertices(&self, v: usize) -> Vec<usize> {
        self.list
            .sequence(v)
            .into_iter()
            .filter(|&x| x < self.num_vertices)
            .collect()
    }

    /// Adds edge `{u, v}`. `u` and `v` must be in different trees.
    pub fn link(&mut self, u: usize, v: usize) -> Result<()> {
        self.check_pool(1)?;
        debug_assert!(!self.is_connected(u, v), "link({u}, {v}) closes a cycle");
        log::trace!("link({u}, {v})");
        let pair = self.free_pairs.pop().unwrap_or_else(|| alg_panic());
        let (uv, vu) = self.pair_elements(pair);
        self.edges.insert(u, v, uv)?;
        let succ = self.list.batch_split(&[u, v]);
        let (u_right, v_right) = (succ[0], succ[1]);
        self.list
            .batch_join(&[(u, uv), (uv, v_right), (v, vu), (vu, u_right)]);
        Ok(())
    }

    /// Removes edge `{u, v}`, which must be present.
    pub fn cut(&mut self, u: usize, v: usize) {
        debug_assert!(self.has_edge(u, v), "cut({u}, {v}) of a missing edge");
        log::trace!("cut({u}, {v})");
        let uv = self
            .edges
            .find(u, v)
            .unwrap_or_else(|| panic!("cut({u}, {v}) of a missing edge"));
        let vu = self.twin(uv);
        self.edges.delete(u, v);
        let u_left = self.list.prev(uv);
        let v_left = self.list.prev(vu);
        let v_right = self.list.next(uv);
        let u_right = self.list.next(vu);
        self.list.batch_split(&[uv, vu, u_left, v_left]);
        self.list.reset(uv, 0);
        self.list.reset(vu, 0);
        self.list.batch_join(&[(u_left, u_right), (v_left, v_right)]);
        self.free_pairs.push(self.pair_of(uv));
    }

    /// Adds every edge in `links`. The edges must keep the graph a forest.
    ///
    /// Fails without changing anything if there are not enough free edge
    /// elements, which only happens when the edges would close a cycle.
    pub fn batch_link(&mut self, links: &[(usize, usize)]) -> Result<()> {
        self.check_pool(links.len())?;
        if links.len() <= self.config.sequential_threshold {
            log::debug!("batch_link of {} edges, sequential", links.len());
            for &(u, v) in links {
                self.link(u, v)?;
            }
            return Ok(());
        }
        log::debug!("batch_link of {} edges", links.len());
        let k = links.len();
        let pairs = self.free_pairs.split_off(self.free_pairs.len() - k);

        let this = &*self;
        links
            .par_iter()
            .zip(pairs.par_iter())
            .try_for_each(|(&(u, v), &p)| {
                let (uv, _) = this.pair_elements(p);
                debug_assert!(u != v, "self loop ({u}, {u})");
                let inserted = this.edges.insert(u, v, uv)?;
                debug_assert!(inserted, "edge ({u}, {v}) already present");
                Ok(())
            })?;

        // Every new directed edge `(x, y, element)`, grouped by `x`.
        let mut both: Vec<(usize, usize, Idx)> = links
            .par_iter()
            .zip(pairs.par_iter())
            .flat_map_iter(|(&(u, v), &p)| {
                let (uv, vu) = this.pair_elements(p);
                [(u, v, uv), (v, u, vu)]
            })
            .collect();
        both.par_sort_unstable_by_key(|&(x, _, _)| x);

        let starts_group = |i: usize| i == 0 || both[i - 1].0 != both[i].0;
        let ends_group = |i: usize| i + 1 == both.len() || both[i + 1].0 != both[i].0;

        // New edges of `x` go right after the vertex element of `x`.
        let group_ends: Vec<usize> = (0..both.len())
            .into_par_iter()
            .filter(|&i| ends_group(i))
            .collect();
        let split_points: Vec<Idx> = group_ends.par_iter().map(|&i| both[i].0).collect();
        let successors = this.list.batch_split(&split_points);

        let joins: Vec<(Idx, Idx)> = (0..both.len())
            .into_par_iter()
            .flat_map_iter(|i| {
                let (x, _, e) = both[i];
                let first = starts_group(i).then_some((x, e));
                let after = if ends_group(i) {
                    let g = group_ends
                        .binary_search(&i)
                        .unwrap_or_else(|_| alg_panic());
                    successors[g]
                } else {
                    both[i + 1].2
                };
                first.into_iter().chain([(this.twin(e), after)])
            })
            .collect();
        this.list.batch_join(&joins);
        Ok(())
    }

    /// Removes every edge in `cuts`. The edges must be present and distinct.
    pub fn batch_cut(&mut self, cuts: &[(usize, usize)]) {
        if cuts.len() <= self.config.sequential_threshold {
            log::debug!("batch_cut of {} edges, sequential", cuts.len());
            for &(u, v) in cuts {
                self.cut(u, v);
            }
            return;
        }
        log::debug!("batch_cut of {} edges", cuts.len());

        // Walks past runs of cut edges are long when many cuts are adjacent.
        // Postponing a random few to the next round keeps them short.
        let randomness = self.randomness;
        self.randomness = randomness.next();
        let factor = self.config.cut_ignore_factor;
        let (postponed, now): (Vec<(usize, usize)>, Vec<(usize, usize)>) = cuts
            .par_iter()
            .enumerate()
            .partition_map(|(i, &c)| {
                if factor > 1 && randomness.ith_rand(i as u64) % factor == 0 {
                    rayon::iter::Either::Left(c)
                } else {
                    rayon::iter::Either::Right(c)
                }
            });
        log::debug!("batch_cut round: {} now, {} postponed", now.len(), postponed.len());

        let this = &*self;
        let elements: Vec<(Idx, Idx)> = now
            .par_iter()
            .map(|&(u, v)| {
                debug_assert!(this.has_edge(u, v), "cut({u}, {v}) of a missing edge");
                let uv = this
                    .edges
                    .find(u, v)
                    .unwrap_or_else(|| panic!("cut({u}, {v}) of a missing edge"));
                (uv, this.twin(uv))
            })
            .collect();
        elements.par_iter().for_each(|&(uv, vu)| {
            this.split_mark(uv).store(true, SeqCst);
            this.split_mark(vu).store(true, SeqCst);
        });

        // For each removed element `e`, the element before it is joined to the
        // first unremoved element after its twin. Removed edges met on the way
        // are stepped over along with their subtrees.
        let joins: Vec<(Idx, Idx)> = elements
            .par_iter()
            .flat_map_iter(|&(uv, vu)| [(uv, vu), (vu, uv)])
            .filter_map(|(e, twin)| {
                let left = this.list.prev(e);
                if this.is_marked(left) {
                    return None;
                }
                let mut right = this.list.next(twin);
                while this.is_marked(right) {
                    right = this.list.next(this.twin(right));
                }
                Some((left, right))
            })
            .collect();

        let splits: Vec<Idx> = elements
            .par_iter()
            .flat_map_iter(|&(uv, vu)| [uv, vu, this.list.prev(uv), this.list.prev(vu)])
            .filter(|&x| x != EMPTY)
            .collect();
        this.list.batch_split(&splits);
        elements.par_iter().for_each(|&(uv, vu)| {
            for x in [uv, vu] {
                this.list.reset(x, 0);
                this.split_mark(x).store(false, SeqCst);
            }
        });
        this.list.batch_join(&joins);

        for &(u, v) in &now {
            self.edges.delete(u, v);
        }
        let freed: Vec<usize> = elements.iter().map(|&(uv, _)| self.pair_of(uv)).collect();
        self.free_pairs.extend(freed);

        self.batch_cut(&postponed);
    }
}
