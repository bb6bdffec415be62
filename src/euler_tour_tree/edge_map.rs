//! Directed edge to tour element lookup.
//!
//! Only the `(min, max)` direction is stored; the element of the other
//! direction is its twin.

use crate::concurrent_map::ConcurrentMap;
use crate::error::Result;
use crate::skip_list::Idx;

pub struct EdgeMap {
    map: ConcurrentMap<(u32, u32)>,
    num_vertices: usize,
}

impl std::fmt::Debug for EdgeMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.map, f)
    }
}

fn key(u: usize, v: usize) -> (u32, u32) {
    (u.min(v) as u32, u.max(v) as u32)
}

impl EdgeMap {
    /// Map for a forest over `num_vertices` vertices.
    pub fn new(num_vertices: usize) -> Self {
        Self {
            map: ConcurrentMap::new(2 * num_vertices.saturating_sub(1)),
            num_vertices,
        }
    }

    fn twin(&self, x: Idx) -> Idx {
        self.num_vertices + ((x - self.num_vertices) ^ 1)
    }

    /// Registers edge `{u, v}` whose `(u, v)` direction is element `uv`.
    pub fn insert(&self, u: usize, v: usize, uv: Idx) -> Result<bool> {
        let stored = if u < v { uv } else { self.twin(uv) };
        self.map.insert(key(u, v), stored)
    }

    /// Element of directed edge `(u, v)`.
    pub fn find(&self, u: usize, v: usize) -> Option<Idx> {
        let stored = self.map.find(key(u, v))?;
        Some(if u < v { stored } else { self.twin(stored) })
    }

    pub fn contains(&self, u: usize, v: usize) -> bool {
        self.map.contains(key(u, v))
    }

    pub fn delete(&mut self, u: usize, v: usize) -> bool {
        self.map.delete(key(u, v))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Every stored edge as `(min, max)`.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.map.iter().map(|((u, v), _)| (u as usize, v as usize))
    }
}
