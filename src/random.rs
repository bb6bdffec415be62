//! Deterministic, forkable randomness.
//!
//! `ith_rand(i)` is a pure function of the state and `i`, so a parallel loop can
//! draw one number per iteration without sharing a generator. The owner advances
//! the state with `next()` once per batch, outside the parallel region.

use rand::{RngCore, SeedableRng};

/// 64-bit integer hash with good avalanche behaviour.
pub fn hash64(u: u64) -> u64 {
    let mut v = u
        .wrapping_mul(3935559000370003845)
        .wrapping_add(2691343689449507681);
    v ^= v >> 21;
    v ^= v << 37;
    v ^= v >> 4;
    v = v.wrapping_mul(4768777513237032717);
    v ^= v << 20;
    v ^= v >> 41;
    v ^= v << 5;
    v
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Random {
    state: u64,
}

impl Random {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }
    /// Independent stream derived from this one.
    pub fn fork(&self, i: u64) -> Self {
        Self::new(hash64(hash64(i.wrapping_add(self.state))))
    }
    pub fn next(&self) -> Self {
        self.fork(0)
    }
    pub fn ith_rand(&self, i: u64) -> u64 {
        hash64(i.wrapping_add(self.state))
    }
    pub fn rand(&self) -> u64 {
        self.ith_rand(0)
    }
}

/// Sequential use through the `rand` traits: every draw advances the state.
impl RngCore for Random {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let r = self.rand();
        *self = Random::next(self);
        r
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Random {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u64::from_le_bytes(seed))
    }
}
