use batch_forest::array_allocator::ArrayAllocator;
use batch_forest::random::Random;
use batch_forest::skip_list::augmented::AugmentedSkipList;
use batch_forest::skip_list::{Idx, EMPTY};
use common::{guard, init_logger, primes};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use std::sync::Arc;

mod common;

const N: usize = 1000;

fn naive_sum(l: &AugmentedSkipList, u: Idx) -> i32 {
    l.sequence(u).iter().map(|&x| l.value(x)).sum()
}

fn chain(n: usize) -> AugmentedSkipList {
    let l = AugmentedSkipList::new(n);
    let joins: Vec<_> = (0..n - 1).map(|i| (i, i + 1)).collect();
    l.batch_join(&joins);
    l
}

fn check_sums(l: &AugmentedSkipList) {
    let mut seen = vec![false; l.len()];
    for u in 0..l.len() {
        if seen[u] {
            continue;
        }
        let seq = l.sequence(u);
        for &x in &seq {
            seen[x] = true;
        }
        let expected = naive_sum(l, u);
        for &x in seq.iter().step_by(7) {
            assert_eq!(l.get_sum(x), expected, "list of {u}, from {x}");
        }
    }
}

#[test]
fn test_singletons() {
    let l = AugmentedSkipList::new(10);
    for u in 0..10 {
        assert_eq!(l.value(u), 1);
        assert_eq!(l.get_sum(u), 1);
    }
}

#[test]
fn test_chain_and_cycle_sums() {
    init_logger();
    let l = guard(chain(N));
    assert_eq!(l.get_sum(0), N as i32);
    assert_eq!(l.get_sum(N / 2), N as i32);
    l.join(N - 1, 0);
    assert_eq!(l.get_sum(123), N as i32);
    assert_eq!(l.split(499), 500);
    assert_eq!(l.get_sum(499), N as i32);
    assert_eq!(l.sequence(499).last(), Some(&499));
}

#[test]
fn test_split_primes() {
    init_logger();
    let l = guard(chain(N));
    for p in primes(N) {
        assert_eq!(l.split(p), p + 1);
    }
    check_sums(&l);
    assert_eq!(l.get_sum(0), 3);
    assert_eq!(l.get_sum(3), 1);
    assert_eq!(l.get_sum(998), 2);
}

#[test]
fn test_batch_split_primes() {
    init_logger();
    let l = guard(chain(N));
    let ps = primes(N);
    let succ = l.batch_split(&ps);
    assert_eq!(succ, ps.iter().map(|p| p + 1).collect::<Vec<_>>());
    check_sums(&l);
    // Rejoin everything in one batch.
    let joins: Vec<_> = ps.iter().map(|&p| (p, p + 1)).collect();
    l.batch_join(&joins);
    assert_eq!(l.get_sum(0), N as i32);
    assert_eq!(l.sequence(0), (0..N).collect::<Vec<_>>());
}

#[test]
fn test_duplicate_batch_split() {
    let l = chain(100);
    let succ = l.batch_split(&[5, 5, 60, 5, 60]);
    assert_eq!(succ.iter().filter(|&&s| s == 6).count(), 1);
    assert_eq!(succ.iter().filter(|&&s| s == 61).count(), 1);
    assert_eq!(succ.iter().filter(|&&s| s == EMPTY).count(), 3);
    assert_eq!(l.get_sum(0), 6);
    assert_eq!(l.get_sum(30), 55);
    assert_eq!(l.get_sum(99), 39);
}

#[test]
fn test_batch_update() {
    init_logger();
    let l = guard(chain(N));
    let updates: Vec<_> = (0..N).step_by(3).map(|i| (i, (i % 7) as i32)).collect();
    l.batch_update(&updates);
    let expected: i32 = (0..N)
        .map(|i| if i % 3 == 0 { (i % 7) as i32 } else { 1 })
        .sum();
    assert_eq!(l.get_sum(17), expected);
    assert_eq!(naive_sum(&l, 17), expected);
    l.batch_split(&[400]);
    check_sums(&l);
}

#[test]
fn test_subsequence_sums() {
    init_logger();
    let mut rng = rand::rngs::StdRng::seed_from_u64(9021);
    let l = guard(chain(N));
    let updates: Vec<_> = (0..N).map(|i| (i, rng.gen_range(0..100))).collect();
    l.batch_update(&updates);
    for _ in 0..300 {
        let (a, b) = (rng.gen_range(0..N), rng.gen_range(0..N));
        let (a, b) = (a.min(b), a.max(b));
        let expected: i32 = (a..=b).map(|i| l.value(i)).sum();
        assert_eq!(l.get_subsequence_sum(a, b), expected, "[{a}, {b}]");
    }
}

#[test]
fn test_shared_allocators() {
    let links = Arc::new(ArrayAllocator::new());
    let values = Arc::new(ArrayAllocator::new());
    {
        let l = AugmentedSkipList::with_payload(
            50,
            Random::new(1),
            links.clone(),
            values.clone(),
            |i| (i as i32, i % 2 == 0),
        );
        assert_eq!(l.value(7), 7);
        assert!(*l.inner(8));
        l.batch_join(&[(1, 2), (2, 3)]);
        assert_eq!(l.get_sum(3), 6);
    }
    // Every array went back to the pools.
    let pooled: usize = [1, 2, 4, 8, 16, 32].iter().map(|&s| links.pooled(s)).sum();
    assert_eq!(pooled, 50);
    let pooled: usize = [1, 2, 4, 8, 16, 32].iter().map(|&s| values.pooled(s)).sum();
    assert_eq!(pooled, 50);
}

#[allow(non_snake_case)]
fn random_batches(Q: usize, n: usize, seed: u64) {
    init_logger();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let l = guard(AugmentedSkipList::with_seed(n, seed));
    for q in 1..=Q {
        // Current lists as sequences.
        let mut seen = vec![false; n];
        let mut lists = vec![];
        for u in 0..n {
            if !seen[u] {
                let seq = l.sequence(u);
                seq.iter().for_each(|&x| seen[x] = true);
                lists.push(seq);
            }
        }
        if q % 2 == 1 {
            // Join random pairs of lists, last to first.
            lists.shuffle(&mut rng);
            let joins: Vec<_> = lists
                .chunks_exact(2)
                .filter(|_| rng.gen_bool(0.7))
                .map(|c| (*c[0].last().unwrap(), c[1][0]))
                .collect();
            log::debug!("q {q}: {} joins", joins.len());
            l.batch_join(&joins);
        } else {
            let splits: Vec<_> = (0..rng.gen_range(1..n / 4))
                .map(|_| rng.gen_range(0..n))
                .collect();
            log::debug!("q {q}: {} splits", splits.len());
            l.batch_split(&splits);
        }
        if rng.gen_bool(0.3) {
            let updates: Vec<_> = (0..n)
                .filter_map(|u| rng.gen_bool(0.1).then(|| (u, rng.gen_range(0..5))))
                .collect();
            l.batch_update(&updates);
        }
        check_sums(&l);
    }
}

#[test]
fn test_random_batches1() {
    random_batches(40, 300, 1234);
}
#[test]
fn test_random_batches2() {
    random_batches(20, 2000, 777);
}

#[test]
#[ignore]
fn test_random_batches_stress() {
    init_logger();
    loop {
        let seed = rand::thread_rng().gen();
        log::info!("seed = {seed}");
        random_batches(100, 500, seed);
    }
}
