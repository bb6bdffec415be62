use std::collections::BTreeSet;
use std::sync::{LazyLock, Mutex};

use flexi_logger::{Logger, LoggerHandle};
use scopeguard::{OnUnwind, ScopeGuard};

#[allow(dead_code)]
pub static LOGGER: LazyLock<Mutex<LoggerHandle>> = LazyLock::new(|| {
    Mutex::new(
        Logger::try_with_env_or_str("info")
            .unwrap()
            .write_mode(flexi_logger::WriteMode::SupportCapture)
            .log_to_stdout()
            .set_palette("196;208;3;7;8".to_owned())
            .format(|w, now, record| {
                let style = flexi_logger::style(record.level());
                write!(
                    w,
                    "{} {pref}[{}] {}{suf}",
                    now.format("%H:%M:%S"),
                    &record.level().as_str()[0..1],
                    record.args(),
                    pref = style.prefix(),
                    suf = style.suffix(),
                )
            })
            .start()
            .unwrap(),
    )
});

#[allow(dead_code)]
pub fn init_logger() {
    let _ = &*LOGGER;
}

/// Logs the structure if the test panics while it is alive.
#[allow(dead_code)]
pub fn guard<L: std::fmt::Debug>(l: L) -> ScopeGuard<L, impl FnOnce(L), OnUnwind> {
    scopeguard::guard_on_unwind(l, |l| log::error!("Crash with {l:?}"))
}

/// Primes below `n`.
#[allow(dead_code)]
pub fn primes(n: usize) -> Vec<usize> {
    let mut composite = vec![false; n];
    let mut out = vec![];
    for i in 2..n {
        if composite[i] {
            continue;
        }
        out.push(i);
        for j in (i * i..n).step_by(i) {
            composite[j] = true;
        }
    }
    out
}

/// Forest kept as adjacency sets. Connectivity is a plain graph search.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct SlowForest {
    adj: Vec<BTreeSet<usize>>,
}

#[allow(dead_code)]
impl SlowForest {
    pub fn new(n: usize) -> Self {
        Self {
            adj: vec![BTreeSet::new(); n],
        }
    }

    pub fn link(&mut self, u: usize, v: usize) {
        assert!(!self.is_connected(u, v), "({u}, {v}) would close a cycle");
        self.adj[u].insert(v);
        self.adj[v].insert(u);
    }

    pub fn cut(&mut self, u: usize, v: usize) {
        assert!(self.adj[u].remove(&v), "({u}, {v}) not an edge");
        self.adj[v].remove(&u);
    }

    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.adj[u].contains(&v)
    }

    fn search(&self, u: usize, seen: &mut [bool]) -> Vec<usize> {
        let mut stack = vec![u];
        let mut out = vec![];
        seen[u] = true;
        while let Some(x) = stack.pop() {
            out.push(x);
            for &y in &self.adj[x] {
                if !seen[y] {
                    seen[y] = true;
                    stack.push(y);
                }
            }
        }
        out
    }

    pub fn is_connected(&self, u: usize, v: usize) -> bool {
        let mut seen = vec![false; self.adj.len()];
        self.search(u, &mut seen);
        seen[v]
    }

    /// Id of the component of every vertex.
    pub fn components(&self) -> Vec<usize> {
        let n = self.adj.len();
        let mut seen = vec![false; n];
        let mut comp = vec![usize::MAX; n];
        for u in 0..n {
            if !seen[u] {
                for x in self.search(u, &mut seen) {
                    comp[x] = u;
                }
            }
        }
        comp
    }

    pub fn component_size(&self, u: usize) -> usize {
        let mut seen = vec![false; self.adj.len()];
        self.search(u, &mut seen).len()
    }

    /// Every edge as `(min, max)`, sorted.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.adj
            .iter()
            .enumerate()
            .flat_map(|(u, vs)| vs.iter().filter(move |&&v| u < v).map(move |&v| (u, v)))
            .collect()
    }
}
