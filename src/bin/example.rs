use batch_forest::EulerTourTree;

fn link(t: &mut EulerTourTree, u: usize, v: usize) {
    println!("Linking {} and {}", u, v);
    if let Err(e) = t.link(u, v) {
        println!("  failed: {e}");
    }
}

fn cut(t: &mut EulerTourTree, u: usize, v: usize) {
    println!("Cutting {} and {}", u, v);
    t.cut(u, v);
}

fn connected(t: &EulerTourTree, u: usize, v: usize) {
    println!(
        "Are {} and {} connected? {} (tree of {} has {} vertices)",
        u,
        v,
        if t.is_connected(u, v) { "Yes" } else { "No" },
        u,
        t.component_size(u)
    );
}

fn main() {
    let mut t = EulerTourTree::new(10);
    let path: Vec<_> = (0..9).map(|u| (u, u + 1)).collect();
    if let Err(e) = t.batch_link(&path) {
        println!("batch link failed: {e}");
        return;
    }
    println!("Created a path of length 10 (vertices 0 to 9)");
    connected(&t, 0, 9);
    cut(&mut t, 4, 5);
    connected(&t, 0, 9);
    connected(&t, 5, 9);
    link(&mut t, 0, 9);
    connected(&t, 4, 5);
    cut(&mut t, 0, 1);
    connected(&t, 1, 4);
    println!("Tree of 0: {:?}", t.component_vertices(0));
}
