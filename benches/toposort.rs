//! Benchmarks for Ordered View derivation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use topograph::graph::toposort::OrderedView;
use topograph::graph::{GraphStore, Node, NodeId};

/// Build a layered graph: `layers` ranks of `width` nodes, every node linked
/// to two nodes in the next rank. Deterministic, no RNG needed.
fn layered_store(layers: usize, width: usize) -> GraphStore {
    let mut store = GraphStore::new();
    for layer in 0..layers {
        for slot in 0..width {
            let id = NodeId::from(format!("n-{layer:03}-{slot:03}"));
            let mut node = Node::new(format!("task {layer}/{slot}"));
            node.priority = Some(((layer + slot) % 5) as u8);
            if layer + 1 < layers {
                node.children.push(NodeId::from(format!(
                    "n-{:03}-{:03}",
                    layer + 1,
                    slot
                )));
                node.children.push(NodeId::from(format!(
                    "n-{:03}-{:03}",
                    layer + 1,
                    (slot + 1) % width
                )));
            }
            store.nodes.insert(id, node);
        }
    }
    store
}

fn bench_derive(c: &mut Criterion) {
    let small = layered_store(5, 20);
    c.bench_function("derive_100_nodes", |bench| {
        bench.iter(|| black_box(OrderedView::derive(&small)))
    });

    let large = layered_store(20, 100);
    c.bench_function("derive_2000_nodes", |bench| {
        bench.iter(|| black_box(OrderedView::derive(&large)))
    });
}

fn bench_mutation_cycle(c: &mut Criterion) {
    let store = layered_store(10, 50);
    // The target's generated priority is (5+25)%5 = 0; the value set below
    // must differ or the mutation aborts instead of committing.
    let target = NodeId::from("n-005-025");
    assert_ne!(store.get(&target).unwrap().priority, Some(1));
    c.bench_function("mutate_and_rederive_500_nodes", |bench| {
        bench.iter(|| {
            let next = store.set_priority(&target, 1).unwrap();
            black_box(OrderedView::derive(&next))
        })
    });
}

criterion_group!(benches, bench_derive, bench_mutation_cycle);
criterion_main!(benches);
