use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use stemma::{Hierarchy, NodeId, TraversalDir};

const FANOUT: usize = 4;

fn node(level: usize, index: usize) -> NodeId {
    NodeId::from_bytes(format!("ND{level:02}x{index:04}").as_bytes())
}

/// Builds a layered DAG: `levels` layers of `width` nodes, every node a
/// child of its column and the next column in the previous layer.
fn build_dag(levels: usize, width: usize) -> Hierarchy {
    let mut h = Hierarchy::new();
    for i in 0..width {
        h.add_hierarchy(&node(0, i), &[], &[]).expect("add head");
    }
    for level in 1..levels {
        for i in 0..width {
            let parents = [node(level - 1, i), node(level - 1, (i + 1) % width)];
            h.add_hierarchy(&node(level, i), &parents, &[])
                .expect("add layer node");
        }
    }
    h.take_changes();
    h
}

fn bench_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("traversal");

    for levels in [8usize, 32] {
        let mut h = build_dag(levels, FANOUT);
        group.bench_with_input(
            BenchmarkId::new("bfs_descendants", levels),
            &levels,
            |b, _| {
                b.iter(|| {
                    let mut count = 0usize;
                    h.traverse(&node(0, 0), TraversalDir::BfsDescendants, |_, _| {
                        count += 1;
                        false
                    })
                    .expect("traverse");
                    count
                })
            },
        );

        let mut h = build_dag(levels, FANOUT);
        group.bench_with_input(
            BenchmarkId::new("dfs_ancestors", levels),
            &levels,
            |b, _| {
                b.iter(|| {
                    h.find_ancestors(&node(levels - 1, 0))
                        .expect("ancestors")
                        .len()
                })
            },
        );
    }

    group.finish();
}

fn bench_mutation(c: &mut Criterion) {
    c.bench_function("add_and_delete_edges", |b| {
        let mut h = build_dag(8, FANOUT);
        let leaf = node(7, 0);
        let extra = NodeId::from("NDextra001");
        b.iter(|| {
            h.add_hierarchy(&extra, &[leaf], &[]).expect("add node");
            h.del_node(&extra).expect("delete node");
            h.take_changes().len()
        })
    });
}

criterion_group!(benches, bench_traversal, bench_mutation);
criterion_main!(benches);
