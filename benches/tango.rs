// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use datatree::{
    DataTreeConfiguration, InMemoryDataTree, InstanceIdentifier, NormalizedNode, PathArgument,
    schema::{SchemaContext, SchemaNode},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::hint::black_box;
use tango_bench::{IntoBenchmarks, benchmark_fn, tango_benchmarks, tango_main};

const ENTRIES: u64 = 255;

fn schema() -> SchemaContext {
    SchemaContext::new([SchemaNode::container("top").with_child(
        SchemaNode::list("list", ["key"])
            .with_child(SchemaNode::leaf("key"))
            .with_child(SchemaNode::leaf("name"))
            .unique(["name"]),
    )])
}

fn entry_path(key: u64) -> InstanceIdentifier {
    InstanceIdentifier::of(["top", "list"]).node(PathArgument::entry("list", [("key", key)]))
}

fn entry(key: u64, name: &str) -> NormalizedNode {
    NormalizedNode::map_entry("list", [("key", key)])
        .with_child(NormalizedNode::leaf("name", name))
        .build()
}

fn populated(unique_indexes: bool) -> InMemoryDataTree {
    datatree::enable_determinism();

    let config = DataTreeConfiguration::default().with_unique_indexes(unique_indexes);
    let tree = InMemoryDataTree::new(config, schema()).unwrap();
    let modification = tree.take_snapshot().new_modification();
    for key in 0..ENTRIES {
        modification
            .write(&entry_path(key), entry(key, &format!("entry-{key}")))
            .unwrap();
    }
    modification.ready().unwrap();
    tree.commit(&tree.prepare(&modification).unwrap()).unwrap();
    tree
}

/// Writes one entry and takes the modification through validate, prepare and commit.
fn write_and_commit(tree: &InMemoryDataTree, key: u64, name: &str) {
    let modification = tree.take_snapshot().new_modification();
    modification.write(&entry_path(key), entry(key, name)).unwrap();
    modification.ready().unwrap();
    tree.validate(&modification).unwrap();
    tree.commit(&tree.prepare(&modification).unwrap()).unwrap();
}

fn commit_benchmarks() -> impl IntoBenchmarks {
    let indexed: &'static _ = Box::leak(Box::new(populated(true)));
    let plain: &'static _ = Box::leak(Box::new(populated(false)));
    [
        benchmark_fn("commit::update", move |b| {
            let mut rng = StdRng::seed_from_u64(b.seed);
            b.iter(move || {
                let key = rng.random_range(0..ENTRIES);
                write_and_commit(black_box(plain), key, "updated");
            })
        }),
        benchmark_fn("commit::update_unique", move |b| {
            let mut rng = StdRng::seed_from_u64(b.seed);
            b.iter(move || {
                let key = rng.random_range(0..ENTRIES);
                write_and_commit(black_box(indexed), key, &format!("entry-{key}"));
            })
        }),
        benchmark_fn("commit::noop", move |b| {
            b.iter(move || {
                let modification = black_box(plain).take_snapshot().new_modification();
                modification.ready().unwrap();
                plain.commit(&plain.prepare(&modification).unwrap()).unwrap();
            })
        }),
    ]
}

fn modification_benchmarks() -> impl IntoBenchmarks {
    let tree: &'static _ = Box::leak(Box::new(populated(true)));
    [
        benchmark_fn("modification::read_through_write", move |b| {
            let modification = tree.take_snapshot().new_modification();
            modification.write(&entry_path(0), entry(0, "pending")).unwrap();
            b.iter(move || black_box(&modification).read_node(&entry_path(0)).unwrap())
        }),
        benchmark_fn("modification::seal", move |b| {
            let mut rng = StdRng::seed_from_u64(b.seed);
            b.iter(move || {
                let modification = black_box(tree).take_snapshot().new_modification();
                for _ in 0..16 {
                    let key = rng.random_range(0..ENTRIES);
                    modification.merge(&entry_path(key), entry(key, "merged")).unwrap();
                }
                modification.ready().unwrap();
                modification
            })
        }),
        benchmark_fn("snapshot::read", move |b| {
            b.iter(move || black_box(tree).take_snapshot().read_node(&entry_path(128)))
        }),
    ]
}

tango_benchmarks!(commit_benchmarks(), modification_benchmarks());
tango_main!();
