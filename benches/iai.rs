// (c) Copyright 2025 Helsing GmbH. All rights reserved.
#![cfg_attr(not(target_os = "linux"), allow(dead_code, unused_imports))]

use datatree::{
    DataTreeConfiguration, DataTreeModification, InMemoryDataTree, InstanceIdentifier,
    NormalizedNode, PathArgument,
    schema::{SchemaContext, SchemaNode},
};
use iai_callgrind::{library_benchmark, library_benchmark_group, main};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::hint::black_box;

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

fn setup_tree(n: u64) -> InMemoryDataTree {
    datatree::enable_determinism();

    let tree = InMemoryDataTree::new(DataTreeConfiguration::default(), schema()).unwrap();
    let modification = tree.take_snapshot().new_modification();
    for key in 0..n {
        modification
            .write(&entry_path(key), entry(key, &format!("entry-{key}")))
            .unwrap();
    }
    modification.ready().unwrap();
    tree.commit(&tree.prepare(&modification).unwrap()).unwrap();
    tree
}

/// A sealed modification touching `edits` random entries of a tree holding `n`.
fn setup_modification(n: u64, edits: usize) -> (InMemoryDataTree, DataTreeModification) {
    let tree = setup_tree(n);
    let mut rng = StdRng::seed_from_u64(42);
    let modification = tree.take_snapshot().new_modification();
    for _ in 0..edits {
        let key = rng.random_range(0..n);
        modification
            .write(&entry_path(key), entry(key, &format!("updated-{key}")))
            .unwrap();
    }
    modification.ready().unwrap();
    (tree, modification)
}

#[library_benchmark]
#[bench::medium(setup_modification(255, 16))]
fn commit_updates((tree, modification): (InMemoryDataTree, DataTreeModification)) {
    let tree = black_box(tree);
    tree.validate(&modification).unwrap();
    let candidate = tree.prepare(&modification).unwrap();
    tree.commit(&candidate).unwrap();
    black_box(tree);
}

#[library_benchmark]
#[bench::medium(setup_modification(255, 16))]
fn prepare_updates((tree, modification): (InMemoryDataTree, DataTreeModification)) {
    let tree = black_box(tree);
    let candidate = tree.prepare(&modification).unwrap();
    black_box(candidate);
}

#[library_benchmark]
#[bench::medium(setup_tree(255))]
fn seal_writes(tree: InMemoryDataTree) {
    let modification = black_box(tree).take_snapshot().new_modification();
    for key in 0..16 {
        modification.write(&entry_path(key), entry(key, "sealed")).unwrap();
    }
    modification.ready().unwrap();
    black_box(modification);
}

#[library_benchmark]
#[bench::medium(setup_tree(255))]
fn read_snapshot(tree: InMemoryDataTree) {
    let snapshot = black_box(tree).take_snapshot();
    black_box(snapshot.read_node(&entry_path(128)));
}

library_benchmark_group!(
    name = commits;
    benchmarks = commit_updates, prepare_updates
);
library_benchmark_group!(
    name = modifications;
    benchmarks = seal_writes, read_snapshot
);

#[cfg(target_os = "linux")]
main!(library_benchmark_groups = commits, modifications);

#[cfg(not(target_os = "linux"))]
fn main() {}
