// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use datatree::{
    Candidate, DataTreeConfiguration, DataTreeModification, InMemoryDataTree, InstanceIdentifier,
    ModificationType, NormalizedNode, PathArgument, candidate,
    schema::{SchemaContext, SchemaNode},
};
use insta::assert_debug_snapshot;

fn schema() -> SchemaContext {
    SchemaContext::new([SchemaNode::container("top")
        .with_child(SchemaNode::leaf("name"))
        .with_child(SchemaNode::leaf("count"))
        .with_child(
            SchemaNode::list("list", ["key"])
                .with_child(SchemaNode::leaf("key"))
                .with_child(SchemaNode::leaf("name")),
        )])
}

fn tree() -> InMemoryDataTree {
    InMemoryDataTree::new(DataTreeConfiguration::default(), schema()).unwrap()
}

fn path(args: &[&str]) -> InstanceIdentifier {
    InstanceIdentifier::of(args.iter().copied())
}

fn prepare(tree: &InMemoryDataTree, edit: impl FnOnce(&DataTreeModification)) -> Candidate {
    let modification = tree.take_snapshot().new_modification();
    edit(&modification);
    modification.ready().unwrap();
    tree.validate(&modification).unwrap();
    tree.prepare(&modification).unwrap()
}

fn entry(key: u64, name: &str) -> NormalizedNode {
    NormalizedNode::map_entry("list", [("key", key)])
        .with_child(NormalizedNode::leaf("name", name))
        .build()
}

#[test]
fn debug_rendering_shows_the_changed_nodes() {
    let tree = tree();
    let seed = prepare(&tree, |m| {
        m.write(&path(&["top", "name"]), NormalizedNode::leaf("name", "a"))
            .unwrap()
    });
    tree.commit(&seed).unwrap();

    let candidate = prepare(&tree, |m| {
        m.write(&path(&["top", "name"]), NormalizedNode::leaf("name", "b"))
            .unwrap()
    });
    assert_debug_snapshot!(candidate, @r#"
    Candidate {
        root_path: /,
        root: CandidateNode {
            identifier: data,
            modification_type: SubtreeModified,
            children: [
                CandidateNode {
                    identifier: top,
                    modification_type: SubtreeModified,
                    children: [
                        CandidateNode {
                            identifier: name,
                            modification_type: Write,
                            after: "b",
                        },
                    ],
                },
            ],
        },
    }
    "#);
}

#[test]
fn candidates_replay_onto_another_tree() {
    let source = tree();
    let replica = tree();

    let candidate = prepare(&source, |m| {
        m.write(&path(&["top", "name"]), NormalizedNode::leaf("name", "a"))
            .unwrap();
        m.write(
            &path(&["top", "list"]).node(PathArgument::entry("list", [("key", 1u64)])),
            entry(1, "x"),
        )
        .unwrap();
    });
    source.commit(&candidate).unwrap();

    let modification = replica.take_snapshot().new_modification();
    candidate::apply_to_modification(&modification, &candidate).unwrap();
    modification.ready().unwrap();
    replica.validate(&modification).unwrap();
    replica.commit(&replica.prepare(&modification).unwrap()).unwrap();

    assert_eq!(
        replica.take_snapshot().read_node(&path(&["top"])),
        source.take_snapshot().read_node(&path(&["top"]))
    );
}

#[test]
fn candidates_replay_through_a_cursor() {
    let source = tree();
    let candidate = prepare(&source, |m| {
        m.write(&path(&["top", "count"]), NormalizedNode::leaf("count", 3u64))
            .unwrap()
    });

    let replica = tree();
    let modification = replica.take_snapshot().new_modification();
    {
        let mut cursor = modification.open_cursor(&InstanceIdentifier::root()).unwrap();
        let top = candidate
            .root_node()
            .modified_child(&PathArgument::node("top"))
            .unwrap();
        candidate::apply_to_cursor(&mut cursor, &top).unwrap();
    }
    assert_eq!(
        modification.read_node(&path(&["top", "count"])).unwrap(),
        Some(NormalizedNode::leaf("count", 3u64))
    );
}

#[test]
fn consecutive_candidates_aggregate() {
    let tree = tree();
    let first = prepare(&tree, |m| {
        m.write(&path(&["top", "name"]), NormalizedNode::leaf("name", "a"))
            .unwrap()
    });
    tree.commit(&first).unwrap();
    let second = prepare(&tree, |m| {
        m.write(&path(&["top", "count"]), NormalizedNode::leaf("count", 1u64))
            .unwrap()
    });
    tree.commit(&second).unwrap();

    let aggregated = candidate::aggregate(vec![first, second]).unwrap();
    let root = aggregated.root_node();
    assert_eq!(root.modification_type(), ModificationType::SubtreeModified);
    assert_eq!(
        root.data_after(),
        tree.take_snapshot()
            .read_node(&InstanceIdentifier::root())
            .as_ref()
    );
    let top = root.modified_child(&PathArgument::node("top")).unwrap();
    assert_eq!(top.modification_type(), ModificationType::Write);

    assert!(candidate::aggregate(Vec::new()).is_err());
}

#[test]
fn user_built_candidates_describe_their_data() {
    let before = NormalizedNode::container("top")
        .with_child(NormalizedNode::leaf("name", "a"))
        .build();
    let after = NormalizedNode::container("top")
        .with_child(NormalizedNode::leaf("name", "b"))
        .with_child(NormalizedNode::leaf("count", 2u64))
        .build();
    let candidate = Candidate::new(
        path(&["top"]),
        datatree::CandidateNode::from_data(PathArgument::node("top"), Some(before), Some(after)),
    );

    let root = candidate.root_node();
    assert_eq!(root.modification_type(), ModificationType::SubtreeModified);
    let changes: Vec<_> = root
        .child_nodes()
        .into_iter()
        .map(|child| (child.identifier().to_string(), child.modification_type()))
        .collect();
    assert_eq!(
        changes,
        [
            ("name".to_string(), ModificationType::Write),
            ("count".to_string(), ModificationType::Write),
        ]
    );
}
