// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use super::validation::{enforce_mandatory, mandatory_descendants};
use crate::{
    config::DataTreeConfiguration,
    data::{InstanceIdentifier, NormalizedNode, PathArgument, QName},
    error::DataTreeError,
    schema::{CaseSchema, Descendant},
};

/// What a choice needs to know about one of its cases.
pub(super) struct CaseEnforcer {
    name: QName,
    children: Vec<QName>,
    mandatory: Vec<Descendant>,
}

impl CaseEnforcer {
    pub(super) fn for_cases(cases: &[CaseSchema], config: &DataTreeConfiguration) -> Vec<Self> {
        cases
            .iter()
            .map(|case| Self {
                name: case.name().clone(),
                children: case
                    .children()
                    .iter()
                    .filter(|child| config.admits(child.is_config()))
                    .map(|child| child.name().clone())
                    .collect(),
                mandatory: if config.mandatory_nodes_validation() {
                    mandatory_descendants(case.children(), config)
                } else {
                    Vec::new()
                },
            })
            .collect()
    }
}

/// Checks that only one case of `choice` is populated, and that it is complete.
///
/// The case is selected by the first child of the choice.
pub(super) fn enforce_cases(
    cases: &[CaseEnforcer],
    path: &InstanceIdentifier,
    choice: &NormalizedNode,
) -> Result<(), DataTreeError> {
    let Some(first) = choice.children().next() else {
        return Ok(());
    };
    let selected = cases
        .iter()
        .find(|case| case.children.contains(first.identifier().node_type()))
        .ok_or_else(|| {
            DataTreeError::schema(format!(
                "Child {} of choice {} does not belong to any case in this tree",
                first.identifier(),
                choice.identifier()
            ))
        })?;

    for other in cases.iter().filter(|case| case.name != selected.name) {
        for name in &other.children {
            if choice.child(&PathArgument::node(name.clone())).is_some() {
                return Err(DataTreeError::schema(format!(
                    "Child {} (from case {}) implies non-presence of child {} (from case {})",
                    first.identifier(),
                    selected.name,
                    name,
                    other.name
                )));
            }
        }
    }
    enforce_mandatory(&selected.mandatory, path, choice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaNode;

    fn cases() -> Vec<CaseEnforcer> {
        let schema = [
            CaseSchema::new("tcp", [SchemaNode::leaf("port").mandatory(), SchemaNode::leaf("nodelay")]),
            CaseSchema::new("udp", [SchemaNode::leaf("datagram-size")]),
        ];
        CaseEnforcer::for_cases(&schema, &DataTreeConfiguration::default())
    }

    #[test]
    fn cases_are_mutually_exclusive() {
        let choice = NormalizedNode::choice("transport")
            .with_child(NormalizedNode::leaf("port", 80))
            .with_child(NormalizedNode::leaf("datagram-size", 512))
            .build();
        let err = enforce_cases(&cases(), &InstanceIdentifier::of(["transport"]), &choice)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "schema validation failed: Child port (from case tcp) implies non-presence of child \
             datagram-size (from case udp)"
        );
    }

    #[test]
    fn selected_case_must_be_complete() {
        let choice = NormalizedNode::choice("transport")
            .with_child(NormalizedNode::leaf("nodelay", true))
            .build();
        let err = enforce_cases(&cases(), &InstanceIdentifier::of(["transport"]), &choice)
            .unwrap_err();
        assert_eq!(
            err,
            DataTreeError::MandatoryMissing {
                path: InstanceIdentifier::of(["transport"]),
                descendant: InstanceIdentifier::of(["port"]),
            }
        );

        let empty = NormalizedNode::choice("transport").build();
        assert!(enforce_cases(&cases(), &InstanceIdentifier::root(), &empty).is_ok());
    }
}
