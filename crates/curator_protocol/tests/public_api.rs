//! Exercises the crate through its re-exports only.

use curator_protocol::{
    apply_mutations, Address, LabelMutation, Labels, Pattern, PatternKind, ResourceKind,
};

#[test]
fn pattern_built_from_address_matches_only_itself() {
    let address = Address::parse("projects/p/apis/a/versions/v1").unwrap();
    let pattern = Pattern::from(&address);

    assert_eq!(pattern.wildcard_count(), 0);
    assert!(pattern.matches(&address).unwrap().is_empty());
    assert!(pattern
        .matches_str("projects/p/apis/a/versions/v2")
        .is_none());
}

#[test]
fn qualified_manifest_pattern_round_trips_through_render() {
    let pattern = Pattern::qualify("demo", "apis/-/versions/-/specs/-").unwrap();
    assert_eq!(pattern.kind(), PatternKind::Resource(ResourceKind::Spec));

    let spec = Address::parse("projects/demo/apis/petstore/versions/v1/specs/openapi.yaml").unwrap();
    let captures = pattern.matches(&spec).unwrap();
    assert_eq!(captures.as_slice(), ["petstore", "v1", "openapi.yaml"]);
    assert_eq!(pattern.render(&captures).unwrap(), spec);
}

#[test]
fn label_arguments_parse_and_apply() {
    let mutations: Vec<LabelMutation> = ["tier=gold", "owner=apis"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();

    let mut labels = Labels::new();
    assert!(apply_mutations(&mut labels, &mutations, false));
    assert_eq!(labels.get("tier").map(String::as_str), Some("gold"));
    assert_eq!(labels.len(), 2);
}
