//! Unit tests for VM selection filters.

use std::collections::HashMap;

use rstest::rstest;

use super::*;

fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

#[rstest]
#[case("ACTIVE", true)]
#[case("shutoff", true)]
#[case("PAUSED", true)]
#[case("SUSPENDED", true)]
#[case("ERROR", false)]
#[case("DELETED", false)]
#[case("BUILD", false)]
fn supported_statuses_exclude_error_and_deleted(#[case] status: &str, #[case] expected: bool) {
    assert_eq!(is_backup_supported(status), expected);
}

#[test]
fn tag_predicates_parse_keys_and_values() {
    let parsed = parse_tag_predicates("backup:true, nightly").expect("valid filter");
    assert_eq!(
        parsed,
        vec![
            TagPredicate {
                key: String::from("backup"),
                value: Some(String::from("true")),
            },
            TagPredicate {
                key: String::from("nightly"),
                value: None,
            },
        ]
    );
}

#[test]
fn tag_predicates_reject_missing_keys() {
    let err = parse_tag_predicates("backup:true,:x").expect_err("empty key");
    assert!(matches!(err, SelectionError::EmptyTagKey { .. }));
}

#[test]
fn blank_tag_filter_yields_no_predicates() {
    assert!(parse_tag_predicates("  ").expect("blank").is_empty());
}

#[rstest]
#[case(&["backup"], &[], true)]
#[case(&[], &[("backup", "true")], true)]
#[case(&[], &[("backup", "false")], false)]
#[case(&["other"], &[], false)]
fn predicate_matches_tag_or_metadata(
    #[case] tags: &[&str],
    #[case] meta: &[(&str, &str)],
    #[case] expected: bool,
) {
    let predicate = TagPredicate {
        key: String::from("backup"),
        value: Some(String::from("true")),
    };
    let tag_list = tags.iter().map(|tag| (*tag).to_owned()).collect::<Vec<_>>();
    assert_eq!(predicate.matches(&tag_list, &metadata(meta)), expected);
}

#[test]
fn key_only_predicate_matches_any_metadata_value() {
    let predicate = TagPredicate {
        key: String::from("owner"),
        value: None,
    };
    assert!(predicate.matches(&[], &metadata(&[("owner", "ops")])));
}

#[test]
fn trailing_colon_matches_only_empty_metadata_value() {
    let predicates =
        parse_tag_predicates("owner:").unwrap_or_else(|err| panic!("parse: {err}"));
    let [predicate] = predicates.as_slice() else {
        panic!("expected one predicate, got {predicates:?}");
    };
    assert!(predicate.matches(&[], &metadata(&[("owner", "")])));
    assert!(!predicate.matches(&[], &metadata(&[("owner", "ops")])));
}

#[test]
fn filter_applies_name_glob() {
    let filter = VmFilter::new(Some("prod-*"), None).expect("valid glob");
    assert!(filter.matches_name("prod-web"));
    assert!(!filter.matches_name("staging-web"));
    assert_eq!(filter.name_pattern(), Some("prod-*"));
}

#[test]
fn empty_filter_matches_everything() {
    let filter = VmFilter::new(Some(""), Some("")).expect("blank inputs");
    assert!(filter.matches_name("anything"));
    assert!(!filter.has_tag_predicates());
    assert!(filter.matches_tags(&[], &HashMap::new()));
}

#[test]
fn filter_rejects_invalid_glob() {
    let err = VmFilter::new(Some("[oops"), None).expect_err("unclosed class");
    assert!(matches!(err, SelectionError::InvalidPattern { .. }));
}

#[test]
fn filter_requires_all_tag_predicates() {
    let filter = VmFilter::new(None, Some("backup:true,tier:gold")).expect("valid tags");
    let meta = metadata(&[("backup", "true")]);
    assert!(!filter.matches_tags(&[], &meta));
    let both = metadata(&[("backup", "true"), ("tier", "gold")]);
    assert!(filter.matches_tags(&[], &both));
}
