//! Metadata codec: the instance spec as a flat annotation bag
//!
//! The bag is the only place a spec survives in the store, and every
//! resource of an instance carries an identical copy. The key set below is
//! a wire format; renaming a key orphans every existing instance.
//!
//! List fields are joined with a single space. Decoding splits on a single
//! space without filtering, so an empty list comes back as `[""]`.

use std::collections::BTreeMap;

use pair_common::{OWNERSHIP_LABEL_KEY, OWNERSHIP_LABEL_VALUE};

use crate::spec::{InstanceSpec, InstanceType, SetupSpec};

/// Annotation key for one spec field
macro_rules! spec_annotation {
    ($field:literal) => {
        concat!("io.sharing.pair-spec-", $field)
    };
}

/// `spec.name`
pub const ANNOTATION_NAME: &str = spec_annotation!("name");
/// `spec.nodeSize`
pub const ANNOTATION_NODE_SIZE: &str = spec_annotation!("nodeSize");
/// `spec.facility`
pub const ANNOTATION_FACILITY: &str = spec_annotation!("facility");
/// `spec.setup.user`
pub const ANNOTATION_SETUP_USER: &str = spec_annotation!("setup-user");
/// `spec.setup.guests`, space-joined
pub const ANNOTATION_SETUP_GUESTS: &str = spec_annotation!("setup-guests");
/// `spec.setup.repos`, space-joined
pub const ANNOTATION_SETUP_REPOS: &str = spec_annotation!("setup-repos");
/// `spec.setup.timezone`
pub const ANNOTATION_SETUP_TIMEZONE: &str = spec_annotation!("setup-timezone");
/// `spec.setup.fullname`
pub const ANNOTATION_SETUP_FULLNAME: &str = spec_annotation!("setup-fullname");
/// `spec.setup.email`
pub const ANNOTATION_SETUP_EMAIL: &str = spec_annotation!("setup-email");

const LIST_SEPARATOR: &str = " ";

/// Encode a spec into its annotation bag
pub fn encode(spec: &InstanceSpec) -> BTreeMap<String, String> {
    let setup = &spec.setup;
    [
        (ANNOTATION_NAME, spec.name.clone()),
        (ANNOTATION_NODE_SIZE, spec.node_size.clone()),
        (ANNOTATION_FACILITY, spec.facility.clone()),
        (ANNOTATION_SETUP_USER, setup.user.clone()),
        (ANNOTATION_SETUP_GUESTS, setup.guests.join(LIST_SEPARATOR)),
        (ANNOTATION_SETUP_REPOS, setup.repos.join(LIST_SEPARATOR)),
        (ANNOTATION_SETUP_TIMEZONE, setup.timezone.clone()),
        (ANNOTATION_SETUP_FULLNAME, setup.fullname.clone()),
        (ANNOTATION_SETUP_EMAIL, setup.email.clone()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Decode a (possibly partial) spec from an annotation bag
///
/// Missing keys decode like empty values. The type is not part of the
/// bag; every instance reads back as `Kubernetes`, the only topology the
/// expander builds.
pub fn decode(annotations: &BTreeMap<String, String>) -> InstanceSpec {
    let get = |key: &str| annotations.get(key).cloned().unwrap_or_default();
    let split = |key: &str| {
        annotations
            .get(key)
            .map(String::as_str)
            .unwrap_or_default()
            .split(LIST_SEPARATOR)
            .map(str::to_string)
            .collect::<Vec<_>>()
    };

    InstanceSpec {
        name: get(ANNOTATION_NAME),
        instance_type: Some(InstanceType::Kubernetes),
        node_size: get(ANNOTATION_NODE_SIZE),
        facility: get(ANNOTATION_FACILITY),
        setup: SetupSpec {
            user: get(ANNOTATION_SETUP_USER),
            guests: split(ANNOTATION_SETUP_GUESTS),
            repos: split(ANNOTATION_SETUP_REPOS),
            timezone: get(ANNOTATION_SETUP_TIMEZONE),
            fullname: get(ANNOTATION_SETUP_FULLNAME),
            email: get(ANNOTATION_SETUP_EMAIL),
        },
    }
}

/// Instance name recorded on a resource, if any
pub fn instance_name(annotations: &BTreeMap<String, String>) -> Option<&str> {
    annotations
        .get(ANNOTATION_NAME)
        .map(String::as_str)
        .filter(|n| !n.is_empty())
}

/// Owning user recorded on a resource, if any
pub fn instance_user(annotations: &BTreeMap<String, String>) -> Option<&str> {
    annotations.get(ANNOTATION_SETUP_USER).map(String::as_str)
}

/// True only when the ownership label is present with the exact value
pub fn is_owned(labels: &BTreeMap<String, String>) -> bool {
    labels.get(OWNERSHIP_LABEL_KEY).map(String::as_str) == Some(OWNERSHIP_LABEL_VALUE)
}

/// Ownership label to stamp on every resource
pub fn ownership_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        OWNERSHIP_LABEL_KEY.to_string(),
        OWNERSHIP_LABEL_VALUE.to_string(),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> InstanceSpec {
        InstanceSpec {
            name: "alice-3f2a9c1d".to_string(),
            instance_type: Some(InstanceType::Kubernetes),
            node_size: "c3.small.x86".to_string(),
            facility: "sjc1".to_string(),
            setup: SetupSpec {
                user: "alice".to_string(),
                guests: vec!["bob".to_string(), "carol".to_string()],
                repos: vec!["https://github.com/alice/project".to_string()],
                timezone: "UTC".to_string(),
                fullname: "Alice A".to_string(),
                email: "alice@example.com".to_string(),
            },
        }
    }

    #[test]
    fn encodes_the_fixed_key_set() {
        let bag = encode(&spec());
        assert_eq!(bag.len(), 9);
        assert_eq!(bag[ANNOTATION_SETUP_GUESTS], "bob carol");
        assert_eq!(bag[ANNOTATION_SETUP_REPOS], "https://github.com/alice/project");
        assert_eq!(bag[ANNOTATION_NODE_SIZE], "c3.small.x86");
        assert!(bag.keys().all(|k| k.starts_with(spec_annotation!(""))));
    }

    #[test]
    fn decode_restores_every_encoded_field() {
        let original = spec();
        let decoded = decode(&encode(&original));
        assert_eq!(decoded.name, original.name);
        assert_eq!(decoded.node_size, original.node_size);
        assert_eq!(decoded.facility, original.facility);
        assert_eq!(decoded.setup, original.setup);
        assert_eq!(decoded.instance_type, Some(InstanceType::Kubernetes));
    }

    #[test]
    fn empty_lists_decode_to_a_single_empty_string() {
        let mut original = spec();
        original.setup.guests.clear();
        original.setup.repos.clear();

        let bag = encode(&original);
        assert_eq!(bag[ANNOTATION_SETUP_GUESTS], "");

        let decoded = decode(&bag);
        assert_eq!(decoded.setup.guests, vec![String::new()]);
        assert_eq!(decoded.setup.repos, vec![String::new()]);
    }

    #[test]
    fn missing_keys_decode_as_empty() {
        let decoded = decode(&BTreeMap::new());
        assert!(decoded.name.is_empty());
        assert_eq!(decoded.setup.guests, vec![String::new()]);
    }

    #[test]
    fn name_and_user_lookups() {
        let bag = encode(&spec());
        assert_eq!(instance_name(&bag), Some("alice-3f2a9c1d"));
        assert_eq!(instance_user(&bag), Some("alice"));
        assert_eq!(instance_name(&BTreeMap::new()), None);
    }

    #[test]
    fn ownership_requires_exact_label_value() {
        assert!(is_owned(&ownership_labels()));

        let mut labels = ownership_labels();
        labels.insert(OWNERSHIP_LABEL_KEY.to_string(), "true".to_string());
        assert!(!is_owned(&labels));
        assert!(!is_owned(&BTreeMap::new()));
    }
}
