use crate::models::Labels;

const LABEL_OWNER: &str = "blame";
const LABEL_OWNER_VALUE: &str = "atgdumps";
const LABEL_SET: &str = "set";

/// The label stamped on every network, image and container we create.
pub fn ownership_label() -> Labels {
    let mut labels = Labels::new();
    labels.insert(LABEL_OWNER.into(), LABEL_OWNER_VALUE.into());
    labels
}

pub fn set_label(set: &str) -> Labels {
    let mut labels = Labels::new();
    labels.insert(LABEL_SET.into(), set.into());
    labels
}

/// Ownership and set label together, for resources that belong to a set.
pub fn resource_labels(set: &str) -> Labels {
    let mut labels = ownership_label();
    labels.extend(set_label(set));
    labels
}

/// True if every wanted label is present in `actual` with the same value.
/// Extra labels in `actual` are ignored.
pub fn has_labels(actual: &Labels, wanted: &Labels) -> bool {
    wanted
        .iter()
        .all(|(key, value)| actual.get(key) == Some(value))
}

pub fn set_of(labels: &Labels) -> Option<&str> {
    labels.get(LABEL_SET).map(|set| set.as_str())
}
