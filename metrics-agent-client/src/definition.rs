use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rapidhash::fast::RapidHasher;

/// Describes a metric series family.
///
/// A definition pairs a metric name with a set of static labels, fixed for every datapoint of the
/// definition, and an ordered list of label keys whose values are supplied each time a datapoint
/// is recorded.
///
/// Common labels are kept sorted by key, so that anything derived from a definition (fingerprints,
/// rendered label sets) does not depend on the order the labels were supplied in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Definition {
    name: String,
    common_labels: BTreeMap<String, String>,
    measured_label_keys: Vec<String>,
}

impl Definition {
    /// Creates a new `Definition` with no labels.
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Adds static labels to the definition.
    ///
    /// A key that is already present is overwritten.
    #[must_use]
    pub fn with_common_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.common_labels.extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Appends label keys whose values are supplied when a datapoint is recorded.
    #[must_use]
    pub fn with_measured_labels<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.measured_label_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Wraps the definition so it can be shared across datapoints.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Name of the series family.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static labels, ordered by key.
    pub fn common_labels(&self) -> &BTreeMap<String, String> {
        &self.common_labels
    }

    /// Label keys supplied at record time, in their defined order.
    pub fn measured_label_keys(&self) -> &[String] {
        &self.measured_label_keys
    }
}

/// A single value of a defined series.
#[derive(Clone, Debug)]
pub struct Datapoint {
    definition: Arc<Definition>,
    value: f64,
    labels: Vec<String>,
}

impl Datapoint {
    /// Creates a datapoint.
    ///
    /// Callers must have already checked that `labels` lines up with the measured label keys of
    /// `definition`.
    pub(crate) fn new(definition: Arc<Definition>, value: f64, labels: Vec<String>) -> Self {
        Self { definition, value, labels }
    }

    /// Definition this datapoint belongs to.
    pub fn definition(&self) -> &Arc<Definition> {
        &self.definition
    }

    /// Recorded value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Measured label values, positionally aligned with the measured label keys.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Computes the identity fingerprint of this datapoint.
    ///
    /// Equal identities always produce equal fingerprints. The converse does not hold, so a
    /// fingerprint match must be confirmed with [`Datapoint::is_same_metric`].
    pub fn fingerprint(&self) -> u64 {
        fingerprint(&self.definition, &self.labels)
    }

    /// Whether both datapoints describe the same series: same name, same common labels, same
    /// measured label keys and same measured label values.
    pub fn is_same_metric(&self, other: &Datapoint) -> bool {
        let same_definition = Arc::ptr_eq(&self.definition, &other.definition)
            || *self.definition == *other.definition;

        same_definition && self.labels == other.labels
    }

    pub(crate) fn overwrite(&mut self, other: Datapoint) {
        self.value = other.value;
        self.labels = other.labels;
    }
}

pub(crate) fn fingerprint<S: AsRef<str>>(definition: &Definition, labels: &[S]) -> u64 {
    let mut hasher = RapidHasher::default();

    definition.name.hash(&mut hasher);
    for (key, value) in &definition.common_labels {
        key.hash(&mut hasher);
        value.hash(&mut hasher);
    }
    definition.measured_label_keys.len().hash(&mut hasher);
    for key in &definition.measured_label_keys {
        key.hash(&mut hasher);
    }
    for label in labels {
        label.as_ref().hash(&mut hasher);
    }

    hasher.finish()
}
