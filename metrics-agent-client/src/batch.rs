use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::definition::{fingerprint, Datapoint, Definition};
use crate::encoding::{encode_delimited, render_text};
use crate::error::{BatchError, EncodeError};
use crate::proto::{LabelPair, Metric, MetricFamily, MetricType};

/// A set of datapoints collected during one collection cycle.
///
/// A batch holds at most one datapoint per series: adding a datapoint for a series that is already
/// present replaces the earlier one in place, keeping its position within the family. Families are
/// kept ordered by name, so serializing the same logical content always yields the same bytes.
#[derive(Debug, Default)]
pub struct Batch {
    datapoints_by_family: BTreeMap<String, Vec<Datapoint>>,
    seen: HashSet<u64>,
}

impl Batch {
    /// Creates an empty `Batch`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a datapoint for `definition`.
    ///
    /// `labels` supplies the values for the measured label keys of the definition, in the same
    /// order.
    ///
    /// ## Errors
    ///
    /// If the number of label values does not match the number of measured label keys, an error
    /// is returned and the batch is left untouched.
    pub fn add_metric<S: AsRef<str>>(
        &mut self,
        definition: &Arc<Definition>,
        value: f64,
        labels: &[S],
    ) -> Result<(), BatchError> {
        let expected = definition.measured_label_keys().len();
        if labels.len() != expected {
            return Err(BatchError::LabelCountMismatch {
                name: definition.name().to_string(),
                expected,
                actual: labels.len(),
            });
        }

        let hash = fingerprint(definition, labels);
        let point = Datapoint::new(
            Arc::clone(definition),
            value,
            labels.iter().map(|label| label.as_ref().to_string()).collect(),
        );

        let points = self.datapoints_by_family.entry(definition.name().to_string()).or_default();

        // The fingerprint only says the series may be present; a hash collision between two
        // different series must still keep both.
        let existing = if self.seen.contains(&hash) {
            points.iter_mut().find(|existing| existing.is_same_metric(&point))
        } else {
            None
        };

        match existing {
            Some(existing) => existing.overwrite(point),
            None => points.push(point),
        }
        self.seen.insert(hash);

        Ok(())
    }

    /// Returns `true` if the batch holds no datapoints.
    pub fn is_empty(&self) -> bool {
        self.datapoints_by_family.values().all(Vec::is_empty)
    }

    /// Returns the number of datapoints across all families.
    pub fn len(&self) -> usize {
        self.datapoints_by_family.values().map(Vec::len).sum()
    }

    /// Returns the datapoints of the given family, in insertion order.
    pub fn datapoints(&self, family: &str) -> &[Datapoint] {
        self.datapoints_by_family.get(family).map_or(&[], Vec::as_slice)
    }

    /// Converts the batch into metric families.
    ///
    /// One family is produced per metric name, ordered by name. Each datapoint becomes a gauge
    /// whose labels are the common labels of its definition merged with its measured labels,
    /// ordered by label name. Every value is reported as a gauge, whatever its origin.
    pub fn metric_families(&self) -> Vec<MetricFamily> {
        self.datapoints_by_family
            .iter()
            .filter(|(_, points)| !points.is_empty())
            .map(|(name, points)| {
                let metrics = points.iter().map(datapoint_to_metric).collect();
                MetricFamily::new(name.clone(), MetricType::Gauge, metrics)
            })
            .collect()
    }

    /// Returns the batch as a stream of length-delimited protobuf messages.
    pub fn bytes(&self) -> Result<Vec<u8>, EncodeError> {
        self.serialize(false)
    }

    /// Serializes the batch, either as length-delimited protobuf or as debugging text.
    pub fn serialize(&self, as_text: bool) -> Result<Vec<u8>, EncodeError> {
        let families = self.metric_families();
        if as_text {
            render_text(&families).map(String::into_bytes)
        } else {
            encode_delimited(&families)
        }
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = render_text(&self.metric_families()).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

fn datapoint_to_metric(point: &Datapoint) -> Metric {
    let definition = point.definition();

    let mut label_pairs: Vec<LabelPair> = definition
        .common_labels()
        .iter()
        .map(|(key, value)| LabelPair::new(key.as_str(), value.as_str()))
        .chain(
            definition
                .measured_label_keys()
                .iter()
                .zip(point.labels())
                .map(|(key, value)| LabelPair::new(key.as_str(), value.as_str())),
        )
        .collect();
    label_pairs.sort_by(|a, b| a.name.cmp(&b.name));

    Metric::gauge(label_pairs, point.value())
}
