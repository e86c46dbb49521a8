//! Metric family messages of the `io.prometheus.client` protobuf schema.
//!
//! Only the subset of the schema the agent produces or inspects is modeled: label pairs and the
//! single-value metric kinds. Field numbers match `metrics.proto`, so the messages stay wire
//! compatible with anything that speaks the delimited metric family protocol.
#![allow(missing_docs)]

/// Content type of a stream of length-delimited `MetricFamily` messages.
pub const DELIMITED_CONTENT_TYPE: &str =
    "application/vnd.google.protobuf; proto=io.prometheus.client.MetricFamily; encoding=delimited";

/// A label pair.
///
/// .proto:
/// ```protobuf
/// message LabelPair {
///   optional string name  = 1;
///   optional string value = 2;
/// }
/// ```
#[derive(prost::Message, Clone, PartialEq, Eq, Hash)]
pub struct LabelPair {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

impl LabelPair {
    /// Creates a label pair from a name and a value.
    pub fn new<N, V>(name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Self { name: Some(name.into()), value: Some(value.into()) }
    }
}

/// A gauge value.
#[derive(prost::Message, Clone, PartialEq)]
pub struct Gauge {
    #[prost(double, optional, tag = "1")]
    pub value: Option<f64>,
}

/// A counter value.
#[derive(prost::Message, Clone, PartialEq)]
pub struct Counter {
    #[prost(double, optional, tag = "1")]
    pub value: Option<f64>,
}

/// An untyped value.
#[derive(prost::Message, Clone, PartialEq)]
pub struct Untyped {
    #[prost(double, optional, tag = "1")]
    pub value: Option<f64>,
}

/// A single labeled value within a family.
///
/// .proto:
/// ```protobuf
/// message Metric {
///   repeated LabelPair label        = 1;
///   optional Gauge     gauge        = 2;
///   optional Counter   counter      = 3;
///   optional Untyped   untyped      = 5;
///   optional int64     timestamp_ms = 6;
/// }
/// ```
#[derive(prost::Message, Clone, PartialEq)]
pub struct Metric {
    #[prost(message, repeated, tag = "1")]
    pub label: Vec<LabelPair>,
    #[prost(message, optional, tag = "2")]
    pub gauge: Option<Gauge>,
    #[prost(message, optional, tag = "3")]
    pub counter: Option<Counter>,
    #[prost(message, optional, tag = "5")]
    pub untyped: Option<Untyped>,
    #[prost(int64, optional, tag = "6")]
    pub timestamp_ms: Option<i64>,
}

impl Metric {
    /// Creates a gauge metric with the given labels and value.
    pub fn gauge(label: Vec<LabelPair>, value: f64) -> Self {
        Self { label, gauge: Some(Gauge { value: Some(value) }), ..Default::default() }
    }

    /// Creates a counter metric with the given labels and value.
    pub fn counter(label: Vec<LabelPair>, value: f64) -> Self {
        Self { label, counter: Some(Counter { value: Some(value) }), ..Default::default() }
    }

    /// Returns a mutable reference to whichever single value this metric carries.
    ///
    /// Gauge wins over counter, counter over untyped. Returns `None` when no single-value kind is
    /// set.
    pub fn single_value_mut(&mut self) -> Option<&mut f64> {
        if let Some(gauge) = self.gauge.as_mut() {
            return gauge.value.as_mut();
        }
        if let Some(counter) = self.counter.as_mut() {
            return counter.value.as_mut();
        }
        self.untyped.as_mut().and_then(|u| u.value.as_mut())
    }
}

/// Metric type tag of a family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MetricType {
    Counter = 0,
    Gauge = 1,
    Summary = 2,
    Untyped = 3,
    Histogram = 4,
}

impl MetricType {
    /// Returns the schema name of this type, as used in the text format.
    pub fn as_str_name(self) -> &'static str {
        match self {
            MetricType::Counter => "COUNTER",
            MetricType::Gauge => "GAUGE",
            MetricType::Summary => "SUMMARY",
            MetricType::Untyped => "UNTYPED",
            MetricType::Histogram => "HISTOGRAM",
        }
    }
}

/// All metrics sharing one name.
///
/// .proto:
/// ```protobuf
/// message MetricFamily {
///   optional string     name   = 1;
///   optional string     help   = 2;
///   optional MetricType type   = 3;
///   repeated Metric     metric = 4;
/// }
/// ```
#[derive(prost::Message, Clone, PartialEq)]
pub struct MetricFamily {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub help: Option<String>,
    #[prost(enumeration = "MetricType", optional, tag = "3")]
    pub r#type: Option<i32>,
    #[prost(message, repeated, tag = "4")]
    pub metric: Vec<Metric>,
}

impl MetricFamily {
    /// Creates a family with the given name, type and metrics.
    pub fn new<N: Into<String>>(name: N, metric_type: MetricType, metric: Vec<Metric>) -> Self {
        Self { name: Some(name.into()), help: None, r#type: Some(metric_type as i32), metric }
    }

    /// Returns the metric type of this family, falling back to `Untyped` for unknown tags.
    pub fn metric_type(&self) -> MetricType {
        self.r#type.and_then(|t| MetricType::try_from(t).ok()).unwrap_or(MetricType::Untyped)
    }

    /// Returns the family name, or an empty string when unset.
    pub fn family_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}
