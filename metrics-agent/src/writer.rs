use std::fmt::Write as _;
use std::future::Future;
use std::io;
use std::time::Duration;

use metrics_agent_client::proto::{Metric, MetricFamily, MetricType};
use metrics_agent_client::{
    Batch, BatchError, Definition, HttpTransport, HyperTransport, PushClient, SendError,
};
use thiserror::Error;
use tracing::trace;

/// Wait between two writes of a [`FileWriter`].
pub const FILE_WRITE_INTERVAL: Duration = Duration::from_secs(10);

/// Errors that could occur while writing metrics.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Writing to the output failed.
    #[error("failed to write metrics: {0}")]
    Io(#[from] io::Error),

    /// A metric could not be added to the batch.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// The batch could not be sent.
    #[error(transparent)]
    Send(#[from] SendError),
}

impl WriteError {
    /// Whether the write was refused because the previous one was too recent.
    pub fn is_too_frequent(&self) -> bool {
        matches!(self, WriteError::Send(SendError::TooFrequent { .. }))
    }
}

/// A destination for collected metrics.
pub trait MetricWriter {
    /// Writes the given families.
    fn write(
        &mut self,
        families: &[MetricFamily],
    ) -> impl Future<Output = Result<(), WriteError>>;

    /// Returns how long to wait before the next write.
    fn wait_duration(&self) -> Duration;

    /// Name of this writer, for diagnostics.
    fn name(&self) -> &str;
}

/// Writes one line of text per metric to an [`io::Write`].
pub struct FileWriter<W> {
    out: W,
}

impl FileWriter<io::Stdout> {
    /// Creates a `FileWriter` writing to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: io::Write> FileWriter<W> {
    /// Creates a new `FileWriter`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consumes the writer, returning the underlying output.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: io::Write> MetricWriter for FileWriter<W> {
    async fn write(&mut self, families: &[MetricFamily]) -> Result<(), WriteError> {
        let mut floats = ryu::Buffer::new();
        let mut line = String::new();

        for family in families {
            for metric in &family.metric {
                line.clear();
                format_line(&mut line, &mut floats, family, metric);
                self.out.write_all(line.as_bytes())?;
            }
        }

        self.out.flush()?;
        Ok(())
    }

    fn wait_duration(&self) -> Duration {
        FILE_WRITE_INTERVAL
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Formats a metric as `[TYPE]: name: label:<name:"k" value:"v" > gauge:<value:1.5 >`.
fn format_line(
    buffer: &mut String,
    floats: &mut ryu::Buffer,
    family: &MetricFamily,
    metric: &Metric,
) {
    buffer.push('[');
    buffer.push_str(family.metric_type().as_str_name());
    buffer.push_str("]: ");
    buffer.push_str(family.family_name());
    buffer.push(':');

    for label in &metric.label {
        // Writing to a String cannot fail.
        let _ = write!(
            buffer,
            " label:<name:{:?} value:{:?} >",
            label.name.as_deref().unwrap_or_default(),
            label.value.as_deref().unwrap_or_default(),
        );
    }

    let kinds = [
        ("gauge", metric.gauge.as_ref().map(|g| g.value)),
        ("counter", metric.counter.as_ref().map(|c| c.value)),
        ("untyped", metric.untyped.as_ref().map(|u| u.value)),
    ];
    for (kind, value) in kinds {
        let Some(value) = value else { continue };

        buffer.push(' ');
        buffer.push_str(kind);
        buffer.push_str(":<");
        if let Some(value) = value {
            buffer.push_str("value:");
            buffer.push_str(floats.format(value));
            buffer.push(' ');
        }
        buffer.push('>');
    }

    buffer.push('\n');
}

/// Pushes metrics to the ingestion service.
///
/// Every write builds a fresh [`Batch`], so each push carries exactly the families of one
/// collection cycle.
pub struct SonarWriter<T = HyperTransport> {
    client: PushClient<T>,
}

impl<T: HttpTransport> SonarWriter<T> {
    /// Creates a new `SonarWriter` pushing through `client`.
    pub fn new(client: PushClient<T>) -> Self {
        Self { client }
    }

    /// Returns the underlying push client.
    pub fn client(&self) -> &PushClient<T> {
        &self.client
    }
}

impl<T: HttpTransport> MetricWriter for SonarWriter<T> {
    async fn write(&mut self, families: &[MetricFamily]) -> Result<(), WriteError> {
        let batch = to_batch(families)?;
        self.client.send_metrics(&batch).await?;
        Ok(())
    }

    fn wait_duration(&self) -> Duration {
        self.client.wait_duration()
    }

    fn name(&self) -> &str {
        "sonar"
    }
}

/// Converts metric families into a batch.
///
/// Every label of a metric becomes a common label of its definition. Only single-value kinds are
/// carried over; summaries, histograms and metrics without a value are skipped.
pub fn to_batch(families: &[MetricFamily]) -> Result<Batch, BatchError> {
    let mut batch = Batch::new();

    for family in families {
        let metric_type = family.metric_type();
        for metric in &family.metric {
            let Some(value) = single_value(metric_type, metric) else {
                trace!(
                    family = family.family_name(),
                    ?metric_type,
                    "Skipping metric without a single value."
                );
                continue;
            };

            let labels = metric.label.iter().map(|label| {
                (
                    label.name.clone().unwrap_or_default(),
                    label.value.clone().unwrap_or_default(),
                )
            });
            let definition =
                Definition::new(family.family_name()).with_common_labels(labels).shared();
            batch.add_metric(&definition, value, &[] as &[&str])?;
        }
    }

    Ok(batch)
}

fn single_value(metric_type: MetricType, metric: &Metric) -> Option<f64> {
    match metric_type {
        MetricType::Gauge => metric.gauge.as_ref()?.value,
        MetricType::Counter => metric.counter.as_ref()?.value,
        MetricType::Untyped => metric.untyped.as_ref()?.value,
        MetricType::Summary | MetricType::Histogram => None,
    }
}
