//! Length-delimited protobuf encoding of metric families, and a text rendering for debugging.

use std::fmt::Write as _;

use prost::Message;

use crate::error::EncodeError;
use crate::proto::{LabelPair, Metric, MetricFamily};

/// Encodes metric families as a stream of length-delimited protobuf messages.
///
/// Each family is written as a varint length prefix followed by the encoded `MetricFamily`
/// message, so the stream can be split back into its messages without any outer framing.
pub fn encode_delimited(families: &[MetricFamily]) -> Result<Vec<u8>, EncodeError> {
    let capacity = families
        .iter()
        .map(|family| {
            let len = family.encoded_len();
            len + prost::length_delimiter_len(len)
        })
        .sum();

    let mut output = Vec::with_capacity(capacity);
    for family in families {
        family.encode_length_delimited(&mut output)?;
    }

    Ok(output)
}

/// Decodes a stream of length-delimited `MetricFamily` messages.
pub fn decode_delimited(mut buf: &[u8]) -> Result<Vec<MetricFamily>, prost::DecodeError> {
    let mut families = Vec::new();
    while !buf.is_empty() {
        families.push(MetricFamily::decode_length_delimited(&mut buf)?);
    }

    Ok(families)
}

/// Renders metric families in a human-readable block form.
///
/// The output mirrors the protobuf text format and is meant for logging only.
pub fn render_text(families: &[MetricFamily]) -> Result<String, EncodeError> {
    let mut buffer = String::new();
    let mut floats = ryu::Buffer::new();

    for family in families {
        writeln!(buffer, "name: {:?}", family.family_name())?;
        if let Some(help) = family.help.as_deref() {
            writeln!(buffer, "help: {help:?}")?;
        }
        writeln!(buffer, "type: {}", family.metric_type().as_str_name())?;

        for metric in &family.metric {
            buffer.push_str("metric {\n");
            for label in &metric.label {
                write_label(&mut buffer, label)?;
            }
            write_values(&mut buffer, &mut floats, metric);
            if let Some(ts) = metric.timestamp_ms {
                writeln!(buffer, "  timestamp_ms: {ts}")?;
            }
            buffer.push_str("}\n");
        }
    }

    Ok(buffer)
}

fn write_label(buffer: &mut String, label: &LabelPair) -> std::fmt::Result {
    writeln!(
        buffer,
        "  label {{ name: {:?} value: {:?} }}",
        label.name.as_deref().unwrap_or_default(),
        label.value.as_deref().unwrap_or_default(),
    )
}

fn write_values(buffer: &mut String, floats: &mut ryu::Buffer, metric: &Metric) {
    let kinds = [
        ("gauge", metric.gauge.as_ref().map(|g| g.value)),
        ("counter", metric.counter.as_ref().map(|c| c.value)),
        ("untyped", metric.untyped.as_ref().map(|u| u.value)),
    ];

    for (kind, value) in kinds {
        let Some(value) = value else { continue };

        buffer.push_str("  ");
        buffer.push_str(kind);
        buffer.push_str(" {");
        if let Some(value) = value {
            buffer.push_str(" value: ");
            buffer.push_str(floats.format(value));
        }
        buffer.push_str(" }\n");
    }
}
