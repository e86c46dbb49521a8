use metrics_agent_client::proto::MetricFamily;
use tracing::error;

use super::{NODE_CPU, SONAR_CPU};
use crate::Decorator;

/// Renames the CPU time family and rewrites its zero-based `cpu` label values (`0`, `1`, ...) into
/// one-based names (`cpu1`, `cpu2`, ...).
///
/// The family is recognized under its collector name or, if [`Names`](super::Names) already ran,
/// under its backend name. Values that are not integers are logged and left as they are.
///
/// Matching the backend name is a deliberate change from earlier agents. Those ran the rename
/// first, never relabeled, and sent the raw `cpu="0"` values.
#[derive(Clone, Copy, Debug, Default)]
pub struct Cpu;

impl Decorator for Cpu {
    fn decorate(&self, families: &mut [MetricFamily]) {
        for family in families {
            let name = family.family_name();
            if !name.eq_ignore_ascii_case(NODE_CPU) && !name.eq_ignore_ascii_case(SONAR_CPU) {
                continue;
            }

            family.name = Some(SONAR_CPU.to_string());
            let labels = family.metric.iter_mut().flat_map(|metric| metric.label.iter_mut());
            for label in labels {
                if !label.name.as_deref().unwrap_or_default().eq_ignore_ascii_case("cpu") {
                    continue;
                }

                let raw = label.value.as_deref().unwrap_or_default();
                match raw.parse::<i64>() {
                    Ok(index) => label.value = Some(format!("cpu{}", index + 1)),
                    Err(e) => error!(value = raw, error = %e, "Failed to parse CPU number."),
                }
            }
        }
    }

    fn name(&self) -> &str {
        "cpu"
    }
}
