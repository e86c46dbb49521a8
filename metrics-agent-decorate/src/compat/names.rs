use metrics_agent_client::proto::MetricFamily;

use super::{NODE_CPU, SONAR_CPU};
use crate::Decorator;

/// Families that only differ from the backend's in name.
const RENAMES: &[(&str, &str)] = &[
    (NODE_CPU, SONAR_CPU),
    ("node_network_receive_bytes_total", "sonar_network_receive_bytes"),
    ("node_network_transmit_bytes_total", "sonar_network_transmit_bytes"),
    ("node_memory_memtotal_bytes", "sonar_memory_total"),
    ("node_memory_memfree_bytes", "sonar_memory_free"),
    ("node_memory_cached_bytes", "sonar_memory_cached"),
    ("node_filesystem_size_bytes", "sonar_filesystem_size"),
    ("node_filesystem_free_bytes", "sonar_filesystem_free"),
    ("node_load1", "sonar_load1"),
    ("node_load5", "sonar_load5"),
    ("node_load15", "sonar_load15"),
];

/// Renames node-exporter families to their backend names.
///
/// Names are matched ignoring ASCII case. Families without a known counterpart are left alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct Names;

impl Names {
    fn rename(name: &str) -> Option<&'static str> {
        RENAMES.iter().find(|(from, _)| from.eq_ignore_ascii_case(name)).map(|(_, to)| *to)
    }
}

impl Decorator for Names {
    fn decorate(&self, families: &mut [MetricFamily]) {
        for family in families {
            if let Some(renamed) = Self::rename(family.family_name()) {
                family.name = Some(renamed.to_string());
            }
        }
    }

    fn name(&self) -> &str {
        "names"
    }
}
