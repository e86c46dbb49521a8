use metrics_agent_client::proto::MetricFamily;

use crate::Decorator;

/// Size of a disk sector, in bytes.
pub const SECTOR_SIZE: f64 = 512.0;

const CONVERSIONS: &[(&str, &str)] = &[
    ("node_disk_read_bytes_total", "sonar_disk_sectors_read"),
    ("node_disk_written_bytes_total", "sonar_disk_sectors_written"),
];

/// Converts disk throughput families from bytes to sectors, renaming them on the way.
#[derive(Clone, Copy, Debug, Default)]
pub struct Disk;

impl Decorator for Disk {
    fn decorate(&self, families: &mut [MetricFamily]) {
        for family in families {
            let Some(renamed) = CONVERSIONS
                .iter()
                .find(|(from, _)| from.eq_ignore_ascii_case(family.family_name()))
                .map(|(_, to)| *to)
            else {
                continue;
            };

            family.name = Some(renamed.to_string());
            for metric in &mut family.metric {
                if let Some(value) = metric.single_value_mut() {
                    *value /= SECTOR_SIZE;
                }
            }
        }
    }

    fn name(&self) -> &str {
        "disk"
    }
}
