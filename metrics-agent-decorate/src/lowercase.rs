use metrics_agent_client::proto::MetricFamily;

use crate::Decorator;

/// Lowercases every family name.
///
/// Collectors report names in mixed case, such as `node_memory_MemTotal_bytes`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LowercaseNames;

impl Decorator for LowercaseNames {
    fn decorate(&self, families: &mut [MetricFamily]) {
        for family in families {
            if let Some(name) = family.name.as_mut() {
                if name.chars().any(char::is_uppercase) {
                    *name = name.to_lowercase();
                }
            }
        }
    }

    fn name(&self) -> &str {
        "lowercase-names"
    }
}
