//! Decorators translating node-exporter style families into the backend's naming and units.
//!
//! They are meant to run in the order [`Names`], [`Disk`], [`Cpu`], followed by
//! [`LowercaseNames`](crate::LowercaseNames).

mod cpu;
pub use self::cpu::Cpu;

mod disk;
pub use self::disk::Disk;

mod names;
pub use self::names::Names;

pub(crate) const NODE_CPU: &str = "node_cpu_seconds_total";
pub(crate) const SONAR_CPU: &str = "sonar_cpu";
