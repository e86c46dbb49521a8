//! Decorators applied to metric families between collection and sending.
//!
//! A [`Decorator`] mutates a set of metric families in place: renaming families, rewriting label
//! values or rescaling values. Decorators are composed with a [`Chain`], which applies each one
//! in turn and is itself a decorator.
//!
//! The [`compat`] decorators translate node-exporter style families into the names and units the
//! ingestion backend expects.
//!
//! ```
//! use metrics_agent_client::proto::{Metric, MetricFamily, MetricType};
//! use metrics_agent_decorate::{compat, Chain, Decorator, LowercaseNames};
//!
//! let chain = Chain::new()
//!     .with(compat::Names)
//!     .with(compat::Disk)
//!     .with(compat::Cpu)
//!     .with(LowercaseNames);
//!
//! let mut families = vec![MetricFamily::new(
//!     "node_load1",
//!     MetricType::Gauge,
//!     vec![Metric::gauge(vec![], 0.5)],
//! )];
//! chain.decorate(&mut families);
//!
//! assert_eq!(families[0].family_name(), "sonar_load1");
//! ```
#![deny(missing_docs)]

use metrics_agent_client::proto::MetricFamily;

mod chain;
pub use self::chain::Chain;

pub mod compat;

mod lowercase;
pub use self::lowercase::LowercaseNames;

/// Mutates metric families in place.
pub trait Decorator {
    /// Decorates the given families.
    fn decorate(&self, families: &mut [MetricFamily]);

    /// Name of this decorator, for diagnostics.
    fn name(&self) -> &str;
}

impl<D: Decorator + ?Sized> Decorator for Box<D> {
    fn decorate(&self, families: &mut [MetricFamily]) {
        (**self).decorate(families)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
