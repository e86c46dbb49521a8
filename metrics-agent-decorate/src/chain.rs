use metrics_agent_client::proto::MetricFamily;
use tracing::trace;

use crate::Decorator;

/// Applies a sequence of decorators, in the order they were added.
#[derive(Default)]
pub struct Chain {
    decorators: Vec<Box<dyn Decorator + Send + Sync>>,
}

impl Chain {
    /// Creates an empty `Chain`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a decorator to the chain.
    #[must_use]
    pub fn with<D>(mut self, decorator: D) -> Self
    where
        D: Decorator + Send + Sync + 'static,
    {
        self.decorators.push(Box::new(decorator));
        self
    }

    /// Number of decorators in the chain.
    pub fn len(&self) -> usize {
        self.decorators.len()
    }

    /// Returns `true` if the chain holds no decorators.
    pub fn is_empty(&self) -> bool {
        self.decorators.is_empty()
    }

    /// Names of the decorators in the chain, in application order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.decorators.iter().map(|d| d.name())
    }
}

impl Decorator for Chain {
    fn decorate(&self, families: &mut [MetricFamily]) {
        for decorator in &self.decorators {
            trace!(decorator = decorator.name(), "Applying decorator.");
            decorator.decorate(families);
        }
    }

    fn name(&self) -> &str {
        "chain"
    }
}
