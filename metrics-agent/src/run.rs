use metrics_agent_decorate::Decorator;
use quanta::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::collector::Gatherer;
use crate::writer::MetricWriter;

/// Runs collection cycles until `cancel` fires.
///
/// The first cycle runs right away. After every cycle the loop sleeps for as long as the writer
/// asks, waking early when cancelled. Failures of a cycle are logged and never end the loop.
pub async fn run<G, D, W>(
    collector: &mut G,
    decorator: &D,
    writer: &mut W,
    cancel: CancellationToken,
) where
    G: Gatherer,
    D: Decorator + ?Sized,
    W: MetricWriter,
{
    info!(
        collector = collector.name(),
        decorator = decorator.name(),
        writer = writer.name(),
        "Starting collection loop."
    );

    loop {
        run_cycle(collector, decorator, writer).await;

        let wait = writer.wait_duration();
        debug!(?wait, "Waiting for next cycle.");

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    info!("Collection loop stopped.");
}

async fn run_cycle<G, D, W>(collector: &mut G, decorator: &D, writer: &mut W)
where
    G: Gatherer,
    D: Decorator + ?Sized,
    W: MetricWriter,
{
    let start = Instant::now();
    let mut families = match collector.gather() {
        Ok(families) => families,
        Err(e) => {
            error!(error = %e, collector = collector.name(), "Failed to collect metrics.");
            return;
        }
    };
    let gathered = Instant::now();
    debug!(families = families.len(), elapsed = ?(gathered - start), "Gathered metrics.");

    decorator.decorate(&mut families);
    let decorated = Instant::now();
    debug!(elapsed = ?(decorated - gathered), "Decorated metrics.");

    match writer.write(&families).await {
        Ok(()) => {
            info!(
                writer = writer.name(),
                elapsed = ?(Instant::now() - decorated),
                total = ?(Instant::now() - start),
                "Wrote metrics."
            );
        }
        Err(e) if e.is_too_frequent() => debug!(error = %e, "Skipped write."),
        Err(e) => error!(error = %e, writer = writer.name(), "Failed to write metrics."),
    }
}
