//! Per-CPU time accounting from `/proc/stat`.

use metrics_agent_client::proto::{LabelPair, Metric};

/// Clock ticks per second used by `/proc/stat`.
const USER_HZ: f64 = 100.0;

/// Column names of a `cpuN` line, in order.
const MODES: [&str; 8] = ["user", "nice", "system", "idle", "iowait", "irq", "softirq", "steal"];

/// Time spent by one CPU in each mode, in seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct CpuTimes {
    pub cpu: u32,
    pub seconds: Vec<(&'static str, f64)>,
}

impl CpuTimes {
    /// Converts the times into counter metrics labeled by `cpu` and `mode`.
    pub fn into_metrics(self) -> impl Iterator<Item = Metric> {
        let cpu = self.cpu.to_string();
        self.seconds.into_iter().map(move |(mode, seconds)| {
            let labels = vec![LabelPair::new("cpu", cpu.as_str()), LabelPair::new("mode", mode)];
            Metric::counter(labels, seconds)
        })
    }
}

/// Parses the per-CPU lines of `/proc/stat`.
///
/// The aggregate `cpu` line is skipped. Kernels that report fewer columns yield fewer modes.
pub fn parse(content: &str) -> Result<Vec<CpuTimes>, String> {
    let mut cpus = Vec::new();

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let Some(cpu) = fields.next().and_then(|name| name.strip_prefix("cpu")) else {
            continue;
        };
        if cpu.is_empty() {
            continue;
        }

        let cpu = cpu.parse::<u32>().map_err(|_| format!("unexpected CPU name in {line:?}"))?;
        let seconds = MODES
            .iter()
            .zip(fields)
            .map(|(mode, ticks)| {
                ticks
                    .parse::<u64>()
                    .map(|ticks| (*mode, ticks as f64 / USER_HZ))
                    .map_err(|_| format!("unexpected {mode} ticks in {line:?}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        cpus.push(CpuTimes { cpu, seconds });
    }

    Ok(cpus)
}
