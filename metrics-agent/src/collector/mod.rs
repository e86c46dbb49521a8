//! Host metric collection.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, AhoCorasickKind};
use metrics_agent_client::proto::{LabelPair, Metric, MetricFamily, MetricType};
use sysinfo::{Disks, LoadAvg, Networks, System};
use thiserror::Error;
use tracing::debug;

mod proc_stat;

/// Mount points containing any of these are not reported.
pub const IGNORED_MOUNT_POINTS: &[&str] =
    &["fusectl", "lxcfs", "mqueue", "none", "rootfs", "sunrpc", "systemd", "udev"];

/// Filesystem types containing any of these are not reported.
pub const IGNORED_FS_TYPES: &[&str] = &[
    "aufs",
    "autofs",
    "binfmt_misc",
    "cifs",
    "cgroup",
    "debugfs",
    "devpts",
    "devtmpfs",
    "ecryptfs",
    "efivarfs",
    "fuse",
    "hugetlbfs",
    "mqueue",
    "nfs",
    "overlay",
    "proc",
    "pstore",
    "rpc_pipefs",
    "securityfs",
    "smb",
    "sysfs",
    "tmpfs",
    "tracefs",
];

const PROC_STAT: &str = "/proc/stat";

/// Errors that could occur while collecting metrics.
#[derive(Debug, Error)]
pub enum CollectError {
    /// A kernel statistics file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// A kernel statistics file had unexpected contents.
    #[error("failed to parse {}: {reason}", path.display())]
    Parse {
        /// Path of the file.
        path: PathBuf,
        /// Details about the parsing failure.
        reason: String,
    },

    /// The filesystem exclusion patterns could not be compiled.
    #[error("failed to build filesystem filter: {0}")]
    Filter(#[from] aho_corasick::BuildError),
}

/// A source of metric families.
pub trait Gatherer {
    /// Collects the current value of every metric.
    fn gather(&mut self) -> Result<Vec<MetricFamily>, CollectError>;

    /// Name of this gatherer, for diagnostics.
    fn name(&self) -> &str;
}

/// Collects node-exporter style metrics about the local host.
///
/// Memory, load, filesystem, disk and network figures come from `sysinfo`. On Linux, CPU time per
/// mode is read from `/proc/stat`.
pub struct NodeCollector {
    system: System,
    exclusions: Exclusions,
    proc_stat: PathBuf,
    build_info: MetricFamily,
}

impl NodeCollector {
    /// Creates a new `NodeCollector` reporting the given build.
    pub fn new(version: &str, revision: &str) -> Result<Self, CollectError> {
        Ok(Self {
            system: System::new(),
            exclusions: Exclusions::new(IGNORED_MOUNT_POINTS, IGNORED_FS_TYPES)?,
            proc_stat: PathBuf::from(PROC_STAT),
            build_info: build_info(version, revision),
        })
    }

    /// Reads CPU times from `path` instead of `/proc/stat`.
    #[must_use]
    pub fn with_proc_stat<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.proc_stat = path.into();
        self
    }

    fn cpu(&self) -> Result<Option<MetricFamily>, CollectError> {
        if !cfg!(target_os = "linux") {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.proc_stat)
            .map_err(|source| CollectError::Read { path: self.proc_stat.clone(), source })?;
        let cpus = proc_stat::parse(&content)
            .map_err(|reason| CollectError::Parse { path: self.proc_stat.clone(), reason })?;

        let metrics = cpus.into_iter().flat_map(proc_stat::CpuTimes::into_metrics).collect();
        Ok(Some(MetricFamily::new("node_cpu_seconds_total", MetricType::Counter, metrics)))
    }

    fn memory(&mut self) -> [MetricFamily; 3] {
        self.system.refresh_memory();
        [
            gauge("node_memory_MemTotal_bytes", self.system.total_memory() as f64),
            gauge("node_memory_MemFree_bytes", self.system.free_memory() as f64),
            gauge("node_memory_MemAvailable_bytes", self.system.available_memory() as f64),
        ]
    }
}

impl Gatherer for NodeCollector {
    fn gather(&mut self) -> Result<Vec<MetricFamily>, CollectError> {
        let mut families = vec![self.build_info.clone()];
        families.extend(self.cpu()?);
        families.extend(self.memory());
        families.extend(load(&System::load_average()));

        let disks = Disks::new_with_refreshed_list();
        let mounts: Vec<_> = disks
            .list()
            .iter()
            .map(|disk| {
                let usage = disk.usage();
                Filesystem {
                    device: disk.name().to_string_lossy().into_owned(),
                    mount_point: disk.mount_point().to_string_lossy().into_owned(),
                    fs_type: disk.file_system().to_string_lossy().into_owned(),
                    size: disk.total_space(),
                    free: disk.available_space(),
                    read: usage.total_read_bytes,
                    written: usage.total_written_bytes,
                }
            })
            .collect();
        families.extend(filesystem(&mounts, &self.exclusions));
        families.extend(disk_io(&mounts, &self.exclusions));

        let networks = Networks::new_with_refreshed_list();
        let network_io = networks
            .list()
            .iter()
            .map(|(name, data)| (name.clone(), data.total_received(), data.total_transmitted()));
        families.extend(device_counters(
            "node_network_receive_bytes_total",
            "node_network_transmit_bytes_total",
            network_io,
        ));

        debug!(families = families.len(), "Gathered node metrics.");
        Ok(families)
    }

    fn name(&self) -> &str {
        "node_collector"
    }
}

/// Substring filters over mount points and filesystem types.
struct Exclusions {
    mount_points: AhoCorasick,
    fs_types: AhoCorasick,
}

impl Exclusions {
    fn new(mount_points: &[&str], fs_types: &[&str]) -> Result<Self, aho_corasick::BuildError> {
        let build = |patterns: &[&str]| {
            AhoCorasickBuilder::new().kind(Some(AhoCorasickKind::DFA)).build(patterns)
        };
        Ok(Self { mount_points: build(mount_points)?, fs_types: build(fs_types)? })
    }

    fn is_ignored(&self, mount_point: &str, fs_type: &str) -> bool {
        self.mount_points.is_match(mount_point) || self.fs_types.is_match(fs_type)
    }
}

struct Filesystem {
    device: String,
    mount_point: String,
    fs_type: String,
    size: u64,
    free: u64,
    read: u64,
    written: u64,
}

fn filesystem(mounts: &[Filesystem], exclusions: &Exclusions) -> [MetricFamily; 2] {
    let mut size = Vec::new();
    let mut free = Vec::new();

    for mount in mounts {
        if exclusions.is_ignored(&mount.mount_point, &mount.fs_type) {
            continue;
        }

        let labels = labels(&[
            ("device", mount.device.as_str()),
            ("fstype", mount.fs_type.as_str()),
            ("mountpoint", mount.mount_point.as_str()),
        ]);
        size.push(Metric::gauge(labels.clone(), mount.size as f64));
        free.push(Metric::gauge(labels, mount.free as f64));
    }

    [
        MetricFamily::new("node_filesystem_size_bytes", MetricType::Gauge, size),
        MetricFamily::new("node_filesystem_free_bytes", MetricType::Gauge, free),
    ]
}

/// Builds the disk byte counter families of the mounts that are not excluded.
///
/// Counters are keyed by the mounted device (`vda1`), so a disk with several mounted partitions
/// reports each partition separately and unmounted disks are not reported.
fn disk_io(mounts: &[Filesystem], exclusions: &Exclusions) -> [MetricFamily; 2] {
    let devices = mounts
        .iter()
        .filter(|mount| !exclusions.is_ignored(&mount.mount_point, &mount.fs_type))
        .map(|mount| {
            (mount.device.trim_start_matches("/dev/").to_string(), mount.read, mount.written)
        });
    device_counters("node_disk_read_bytes_total", "node_disk_written_bytes_total", devices)
}

/// Builds a pair of per-device byte counter families, ordered by device.
///
/// A device seen more than once keeps its last figures.
fn device_counters<I>(read_name: &str, write_name: &str, devices: I) -> [MetricFamily; 2]
where
    I: IntoIterator<Item = (String, u64, u64)>,
{
    let devices: BTreeMap<String, (u64, u64)> =
        devices.into_iter().map(|(device, read, written)| (device, (read, written))).collect();

    let (read, written) = devices
        .iter()
        .map(|(device, (read, written))| {
            let labels = labels(&[("device", device.as_str())]);
            (Metric::counter(labels.clone(), *read as f64), Metric::counter(labels, *written as f64))
        })
        .unzip();

    [
        MetricFamily::new(read_name, MetricType::Counter, read),
        MetricFamily::new(write_name, MetricType::Counter, written),
    ]
}

fn load(load: &LoadAvg) -> [MetricFamily; 3] {
    [gauge("node_load1", load.one), gauge("node_load5", load.five), gauge("node_load15", load.fifteen)]
}

fn build_info(version: &str, revision: &str) -> MetricFamily {
    let mut family = MetricFamily::new(
        "node_collector_build_info",
        MetricType::Gauge,
        vec![Metric::gauge(labels(&[("revision", revision), ("version", version)]), 1.0)],
    );
    family.help = Some(
        "A metric with a constant '1' value labeled by version from which node_collector was built."
            .to_string(),
    );
    family
}

fn gauge(name: &str, value: f64) -> MetricFamily {
    MetricFamily::new(name, MetricType::Gauge, vec![Metric::gauge(Vec::new(), value)])
}

fn labels(pairs: &[(&str, &str)]) -> Vec<LabelPair> {
    pairs.iter().map(|(name, value)| LabelPair::new(*name, *value)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exclusions() -> Exclusions {
        Exclusions::new(IGNORED_MOUNT_POINTS, IGNORED_FS_TYPES).unwrap()
    }

    fn mount(device: &str, mount_point: &str, fs_type: &str) -> Filesystem {
        Filesystem {
            device: device.to_string(),
            mount_point: mount_point.to_string(),
            fs_type: fs_type.to_string(),
            size: 4096,
            free: 1024,
            read: 2048,
            written: 512,
        }
    }

    fn label(metric: &Metric, name: &str) -> Option<String> {
        metric.label.iter().find(|l| l.name.as_deref() == Some(name)).and_then(|l| l.value.clone())
    }

    #[test]
    fn test_exclusions() {
        let exclusions = exclusions();

        assert!(!exclusions.is_ignored("/", "ext4"));
        assert!(!exclusions.is_ignored("/mnt/data", "xfs"));
        assert!(exclusions.is_ignored("/proc", "proc"));
        assert!(exclusions.is_ignored("/run", "tmpfs"));
        assert!(exclusions.is_ignored("/var/lib/lxcfs", "fuse.lxcfs"));
        assert!(exclusions.is_ignored("/mnt/share", "nfs4"));
        assert!(exclusions.is_ignored("/run/systemd/incoming", "ext4"));
        assert!(exclusions.is_ignored("/var/lib/docker/overlay2/abc/merged", "overlay"));
    }

    #[test]
    fn test_filesystem_families() {
        let [size, free] = filesystem(
            &[
                mount("/dev/vda1", "/", "ext4"),
                mount("tmpfs", "/run", "tmpfs"),
                mount("/dev/vdb", "/data", "xfs"),
            ],
            &exclusions(),
        );

        assert_eq!(size.family_name(), "node_filesystem_size_bytes");
        assert_eq!(free.family_name(), "node_filesystem_free_bytes");
        assert_eq!(size.metric.len(), 2);
        assert_eq!(free.metric.len(), 2);

        assert_eq!(label(&size.metric[0], "mountpoint").as_deref(), Some("/"));
        assert_eq!(label(&size.metric[0], "device").as_deref(), Some("/dev/vda1"));
        assert_eq!(label(&size.metric[1], "fstype").as_deref(), Some("xfs"));
        assert_eq!(size.metric[0].gauge.as_ref().and_then(|g| g.value), Some(4096.0));
        assert_eq!(free.metric[0].gauge.as_ref().and_then(|g| g.value), Some(1024.0));
    }

    #[test]
    fn test_disk_io_skips_excluded_mounts() {
        let [read, written] = disk_io(
            &[
                mount("/dev/vda1", "/", "ext4"),
                mount("overlay", "/var/lib/docker/overlay2/abc/merged", "overlay"),
                mount("tmpfs", "/run", "tmpfs"),
                mount("/dev/vdb", "/data", "xfs"),
            ],
            &exclusions(),
        );

        assert_eq!(read.family_name(), "node_disk_read_bytes_total");
        assert_eq!(written.family_name(), "node_disk_written_bytes_total");
        let devices: Vec<_> = read.metric.iter().filter_map(|m| label(m, "device")).collect();
        assert_eq!(devices, ["vda1", "vdb"]);
        assert_eq!(read.metric[0].counter.as_ref().and_then(|c| c.value), Some(2048.0));
        assert_eq!(written.metric[1].counter.as_ref().and_then(|c| c.value), Some(512.0));
    }

    #[test]
    fn test_device_counters() {
        let [read, written] = device_counters(
            "node_disk_read_bytes_total",
            "node_disk_written_bytes_total",
            [
                ("vdb".to_string(), 10, 20),
                ("vda".to_string(), 1, 2),
                ("vdb".to_string(), 30, 40),
            ],
        );

        assert_eq!(read.metric_type(), MetricType::Counter);
        let devices: Vec<_> = read.metric.iter().filter_map(|m| label(m, "device")).collect();
        assert_eq!(devices, ["vda", "vdb"]);

        let values: Vec<_> =
            written.metric.iter().filter_map(|m| m.counter.as_ref().and_then(|c| c.value)).collect();
        assert_eq!(values, [2.0, 40.0]);
    }

    #[test]
    fn test_build_info() {
        let family = build_info("0.4.0", "abc123");

        assert_eq!(family.family_name(), "node_collector_build_info");
        assert_eq!(family.metric_type(), MetricType::Gauge);
        assert_eq!(label(&family.metric[0], "version").as_deref(), Some("0.4.0"));
        assert_eq!(label(&family.metric[0], "revision").as_deref(), Some("abc123"));
        assert_eq!(family.metric[0].gauge.as_ref().and_then(|g| g.value), Some(1.0));
    }

    #[test]
    fn test_load() {
        let families = load(&LoadAvg { one: 0.5, five: 0.25, fifteen: 0.125 });
        let names: Vec<_> = families.iter().map(MetricFamily::family_name).collect();
        assert_eq!(names, ["node_load1", "node_load5", "node_load15"]);
    }

    #[test]
    fn test_gather() {
        let mut collector = NodeCollector::new("0.4.0", "abc123").unwrap();
        let families = collector.gather().unwrap();
        let names: Vec<_> = families.iter().map(MetricFamily::family_name).collect();

        assert_eq!(names[0], "node_collector_build_info");
        for expected in ["node_memory_MemTotal_bytes", "node_load1", "node_filesystem_size_bytes"] {
            assert!(names.contains(&expected), "missing {expected}");
        }
        assert_eq!(names.contains(&"node_cpu_seconds_total"), cfg!(target_os = "linux"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_gather_with_proc_stat() {
        use std::io::Write as _;

        let path = std::env::temp_dir().join(format!("metrics-agent-stat-{}", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "cpu  10 0 10 100 0 0 0 0 0 0").unwrap();
        writeln!(file, "cpu0 10 0 10 100 0 0 0 0 0 0").unwrap();
        drop(file);

        let mut collector = NodeCollector::new("0.4.0", "abc123").unwrap().with_proc_stat(&path);
        let families = collector.gather();
        fs::remove_file(&path).unwrap();

        let families = families.unwrap();
        let cpu = families.iter().find(|f| f.family_name() == "node_cpu_seconds_total").unwrap();
        assert_eq!(cpu.metric.len(), 8);
        assert_eq!(label(&cpu.metric[0], "cpu").as_deref(), Some("0"));

        let mut broken = NodeCollector::new("0.4.0", "abc123").unwrap().with_proc_stat("/nonexistent");
        assert!(matches!(broken.gather(), Err(CollectError::Read { .. })));
    }
}
