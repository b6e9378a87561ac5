//! The static table of metric families this exporter can emit, and the
//! samples produced for them during a collection cycle.

/// Entity id of the appliance itself.
pub const HOST_ID: &str = "host";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
    Histogram,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
            MetricKind::Histogram => "histogram",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Version,
    CpuUsage,
    CpuTemperature,
    MemorySize,
    MemoryUsage,
    MemoryCached,
    MemoryBuffers,
    DhcpAddrpool,
    AppFlow,
    DeviceInfo,
    DeviceCount,
    OnlineUser,
    IfaceInfo,
    Up,
    Uptime,
    SendBytes,
    RecvBytes,
    SendSpeed,
    RecvSpeed,
    ConnCount,
}

impl Family {
    /// Every family, in exposition order.
    pub const ALL: [Family; 20] = [
        Family::Version,
        Family::CpuUsage,
        Family::CpuTemperature,
        Family::MemorySize,
        Family::MemoryUsage,
        Family::MemoryCached,
        Family::MemoryBuffers,
        Family::DhcpAddrpool,
        Family::AppFlow,
        Family::DeviceInfo,
        Family::DeviceCount,
        Family::OnlineUser,
        Family::IfaceInfo,
        Family::Up,
        Family::Uptime,
        Family::SendBytes,
        Family::RecvBytes,
        Family::SendSpeed,
        Family::RecvSpeed,
        Family::ConnCount,
    ];

    fn describe(self) -> MetricDesc {
        use MetricKind::*;

        match self {
            Family::Version => desc(
                "ikuai_version",
                "Firmware version of the appliance",
                Gauge,
                &["version", "arch", "verstring"],
            ),
            Family::CpuUsage => desc("ikuai_cpu_usage_ratio", "CPU usage per core", Gauge, &["id"]),
            Family::CpuTemperature => desc("ikuai_cpu_temperature", "CPU temperature", Gauge, &[]),
            Family::MemorySize => desc("ikuai_memory_size_bytes", "Total memory", Gauge, &[]),
            Family::MemoryUsage => desc(
                "ikuai_memory_usage_bytes",
                "Memory in use (total minus available)",
                Gauge,
                &[],
            ),
            Family::MemoryCached => desc("ikuai_memory_cached_bytes", "Page cache", Gauge, &[]),
            Family::MemoryBuffers => desc("ikuai_memory_buffers_bytes", "Memory buffers", Gauge, &[]),
            Family::DhcpAddrpool => desc(
                "ikuai_dhcp_addrpool_num",
                "Addresses left in the DHCP pool",
                Gauge,
                &[],
            ),
            Family::AppFlow => desc(
                "ikuai_app_flow_histogram",
                "Histogram of app flow distribution in the last 30 minutes",
                Histogram,
                &["category"],
            ),
            Family::DeviceInfo => desc(
                "ikuai_device_info",
                "LAN device information",
                Gauge,
                &["id", "mac", "hostname", "ip_addr", "comment"],
            ),
            Family::DeviceCount => desc("ikuai_device_count", "Number of LAN devices", Gauge, &[]),
            Family::OnlineUser => desc(
                "ikuai_online_user_count",
                "Online users as counted by the appliance",
                Gauge,
                &[],
            ),
            Family::IfaceInfo => desc(
                "ikuai_iface_info",
                "Interface information",
                Gauge,
                &[
                    "id",
                    "interface",
                    "comment",
                    "internet",
                    "parent_interface",
                    "ip_addr",
                ],
            ),
            Family::Up => desc("ikuai_up", "Whether the host or link is up", Gauge, &["id"]),
            Family::Uptime => desc(
                "ikuai_uptime",
                "Seconds the host or link has been up",
                Counter,
                &["id"],
            ),
            Family::SendBytes => desc("ikuai_network_send_bytes", "Bytes sent", Counter, &["id"]),
            Family::RecvBytes => desc("ikuai_network_recv_bytes", "Bytes received", Counter, &["id"]),
            Family::SendSpeed => desc(
                "ikuai_network_send_kbytes_per_second",
                "Upload speed",
                Gauge,
                &["id"],
            ),
            Family::RecvSpeed => desc(
                "ikuai_network_recv_kbytes_per_second",
                "Download speed",
                Gauge,
                &["id"],
            ),
            Family::ConnCount => desc("ikuai_network_conn_count", "Active connections", Gauge, &["id"]),
        }
    }
}

fn desc(
    name: &'static str,
    help: &'static str,
    kind: MetricKind,
    labels: &'static [&'static str],
) -> MetricDesc {
    MetricDesc {
        name,
        help,
        kind,
        labels,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
}

/// Descriptor table built once at startup and shared by every cycle.
#[derive(Debug, Clone)]
pub struct Registry {
    descs: Vec<MetricDesc>,
    app_flow_buckets: Vec<f64>,
}

impl Registry {
    pub fn new(app_flow_buckets: Vec<f64>) -> Self {
        debug_assert!(app_flow_buckets.windows(2).all(|w| w[0] < w[1]));

        Self {
            descs: Family::ALL.iter().map(|f| f.describe()).collect(),
            app_flow_buckets,
        }
    }

    pub fn desc(&self, family: Family) -> &MetricDesc {
        &self.descs[family as usize]
    }

    pub fn app_flow_buckets(&self) -> &[f64] {
        &self.app_flow_buckets
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramValue {
    pub count: u64,
    pub sum: f64,
    /// `(upper bound, observations <= bound)`, ascending by bound.
    pub buckets: Vec<(f64, u64)>,
}

impl HistogramValue {
    /// Fold another observation set with the same bounds into this one.
    pub fn merge(&mut self, other: &HistogramValue) {
        debug_assert_eq!(self.buckets.len(), other.buckets.len());

        self.count += other.count;
        self.sum += other.sum;
        for ((_, mine), (_, theirs)) in self.buckets.iter_mut().zip(&other.buckets) {
            *mine += theirs;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Gauge(f64),
    Counter(f64),
    Histogram(HistogramValue),
}

impl Value {
    pub fn kind(&self) -> MetricKind {
        match self {
            Value::Gauge(_) => MetricKind::Gauge,
            Value::Counter(_) => MetricKind::Counter,
            Value::Histogram(_) => MetricKind::Histogram,
        }
    }
}

/// One observation; label values follow the order of the family's label names.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub family: Family,
    pub labels: Vec<String>,
    pub value: Value,
}

impl Sample {
    /// The only sample emitted when a cycle is aborted.
    pub fn host_down() -> Self {
        Sample {
            family: Family::Up,
            labels: vec![HOST_ID.to_owned()],
            value: Value::Gauge(0.0),
        }
    }
}
