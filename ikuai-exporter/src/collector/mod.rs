//! One collection cycle: query the appliance and translate its replies into
//! samples for the families of the [`Registry`].

use std::{future::Future, panic::AssertUnwindSafe};

use futures_util::FutureExt;
use ikuai_client::{Client, ClientError, Reply};
use ikuai_proto::{MonitorIfaceData, MonitorLanData, StreamStat, SysStat, SysStatData};
use tracing::{debug, warn};

use crate::metric::{Family, HOST_ID, HistogramValue, Registry, Sample, Value};

mod device;
pub mod histogram;
mod iface;

use device::Device;
use iface::IfaceStatus;

const QUERY_SYS_STAT: &str = "ShowSysStat";
const QUERY_MONITOR_LAN: &str = "ShowMonitorLan";
const QUERY_MONITOR_IFACE: &str = "ShowMonitorInterface";

/// App flow category holding the sum of all others.
const APP_FLOW_TOTAL: &str = "Total";

/// The queries a collection cycle needs from the appliance.
pub trait RouterApi {
    fn show_sys_stat(
        &self,
    ) -> impl Future<Output = Result<Reply<SysStatData>, ClientError>> + Send;

    fn show_monitor_lan(
        &self,
    ) -> impl Future<Output = Result<Reply<MonitorLanData>, ClientError>> + Send;

    fn show_monitor_interface(
        &self,
    ) -> impl Future<Output = Result<Reply<MonitorIfaceData>, ClientError>> + Send;
}

impl RouterApi for Client {
    fn show_sys_stat(
        &self,
    ) -> impl Future<Output = Result<Reply<SysStatData>, ClientError>> + Send {
        Client::show_sys_stat(self)
    }

    fn show_monitor_lan(
        &self,
    ) -> impl Future<Output = Result<Reply<MonitorLanData>, ClientError>> + Send {
        Client::show_monitor_lan(self)
    }

    fn show_monitor_interface(
        &self,
    ) -> impl Future<Output = Result<Reply<MonitorIfaceData>, ClientError>> + Send {
        Client::show_monitor_interface(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("{query}: {source}")]
    Transport {
        query: &'static str,
        #[source]
        source: ClientError,
    },
    #[error("{query}: appliance replied [{result}] {err_msg}")]
    Rejected {
        query: &'static str,
        result: i64,
        err_msg: String,
    },
    #[error("{query}: reply carried no data")]
    MissingData { query: &'static str },
    #[error("collection panicked: {0}")]
    Panicked(String),
}

/// Accept a reply only when it arrived and its envelope says `Success`.
pub fn validate<T>(
    query: &'static str,
    res: Result<Reply<T>, ClientError>,
) -> Result<T, CollectError> {
    let reply = res.map_err(|source| CollectError::Transport { query, source })?;

    if !reply.is_success() {
        return Err(CollectError::Rejected {
            query,
            result: reply.result,
            err_msg: reply.err_msg,
        });
    }

    reply.data.ok_or(CollectError::MissingData { query })
}

/// Run one cycle, turning any failure into the single host-down sample.
pub async fn scrape<R: RouterApi>(api: &R, registry: &Registry) -> Vec<Sample> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();

    let res = AssertUnwindSafe(collect(api, registry, now))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "<non-string panic>".to_owned());
            Err(CollectError::Panicked(msg))
        });

    match res {
        Ok(samples) => {
            debug!(samples = samples.len(), "collection finished");
            samples
        }
        Err(e) => {
            warn!(error = %e, "collection aborted, reporting host down");
            vec![Sample::host_down()]
        }
    }
}

/// Query the appliance and assemble every sample of the cycle.
///
/// Fails only when the system statistics can't be fetched; the device and
/// interface queries are optional and their metrics are skipped on failure.
pub async fn collect<R: RouterApi>(
    api: &R,
    registry: &Registry,
    now: i64,
) -> Result<Vec<Sample>, CollectError> {
    let stat = validate(QUERY_SYS_STAT, api.show_sys_stat().await)?;

    let mut out = Assembler::new(registry);
    out.system(&stat);

    match validate(QUERY_MONITOR_LAN, api.show_monitor_lan().await) {
        Ok(lan) => out.devices(&device::merge(lan.data)),
        Err(e) => warn!(error = %e, "skipping device metrics"),
    }

    match validate(QUERY_MONITOR_IFACE, api.show_monitor_interface().await) {
        Ok(data) => out.interfaces(&iface::correlate(&data, now)),
        Err(e) => warn!(error = %e, "skipping interface metrics"),
    }

    out.host(&stat.sysstat);

    Ok(out.finish())
}

/// Collects the samples of one cycle against the descriptor table.
struct Assembler<'a> {
    registry: &'a Registry,
    samples: Vec<Sample>,
}

impl<'a> Assembler<'a> {
    fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            samples: Vec::new(),
        }
    }

    fn push<L: Into<String>>(
        &mut self,
        family: Family,
        labels: impl IntoIterator<Item = L>,
        value: Value,
    ) {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();

        let desc = self.registry.desc(family);
        debug_assert_eq!(desc.labels.len(), labels.len(), "{}", desc.name);
        debug_assert_eq!(desc.kind, value.kind(), "{}", desc.name);

        self.samples.push(Sample {
            family,
            labels,
            value,
        });
    }

    fn gauge<L: Into<String>>(
        &mut self,
        family: Family,
        labels: impl IntoIterator<Item = L>,
        v: f64,
    ) {
        self.push(family, labels, Value::Gauge(v));
    }

    fn counter<L: Into<String>>(
        &mut self,
        family: Family,
        labels: impl IntoIterator<Item = L>,
        v: f64,
    ) {
        self.push(family, labels, Value::Counter(v));
    }

    fn histogram(&mut self, family: Family, labels: [&str; 1], v: HistogramValue) {
        self.push(family, labels, Value::Histogram(v));
    }

    fn system(&mut self, stat: &SysStatData) {
        let sys = &stat.sysstat;
        let ver = &sys.verinfo;
        self.gauge(
            Family::Version,
            [&ver.version, &ver.arch, &ver.verstring],
            1.0,
        );

        if let Some(temp) = sys.cputemp.first() {
            self.gauge(Family::CpuTemperature, NO_LABELS, *temp);
        }

        for (idx, usage) in sys.cpu.iter().enumerate() {
            self.gauge(Family::CpuUsage, [format!("core/{idx}")], parse_percent(usage));
        }

        let mem = &sys.memory;
        self.gauge(Family::MemorySize, NO_LABELS, mem.total as f64);
        self.gauge(
            Family::MemoryUsage,
            NO_LABELS,
            mem.total.saturating_sub(mem.available) as f64,
        );
        self.gauge(Family::MemoryCached, NO_LABELS, mem.cached as f64);
        self.gauge(Family::MemoryBuffers, NO_LABELS, mem.buffers as f64);

        self.gauge(
            Family::DhcpAddrpool,
            NO_LABELS,
            stat.dhcp_addrpool_num.available_num as f64,
        );
        self.gauge(Family::OnlineUser, NO_LABELS, sys.online_user.count as f64);

        if let Some(flows) = stat.app_flow.app_flow.first() {
            let registry = self.registry;
            for (category, bytes) in flows {
                if category == APP_FLOW_TOTAL {
                    continue;
                }
                let hist = histogram::observe(registry.app_flow_buckets(), bytes.0);
                self.histogram(Family::AppFlow, [category.as_str()], hist);
            }
        }
    }

    fn devices(&mut self, devices: &[Device]) {
        for Device { id, info } in devices {
            self.gauge(
                Family::DeviceInfo,
                [
                    id.as_str(),
                    info.mac.as_str(),
                    info.hostname.as_str(),
                    info.ip_addr.as_str(),
                    info.comment.as_str(),
                ],
                1.0,
            );
            self.stream(id, &info.stream);
        }

        self.gauge(Family::DeviceCount, NO_LABELS, devices.len() as f64);
    }

    fn interfaces(&mut self, interfaces: &[IfaceStatus]) {
        for iface in interfaces {
            self.gauge(
                Family::IfaceInfo,
                [
                    &iface.id,
                    &iface.interface,
                    &iface.comment,
                    &iface.internet,
                    &iface.parent_interface,
                    &iface.ip_addr,
                ],
                1.0,
            );
            self.gauge(Family::Up, [&iface.id], if iface.up { 1.0 } else { 0.0 });
            self.counter(Family::Uptime, [&iface.id], iface.uptime as f64);
            self.stream(&iface.id, &iface.stream);
        }
    }

    fn host(&mut self, sys: &SysStat) {
        self.counter(Family::Uptime, [HOST_ID], sys.uptime as f64);
        self.stream(HOST_ID, &sys.stream);
        self.gauge(Family::Up, [HOST_ID], 1.0);
    }

    fn stream(&mut self, id: &str, stream: &StreamStat) {
        self.counter(Family::SendBytes, [id], stream.total_up as f64);
        self.counter(Family::RecvBytes, [id], stream.total_down as f64);
        self.gauge(Family::SendSpeed, [id], stream.upload as f64);
        self.gauge(Family::RecvSpeed, [id], stream.download as f64);
        self.gauge(Family::ConnCount, [id], stream.connect_num as f64);
    }

    fn finish(self) -> Vec<Sample> {
        self.samples
    }
}

const NO_LABELS: [&str; 0] = [];

/// `"12.5%"` to `12.5`; anything unparsable is 0.
fn parse_percent(s: &str) -> f64 {
    s.trim().trim_end_matches('%').trim().parse().unwrap_or(0.0)
}
