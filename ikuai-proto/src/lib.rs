use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod de;
pub mod msg;

use de::{lenient_f64, lenient_u64};

/// Payload of the `homepage` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysStatData {
    pub sysstat: SysStat,
    #[serde(default)]
    pub dhcp_addrpool_num: DhcpAddrpoolNum,
    #[serde(default)]
    pub app_flow: AppFlow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysStat {
    #[serde(default)]
    pub verinfo: VerInfo,
    /// Per core utilization, e.g. `"12.50%"`.
    #[serde(default)]
    pub cpu: Vec<String>,
    #[serde(default)]
    pub cputemp: Vec<f64>,
    pub memory: MemoryStat,
    #[serde(default)]
    pub online_user: OnlineUser,
    #[serde(default)]
    pub stream: StreamStat,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub uptime: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub verstring: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStat {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub available: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub cached: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub buffers: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnlineUser {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub count: u64,
}

/// Traffic counters shared by the host and LAN devices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStat {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_up: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_down: u64,
    /// KB/s
    #[serde(default, deserialize_with = "lenient_u64")]
    pub upload: u64,
    /// KB/s
    #[serde(default, deserialize_with = "lenient_u64")]
    pub download: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub connect_num: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DhcpAddrpoolNum {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub available_num: u64,
}

/// Traffic per application category over the last 30 minutes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppFlow {
    #[serde(default)]
    pub app_flow: Vec<BTreeMap<String, FlowVolume>>,
}

/// Bytes of one app flow category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowVolume(#[serde(deserialize_with = "lenient_f64")] pub f64);

/// Payload of the `monitor_lanip` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorLanData {
    #[serde(default)]
    pub data: Vec<LanDevice>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanDevice {
    pub mac: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub ip_addr: String,
    #[serde(default)]
    pub comment: String,
    #[serde(flatten)]
    pub stream: StreamStat,
}

/// Payload of the `monitor_iface` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorIfaceData {
    #[serde(default)]
    pub iface_check: Vec<IfaceCheck>,
    #[serde(default)]
    pub iface_stream: Vec<IfaceStream>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfaceStream {
    pub interface: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub ip_addr: String,
    /// Reported as a string by the appliance.
    #[serde(default)]
    pub connect_num: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_up: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_down: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub upload: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub download: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfaceCheck {
    pub interface: String,
    #[serde(default)]
    pub parent_interface: String,
    #[serde(default)]
    pub internet: String,
    /// `"success"` when the last connectivity check passed.
    #[serde(default)]
    pub result: String,
    /// Unix timestamp of the last check, as a string.
    #[serde(default)]
    pub updatetime: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sysstat_payload() {
        let data: SysStatData = serde_json::from_str(
            r#"{
                "sysstat": {
                    "verinfo": {"version": "3.7.4", "arch": "x86", "verstring": "3.7.4 x64 Build202306131042", "modelname": ""},
                    "cpu": ["3.12%", "1.00%"],
                    "cputemp": [48],
                    "memory": {"total": 1000, "available": 400, "free": 300, "cached": "120", "buffers": 30, "used": "60%"},
                    "online_user": {"count": 12, "count_wired": 8},
                    "stream": {"connect_num": 321, "upload": 10, "download": 20, "total_up": 1000, "total_down": 2000},
                    "uptime": 86400
                },
                "ac_status": {"ap_count": 0},
                "dhcp_addrpool_num": {"available_num": 200},
                "app_flow": {"app_flow": [{"Total": 3145728, "Video": 2097152, "Web": 1048576}]}
            }"#,
        )
        .unwrap();

        assert_eq!(data.sysstat.verinfo.arch, "x86");
        assert_eq!(data.sysstat.cpu, vec!["3.12%", "1.00%"]);
        assert_eq!(data.sysstat.cputemp, vec![48.0]);
        assert_eq!(data.sysstat.memory.cached, 120);
        assert_eq!(data.sysstat.online_user.count, 12);
        assert_eq!(data.sysstat.stream.connect_num, 321);
        assert_eq!(data.dhcp_addrpool_num.available_num, 200);
        assert_eq!(data.app_flow.app_flow[0]["Video"], FlowVolume(2097152.0));
    }

    #[test]
    fn app_flow_volumes_are_lenient() {
        let flow: AppFlow = serde_json::from_str(
            r#"{"app_flow": [{"Total": "3145728", "Video": 2097152, "Game": "", "Web": null}]}"#,
        )
        .unwrap();

        let flows = &flow.app_flow[0];
        assert_eq!(flows["Total"].0, 3145728.0);
        assert_eq!(flows["Video"].0, 2097152.0);
        assert_eq!(flows["Game"].0, 0.0);
        assert_eq!(flows["Web"].0, 0.0);
    }

    #[test]
    fn sysstat_without_memory_is_rejected() {
        let res = serde_json::from_str::<SysStatData>(r#"{"sysstat": {"cpu": []}}"#);
        assert!(res.is_err());
    }

    #[test]
    fn lan_device_flattens_stream_counters() {
        let data: MonitorLanData = serde_json::from_str(
            r#"{
                "data": [{
                    "mac": "aa:bb:cc:dd:ee:ff", "hostname": "laptop", "ip_addr": "192.168.1.2",
                    "comment": "", "total_up": 10, "total_down": "20", "upload": 1, "download": 2,
                    "connect_num": 5, "ip_addr_int": 3232235778
                }],
                "total": 1
            }"#,
        )
        .unwrap();

        let device = &data.data[0];
        assert_eq!(device.hostname, "laptop");
        assert_eq!(device.stream.total_down, 20);
        assert_eq!(device.stream.connect_num, 5);
    }

    #[test]
    fn iface_payload_defaults_missing_fields() {
        let data: MonitorIfaceData = serde_json::from_str(
            r#"{
                "iface_check": [{"interface": "wan1", "result": "success", "updatetime": "1700000000"}],
                "iface_stream": [{"interface": "wan1", "connect_num": "abc", "total_up": 1}]
            }"#,
        )
        .unwrap();

        assert_eq!(data.iface_check[0].parent_interface, "");
        assert_eq!(data.iface_stream[0].connect_num, "abc");
        assert_eq!(data.iface_stream[0].download, 0);
    }
}
