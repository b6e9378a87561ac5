use std::collections::HashSet;

use ikuai_proto::{IfaceCheck, IfaceStream, MonitorIfaceData, StreamStat};
use tracing::debug;

const CHECK_SUCCESS: &str = "success";

#[derive(Debug, Clone, PartialEq)]
pub struct IfaceStatus {
    pub id: String,
    pub interface: String,
    pub comment: String,
    pub ip_addr: String,
    pub internet: String,
    pub parent_interface: String,
    pub up: bool,
    /// Seconds since the last successful check; 0 when down or unknown.
    pub uptime: u64,
    pub stream: StreamStat,
}

pub fn iface_id(interface: &str) -> String {
    format!("iface/{interface}")
}

/// Join traffic records with connectivity checks by interface name.
///
/// An interface without a check record is reported up with zero uptime.
pub fn correlate(data: &MonitorIfaceData, now: i64) -> Vec<IfaceStatus> {
    let mut seen = HashSet::with_capacity(data.iface_stream.len());

    data.iface_stream
        .iter()
        .filter(|stream| {
            let fresh = seen.insert(stream.interface.as_str());
            if !fresh {
                debug!(interface = %stream.interface, "dropping repeated interface record");
            }
            fresh
        })
        .map(|stream| status(stream, &data.iface_check, now))
        .collect()
}

fn status(stream: &IfaceStream, checks: &[IfaceCheck], now: i64) -> IfaceStatus {
    let mut internet = "";
    let mut parent_interface = "";
    let mut up = true;
    let mut uptime = 0;

    // the last matching check wins
    for check in checks.iter().filter(|c| c.interface == stream.interface) {
        internet = &check.internet;
        parent_interface = &check.parent_interface;

        if check.result == CHECK_SUCCESS {
            up = true;
            uptime = check
                .updatetime
                .trim()
                .parse::<i64>()
                .map(|since| u64::try_from(now.saturating_sub(since)).unwrap_or(0))
                .unwrap_or(0);
        } else {
            up = false;
            uptime = 0;
        }
    }

    IfaceStatus {
        id: iface_id(&stream.interface),
        interface: stream.interface.clone(),
        comment: stream.comment.clone(),
        ip_addr: stream.ip_addr.clone(),
        internet: internet.to_owned(),
        parent_interface: parent_interface.to_owned(),
        up,
        uptime,
        stream: StreamStat {
            total_up: stream.total_up,
            total_down: stream.total_down,
            upload: stream.upload,
            download: stream.download,
            connect_num: stream.connect_num.trim().parse().unwrap_or(0),
        },
    }
}
