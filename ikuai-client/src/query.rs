use ikuai_proto::{
    MonitorIfaceData, MonitorLanData, SysStatData,
    msg::{FUNC_HOMEPAGE, FUNC_MONITOR_IFACE, FUNC_MONITOR_LAN},
};
use serde::Serialize;

use crate::{Client, ClientError, Reply};

#[derive(Debug, Serialize)]
struct TypeParam<'a> {
    #[serde(rename = "TYPE")]
    kind: &'a str,
}

#[derive(Debug, Serialize)]
struct LanParam<'a> {
    #[serde(rename = "TYPE")]
    kind: &'a str,
    #[serde(rename = "ORDER_BY")]
    order_by: &'a str,
    #[serde(rename = "orderType")]
    order_type: &'a str,
    limit: &'a str,
    #[serde(rename = "ORDER")]
    order: &'a str,
}

impl Client {
    /// System statistics, DHCP pool and app flow of the homepage dashboard.
    pub async fn show_sys_stat(&self) -> Result<Reply<SysStatData>, ClientError> {
        self.call(
            FUNC_HOMEPAGE,
            TypeParam {
                kind: "sysstat,ac_status,dhcp_addrpool_num,app_flow",
            },
        )
        .await
    }

    /// Devices currently seen on the LAN side.
    pub async fn show_monitor_lan(&self) -> Result<Reply<MonitorLanData>, ClientError> {
        self.call(
            FUNC_MONITOR_LAN,
            LanParam {
                kind: "data,total",
                order_by: "ip_addr_int",
                order_type: "IP",
                limit: "0,1000",
                order: "",
            },
        )
        .await
    }

    /// Traffic and connectivity checks per interface.
    pub async fn show_monitor_interface(&self) -> Result<Reply<MonitorIfaceData>, ClientError> {
        self.call(
            FUNC_MONITOR_IFACE,
            TypeParam {
                kind: "iface_check,iface_stream",
            },
        )
        .await
    }
}
