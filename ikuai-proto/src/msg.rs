use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// `ErrMsg` of every successful response.
pub const SUCCESS: &str = "Success";

pub const FUNC_HOMEPAGE: &str = "homepage";
pub const FUNC_MONITOR_LAN: &str = "monitor_lanip";
pub const FUNC_MONITOR_IFACE: &str = "monitor_iface";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginReq {
    pub username: String,
    /// Hex md5 of the password.
    pub passwd: String,
    /// Base64 of `salt_11` followed by the password.
    pub pass: String,
    pub remember_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallReq<P> {
    pub func_name: String,
    pub action: String,
    pub param: P,
}

/// Envelope wrapping every response of the appliance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResp<T> {
    #[serde(rename = "Result", default)]
    pub result: i64,
    #[serde(rename = "ErrMsg", default)]
    pub err_msg: String,
    #[serde(rename = "Data", default = "Option::default")]
    pub data: Option<T>,
}

impl<T> CallResp<T> {
    pub fn is_success(&self) -> bool {
        self.err_msg == SUCCESS
    }
}

/// Value of the `sess_key` cookie handed out on login.
#[derive(PartialEq, Eq, Hash, Clone, Serialize, Deserialize)]
pub struct SessionKey(String);

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // keep the key itself out of logs
        write!(f, "SessionKey(<{} bytes>)", self.0.len())
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionKey {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("SessionKey must not be empty");
        }
        if !s.bytes().all(|b| b.is_ascii_graphic() && b != b';') {
            return Err("SessionKey contains invalid characters");
        }

        Ok(SessionKey(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MonitorLanData;

    #[test]
    fn envelope_success() {
        let resp: CallResp<MonitorLanData> = serde_json::from_str(
            r#"{"Result": 30000, "ErrMsg": "Success", "Data": {"data": [], "total": 0}}"#,
        )
        .unwrap();
        assert!(resp.is_success());
        assert!(resp.data.is_some());
    }

    #[test]
    fn envelope_failure_without_data() {
        let resp: CallResp<MonitorLanData> =
            serde_json::from_str(r#"{"Result": 10014, "ErrMsg": "no login authentication"}"#)
                .unwrap();
        assert!(!resp.is_success());
        assert!(resp.data.is_none());
    }

    #[test]
    fn success_marker_is_case_sensitive() {
        let resp: CallResp<()> =
            serde_json::from_str(r#"{"Result": 30000, "ErrMsg": "success"}"#).unwrap();
        assert!(!resp.is_success());
    }

    #[test]
    fn session_key_parsing() {
        assert_eq!(
            "abc123".parse::<SessionKey>().unwrap().to_string(),
            "abc123"
        );
        assert!("".parse::<SessionKey>().is_err());
        assert!("a;b".parse::<SessionKey>().is_err());
        assert!(!format!("{:?}", "secret".parse::<SessionKey>().unwrap()).contains("secret"));
    }
}
