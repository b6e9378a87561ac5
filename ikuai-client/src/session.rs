use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use http::{HeaderMap, Method, header};
use ikuai_proto::msg::{CallResp, LoginReq, SessionKey};
use md5::{Digest, Md5};

use crate::{
    ClientError,
    http_util::{self, ConnectOptions},
};

const SESSION_COOKIE: &str = "sess_key";
const PASS_SALT: &str = "salt_11";

pub async fn login(
    base_url: &str,
    username: &str,
    password: &str,
    opts: ConnectOptions,
) -> Result<SessionKey, ClientError> {
    let uri = format!("{base_url}/Action/login");
    let body = Bytes::from(serde_json::to_vec(&login_request(username, password))?);
    let req = http_util::basic_request_builder(&uri, Method::POST)?
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len())
        .body(body)?;

    let resp = http_util::send_http_request(req, opts).await?;

    if !resp.status().is_success() {
        return Err(ClientError::Status(resp.status().as_u16()));
    }

    let login_resp: CallResp<serde_json::Value> = serde_json::from_slice(resp.body())?;
    if !login_resp.is_success() {
        return Err(ClientError::Login {
            result: login_resp.result,
            err_msg: login_resp.err_msg,
        });
    }

    let key = session_cookie(resp.headers()).ok_or(ClientError::MissingSessionCookie)?;
    log::info!("logged in to {base_url} as {username}");

    Ok(key)
}

pub fn login_request(username: &str, password: &str) -> LoginReq {
    LoginReq {
        username: username.to_owned(),
        passwd: format!("{:x}", Md5::digest(password.as_bytes())),
        pass: STANDARD.encode(format!("{PASS_SALT}{password}")),
        remember_password: String::new(),
    }
}

/// Cookie header sent with every call of an authenticated session.
pub fn cookie_header(username: &str, key: &SessionKey) -> String {
    format!("username={username}; {SESSION_COOKIE}={key}; login=1")
}

fn session_cookie(headers: &HeaderMap) -> Option<SessionKey> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn login_request_hashes_password() {
        let req = login_request("admin", "admin");

        assert_eq!(req.username, "admin");
        assert_eq!(req.passwd, "21232f297a57a5a743894a0e4a801fc3");
        assert_eq!(req.pass, "c2FsdF8xMWFkbWlu");
        assert_eq!(req.remember_password, "");
    }

    #[test]
    fn session_cookie_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.append(
            header::SET_COOKIE,
            HeaderValue::from_static("username=admin; path=/"),
        );
        headers.append(
            header::SET_COOKIE,
            HeaderValue::from_static("sess_key=0123abcd; path=/; HttpOnly"),
        );

        let key = session_cookie(&headers).unwrap();
        assert_eq!(key.to_string(), "0123abcd");
        assert_eq!(
            cookie_header("admin", &key),
            "username=admin; sess_key=0123abcd; login=1"
        );
    }

    #[test]
    fn missing_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("foo=bar"));

        assert!(session_cookie(&headers).is_none());
    }
}
