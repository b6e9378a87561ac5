#![forbid(unsafe_code)]

//! Client for the iKuai router management API.
//!
//! Logs in lazily on the first call and keeps the session cookie until a call
//! fails, at which point the next call logs in again.

use bytes::Bytes;
use http::{Method, header};
use ikuai_proto::msg::{CallReq, CallResp, SessionKey};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;

mod http_util;
mod query;
mod session;

pub use http_util::ConnectOptions;

/// Raw reply of a call; callers decide what a non-`Success` envelope means.
pub type Reply<T> = CallResp<T>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
    #[error("invalid request: {0}")]
    Request(#[from] http::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("login rejected: [{result}] {err_msg}")]
    Login { result: i64, err_msg: String },
    #[error("login response carried no session cookie")]
    MissingSessionCookie,
}

#[derive(Debug)]
pub struct Client {
    base_url: String,
    username: String,
    password: String,
    opts: ConnectOptions,
    session: RwLock<Option<SessionKey>>,
}

impl Client {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        opts: ConnectOptions,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self {
            base_url,
            username: username.into(),
            password: password.into(),
            opts,
            session: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn session_key(&self) -> Result<SessionKey, ClientError> {
        if let Some(key) = self.session.read().await.as_ref() {
            return Ok(key.clone());
        }

        let mut session = self.session.write().await;
        // another caller may have logged in while we waited for the lock
        if let Some(key) = session.as_ref() {
            return Ok(key.clone());
        }
        let key =
            session::login(&self.base_url, &self.username, &self.password, self.opts).await?;
        *session = Some(key.clone());

        Ok(key)
    }

    async fn invalidate_session(&self) {
        if self.session.write().await.take().is_some() {
            log::debug!("session for {} invalidated", self.base_url);
        }
    }

    async fn call<P, T>(&self, func_name: &str, param: P) -> Result<Reply<T>, ClientError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let body = Bytes::from(serde_json::to_vec(&CallReq {
            func_name: func_name.to_owned(),
            action: "show".to_owned(),
            param,
        })?);

        let res: Result<Reply<T>, ClientError> = async {
            let key = self.session_key().await?;
            let req = http_util::basic_request_builder(
                &format!("{}/Action/call", self.base_url),
                Method::POST,
            )?
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len())
            .header(header::COOKIE, session::cookie_header(&self.username, &key))
            .body(body)?;

            let resp = http_util::send_http_request(req, self.opts).await?;
            if !resp.status().is_success() {
                return Err(ClientError::Status(resp.status().as_u16()));
            }

            let reply: Reply<T> = serde_json::from_slice(resp.body())?;
            Ok(reply)
        }
        .await;

        match &res {
            Ok(reply) if reply.is_success() => {
                log::trace!("{func_name}: {}", reply.err_msg);
            }
            Ok(reply) => {
                log::debug!("{func_name} failed: [{}] {}", reply.result, reply.err_msg);
                self.invalidate_session().await;
            }
            Err(e) => {
                log::debug!("{func_name} failed: {e}");
                self.invalidate_session().await;
            }
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    use super::*;

    /// Read one request, returning its path, headers and body.
    async fn read_request(socket: &mut TcpStream) -> (String, String, String) {
        let mut buf = Vec::new();
        let mut chunk = [0; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            assert!(
                n > 0 || buf.windows(4).any(|w| w == b"\r\n\r\n"),
                "connection closed before request headers"
            );
            let text = String::from_utf8_lossy(&buf).into_owned();
            if let Some((head, body)) = text.split_once("\r\n\r\n") {
                let length = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length: "))
                    .map(|l| l.parse::<usize>().unwrap())
                    .unwrap_or(0);
                if body.len() >= length || n == 0 {
                    let path = head.split(' ').nth(1).unwrap().to_owned();
                    return (path, head.to_owned(), body.to_owned());
                }
            }
        }
    }

    /// A fake appliance that accepts `sess_key=k<n>` for the n-th login.
    async fn fake_appliance(
        call_reply: &'static str,
    ) -> (String, Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let logins = Arc::new(AtomicUsize::new(0));

        let handle = tokio::spawn({
            let logins = logins.clone();
            async move {
                loop {
                    let (mut socket, _) = listener.accept().await.unwrap();
                    let (path, head, body) = read_request(&mut socket).await;
                    let resp = match path.as_str() {
                        "/Action/login" => {
                            assert!(body.contains("\"passwd\":\"21232f297a57a5a743894a0e4a801fc3\""));
                            let n = logins.fetch_add(1, Ordering::SeqCst) + 1;
                            format!(
                                "HTTP/1.1 200 OK\r\nSet-Cookie: sess_key=k{n}; path=/\r\n\r\n{}",
                                r#"{"Result":10000,"ErrMsg":"Success"}"#
                            )
                        }
                        "/Action/call" => {
                            assert!(head.contains("cookie: username=admin; sess_key=k"));
                            assert!(body.contains("\"action\":\"show\""));
                            format!("HTTP/1.1 200 OK\r\n\r\n{call_reply}")
                        }
                        _ => "HTTP/1.1 404 Not Found\r\n\r\n".to_owned(),
                    };
                    socket.write_all(resp.as_bytes()).await.unwrap();
                }
            }
        });

        (format!("http://{addr}/"), logins, handle)
    }

    #[tokio::test]
    async fn logs_in_once_and_reuses_session() {
        let (url, logins, server) = fake_appliance(
            r#"{"Result":30000,"ErrMsg":"Success","Data":{"data":[{"mac":"aa"}],"total":1}}"#,
        )
        .await;
        let client = Client::new(url, "admin", "admin", ConnectOptions::default());

        let first = client.show_monitor_lan().await.unwrap();
        let second = client.show_monitor_lan().await.unwrap();

        assert!(first.is_success());
        assert_eq!(second.data.unwrap().data[0].mac, "aa");
        assert_eq!(logins.load(Ordering::SeqCst), 1);
        server.abort();
    }

    #[tokio::test]
    async fn failed_call_forces_new_login() {
        let (url, logins, server) =
            fake_appliance(r#"{"Result":10014,"ErrMsg":"no login authentication"}"#).await;
        let client = Client::new(url, "admin", "admin", ConnectOptions::default());

        let reply = client.show_monitor_interface().await.unwrap();
        assert!(!reply.is_success());
        assert!(client.session.read().await.is_none());

        client.show_monitor_interface().await.unwrap();
        assert_eq!(logins.load(Ordering::SeqCst), 2);
        server.abort();
    }

    #[tokio::test]
    async fn unreachable_appliance_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::new(
            format!("http://{addr}"),
            "admin",
            "admin",
            ConnectOptions::default(),
        );

        assert!(matches!(
            client.show_sys_stat().await,
            Err(ClientError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn hung_appliance_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server: tokio::task::JoinHandle<()> = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                held.push(socket);
            }
        });

        let client = Client::new(
            format!("http://{addr}"),
            "admin",
            "admin",
            ConnectOptions {
                timeout: std::time::Duration::from_millis(200),
                ..ConnectOptions::default()
            },
        );

        assert!(matches!(
            client.show_sys_stat().await,
            Err(ClientError::Transport(_))
        ));
        assert!(client.session.read().await.is_none());
        server.abort();
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = Client::new("http://10.0.1.253/", "u", "p", ConnectOptions::default());
        assert_eq!(client.base_url(), "http://10.0.1.253");
    }
}
