use std::{future::Future, sync::Arc};

use reqwest::{Client, cookie::Jar, header::CONTENT_TYPE};
use tokio::sync::RwLock;
use url::Url;

use crate::{
    config::PortalConfig,
    error::{Error, Result},
    utils::{DEFAULT_USER_AGENT, default_header},
};

/// What the crawler needs from an authenticated portal identity.
///
/// URLs may be absolute or relative to the portal base URL.
pub trait Portal: Send + Sync {
    /// Submits the login form. `Ok(false)` means the portal rejected the
    /// credentials; `Err` is reserved for transport failures.
    fn login(&self, username: &str, password: &str) -> impl Future<Output = Result<bool>> + Send;

    fn is_logged_in(&self) -> impl Future<Output = Result<bool>> + Send;

    fn get(&self, url: &str) -> impl Future<Output = Result<String>> + Send;

    fn post(&self, url: &str, form: &[(&str, &str)]) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Expired,
}

/// One portal identity backed by a cookie-keeping HTTP client.
pub struct PortalSession {
    client: Client,
    config: Arc<PortalConfig>,
    base: Url,
    state: RwLock<SessionState>,
}

impl PortalSession {
    pub fn new(config: Arc<PortalConfig>) -> Result<Self> {
        let base = Url::parse(&config.base_url)?;
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_store(true)
            .cookie_provider(jar)
            .user_agent(DEFAULT_USER_AGENT)
            .default_headers(default_header())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            config,
            base,
            state: RwLock::new(SessionState::Unauthenticated),
        })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    fn resolve(&self, url: &str) -> Result<Url> {
        Ok(self.base.join(url)?)
    }

    async fn set_state(&self, state: SessionState) {
        let mut current = self.state.write().await;
        if *current != state {
            tracing::debug!(from = ?*current, to = ?state, "Session state changed");
            *current = state;
        }
    }

    /// Sends a request and reads the body, turning a login page served in
    /// place of content into [`Error::SessionExpired`].
    async fn fetch(&self, request: reqwest::RequestBuilder, url: &Url) -> Result<String> {
        let response = request.send().await?.error_for_status()?;
        let final_url = response.url().to_string();
        let body = response.text().await?;
        if self.config.is_session_expired(&final_url, &body) {
            tracing::warn!(%url, %final_url, "Portal answered with the login page");
            self.set_state(SessionState::Expired).await;
            return Err(Error::SessionExpired {
                url: url.to_string(),
            });
        }
        Ok(body)
    }

    /// Raw bytes of an attachment, fetched as this identity.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let url = self.resolve(url)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;
        let final_url = response.url().to_string();
        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/html"));
        let bytes = response.bytes().await?;
        if is_html && self.config.is_session_expired(&final_url, &String::from_utf8_lossy(&bytes)) {
            self.set_state(SessionState::Expired).await;
            return Err(Error::SessionExpired {
                url: url.to_string(),
            });
        }
        Ok(bytes.to_vec())
    }
}

impl Portal for PortalSession {
    #[tracing::instrument(level = tracing::Level::DEBUG, skip(self, password))]
    async fn login(&self, username: &str, password: &str) -> Result<bool> {
        let url = self.resolve(&self.config.login_path)?;
        let mut form = vec![
            (self.config.username_field.as_str(), username),
            (self.config.password_field.as_str(), password),
        ];
        form.extend(
            self.config
                .login_extra_fields
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        );

        let body = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let logged_in = body.contains(&self.config.logged_in_marker);
        if logged_in {
            tracing::info!("Logged in to portal");
            self.set_state(SessionState::Authenticated).await;
        } else {
            tracing::warn!("Portal rejected the login");
            self.set_state(SessionState::Unauthenticated).await;
        }
        Ok(logged_in)
    }

    async fn is_logged_in(&self) -> Result<bool> {
        if self.state().await != SessionState::Authenticated {
            return Ok(false);
        }
        let url = self.resolve(&self.config.probe_path)?;
        match self.fetch(self.client.get(url.clone()), &url).await {
            Ok(body) if body.contains(&self.config.logged_in_marker) => Ok(true),
            Ok(_) => {
                self.set_state(SessionState::Expired).await;
                Ok(false)
            }
            Err(Error::SessionExpired { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn get(&self, url: &str) -> Result<String> {
        let url = self.resolve(url)?;
        tracing::debug!(%url, "GET");
        self.fetch(self.client.get(url.clone()), &url).await
    }

    async fn post(&self, url: &str, form: &[(&str, &str)]) -> Result<String> {
        let url = self.resolve(url)?;
        tracing::debug!(%url, "POST");
        self.fetch(self.client.post(url.clone()).form(form), &url)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Mutex, mpsc},
        thread,
        time::Duration,
    };

    use super::*;

    /// Status, optional `Location` header and body.
    type Reply = (u16, Option<&'static str>, String);

    /// Loopback portal answering every request through `handler(url)`.
    struct StubServer {
        base_url: String,
        requests: Arc<Mutex<Vec<(String, String)>>>,
        shutdown_tx: Option<mpsc::Sender<()>>,
        handle: Option<thread::JoinHandle<()>>,
    }

    impl StubServer {
        fn spawn<F>(handler: F) -> Self
        where
            F: Fn(&str) -> Reply + Send + 'static,
        {
            let server = tiny_http::Server::http("127.0.0.1:0").expect("start stub portal");
            let base_url = format!("http://{}", server.server_addr());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&requests);
            let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

            let handle = thread::spawn(move || {
                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }
                    let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                        Ok(Some(request)) => request,
                        Ok(None) => continue,
                        Err(_) => break,
                    };
                    let mut body = String::new();
                    let _ = request.as_reader().read_to_string(&mut body);
                    let url = request.url().to_string();
                    seen.lock().unwrap().push((url.clone(), body));

                    let (status, location, text) = handler(&url);
                    let mut response = tiny_http::Response::from_string(text)
                        .with_status_code(status)
                        .with_header(
                            tiny_http::Header::from_bytes(
                                &b"Content-Type"[..],
                                &b"text/html; charset=utf-8"[..],
                            )
                            .expect("build header"),
                        );
                    if let Some(location) = location {
                        response = response.with_header(
                            tiny_http::Header::from_bytes(&b"Location"[..], location.as_bytes())
                                .expect("build header"),
                        );
                    }
                    let _ = request.respond(response);
                }
            });

            Self {
                base_url,
                requests,
                shutdown_tx: Some(shutdown_tx),
                handle: Some(handle),
            }
        }

        fn session(&self) -> PortalSession {
            let config = PortalConfig {
                base_url: self.base_url.clone(),
                request_timeout_secs: 5,
                ..PortalConfig::default()
            };
            PortalSession::new(Arc::new(config)).unwrap()
        }
    }

    impl Drop for StubServer {
        fn drop(&mut self) {
            if let Some(tx) = self.shutdown_tx.take() {
                let _ = tx.send(());
            }
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    const LOGGED_IN_PAGE: &str =
        r#"<html><body><a href="/ilos/lo/logout.acl">로그아웃</a></body></html>"#;

    #[tokio::test]
    async fn login_success_submits_form() {
        let server = StubServer::spawn(|_| (200, None, LOGGED_IN_PAGE.to_string()));
        let session = server.session();

        assert_eq!(session.state().await, SessionState::Unauthenticated);
        assert!(session.login("20241234", "hunter2").await.unwrap());
        assert_eq!(session.state().await, SessionState::Authenticated);

        let requests = server.requests.lock().unwrap().clone();
        let (url, body) = &requests[0];
        assert_eq!(url, "/ilos/lo/login.acl");
        assert!(body.contains("usr_id=20241234"));
        assert!(body.contains("usr_pwd=hunter2"));
        assert!(body.contains("returnURL="));
    }

    #[tokio::test]
    async fn login_rejected_is_not_an_error() {
        let server = StubServer::spawn(|_| {
            (
                200,
                None,
                "<script>alert('아이디 또는 비밀번호가 일치하지 않습니다.');</script>".to_string(),
            )
        });
        let session = server.session();

        assert!(!session.login("20241234", "wrong").await.unwrap());
        assert_eq!(session.state().await, SessionState::Unauthenticated);
        assert!(!session.is_logged_in().await.unwrap());
    }

    #[tokio::test]
    async fn expiry_marker_in_body() {
        let server = StubServer::spawn(|url| {
            if url.starts_with("/ilos/lo/login.acl") {
                (200, None, LOGGED_IN_PAGE.to_string())
            } else {
                (
                    200,
                    None,
                    "<script>alert('로그인 정보가 없습니다.');</script>".to_string(),
                )
            }
        });
        let session = server.session();
        assert!(session.login("20241234", "hunter2").await.unwrap());

        let err = session
            .get("/ilos/st/course/notice_list_form.acl")
            .await
            .unwrap_err();
        assert!(err.is_session_expired());
        assert_eq!(session.state().await, SessionState::Expired);
    }

    #[tokio::test]
    async fn redirect_to_login_form_is_expiry() {
        let server = StubServer::spawn(|url| {
            if url.starts_with("/ilos/main/member/login_form.acl") {
                (200, None, r#"<form id="login"></form>"#.to_string())
            } else {
                (302, Some("/ilos/main/member/login_form.acl"), String::new())
            }
        });
        let session = server.session();

        let err = session
            .post("/ilos/co/efile_list.acl", &[("CONTENT_SEQ", "55")])
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::SessionExpired { url } if url.ends_with("/ilos/co/efile_list.acl"))
        );
    }

    #[tokio::test]
    async fn logged_in_check_hits_main_page() {
        let server = StubServer::spawn(|_| (200, None, LOGGED_IN_PAGE.to_string()));
        let session = server.session();
        assert!(!session.is_logged_in().await.unwrap());
        session.login("20241234", "hunter2").await.unwrap();
        assert!(session.is_logged_in().await.unwrap());

        let main_page_hits = server
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url == "/ilos/main/main_form.acl")
            .count();
        assert_eq!(main_page_hits, 1);
    }

    #[tokio::test]
    async fn server_error_is_request_error() {
        let server = StubServer::spawn(|_| (500, None, "Internal Server Error".to_string()));
        let session = server.session();
        let err = session.get("/ilos/main/main_form.acl").await.unwrap_err();
        assert!(matches!(err, Error::Request(_)));
    }

    #[tokio::test]
    async fn download_returns_bytes() {
        let server = StubServer::spawn(|_| (200, None, "%PDF-1.4".to_string()));
        let session = server.session();
        let bytes = session
            .download("/ilos/co/efile_download.acl?FILE_SEQ=9&CONTENT_SEQ=55")
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.4");
    }

    #[tokio::test]
    #[ignore = "Requires valid credentials"]
    async fn live_login() {
        dotenvy::dotenv().ok();
        let id = std::env::var("ECLASS_ID").unwrap();
        let password = std::env::var("ECLASS_PASSWORD").unwrap();
        let session = PortalSession::new(Arc::new(PortalConfig::default())).unwrap();
        assert!(session.login(&id, &password).await.unwrap());
        assert!(session.is_logged_in().await.unwrap());
    }
}
