use std::time::Duration;

use reqwest::{header, redirect, Client, Identity, Method, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::handshake;
use super::store::SessionStore;
use crate::api::{ApiError, Result};
use crate::config::{Config, Credentials};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("covidpass/", env!("CARGO_PKG_VERSION"));

/// Load the PKCS#12 bundle named by `credentials`.
pub fn load_identity(credentials: &Credentials) -> Result<Identity> {
    let der = std::fs::read(&credentials.certfile).map_err(|e| {
        ApiError::Authentication(format!(
            "could not read certificate {}: {e}",
            credentials.certfile.display()
        ))
    })?;
    Identity::from_pkcs12_der(&der, &credentials.password).map_err(|e| {
        ApiError::Authentication(format!(
            "certificate {} could not be unlocked (wrong passphrase?): {e}",
            credentials.certfile.display()
        ))
    })
}

/// An authenticated connection to the CovidPass API.
///
/// Opening a session reuses the persisted token when it is still valid and
/// otherwise logs in through Touchstone. The token store is written back
/// when the session is closed or dropped.
pub struct AuthSession {
    client: Client,
    config: Config,
    store: SessionStore,
    /// Token came from disk and has not been accepted by the API yet.
    reused: bool,
    closed: bool,
}

impl AuthSession {
    pub async fn open(credentials: &Credentials, config: &Config) -> Result<Self> {
        let identity = load_identity(credentials)?;
        Self::open_with_identity(Some(identity), config).await
    }

    /// Open a session whose TLS client presents `identity`, if any.
    pub async fn open_with_identity(identity: Option<Identity>, config: &Config) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .redirect(redirect::Policy::none());
        if let Some(identity) = identity {
            builder = builder.identity(identity);
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::Authentication(format!("could not set up TLS client: {e}")))?;

        let mut store = SessionStore::new(config.session_file.clone());
        let reused = match store.load() {
            Ok(true) => {
                info!(path = %store.path().display(), "Reusing saved session");
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable session file");
                false
            }
        };

        let mut session = Self {
            client,
            config: config.clone(),
            store,
            reused,
            closed: false,
        };
        if !reused {
            session.authenticate().await?;
        }
        Ok(session)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the Touchstone handshake and persist the new token right away.
    async fn authenticate(&mut self) -> Result<()> {
        info!("Logging in through Touchstone");
        let data = handshake::login(
            &self.client,
            &self.config.authorize_url,
            &self.config.redirect_uri,
        )
        .await?;
        self.store.update(data);
        self.reused = false;
        self.flush()
    }

    /// Issue an authenticated request. The status code is not checked.
    pub async fn request(
        &mut self,
        method: Method,
        url: &str,
        params: Option<&[(&str, String)]>,
        json: Option<&Value>,
    ) -> Result<Response> {
        if !self.store.is_valid() {
            info!("Session expired, logging in again");
            self.authenticate().await?;
        }

        let response = self.send(method.clone(), url, params, json).await?;
        if response.status() == StatusCode::UNAUTHORIZED && self.reused {
            warn!(url, "Saved token was rejected, logging in again");
            self.store.clear().map_err(|e| ApiError::Storage(e.into()))?;
            self.authenticate().await?;
            return self.send(method, url, params, json).await;
        }
        if response.status().is_success() {
            self.reused = false;
        }
        Ok(response)
    }

    pub async fn get(&mut self, url: &str, params: Option<&[(&str, String)]>) -> Result<Response> {
        self.request(Method::GET, url, params, None).await
    }

    pub async fn post(&mut self, url: &str, json: &Value) -> Result<Response> {
        self.request(Method::POST, url, None, Some(json)).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        params: Option<&[(&str, String)]>,
        json: Option<&Value>,
    ) -> Result<Response> {
        let authorization = self
            .store
            .authorization()
            .ok_or_else(|| ApiError::Authentication("no access token".to_string()))?;

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(header::AUTHORIZATION, authorization);
        if let Some(params) = params {
            request = request.query(params);
        }
        if let Some(json) = json {
            request = request.json(json);
        }

        debug!(%method, url, "API request");
        request
            .send()
            .await
            .map_err(|e| ApiError::connectivity(url, e))
    }

    /// Persist the token store and release the session.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        self.store.save().map_err(|e| ApiError::Storage(e.into()))
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.flush() {
                warn!(error = %e, "Failed to save session on exit");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{SessionData, SessionStore};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REDIRECT_URI: &str = "https://covidpass.test";

    fn config_for(server: &MockServer, dir: &tempfile::TempDir) -> Config {
        Config {
            credentials_file: dir.path().join("credentials.json"),
            session_file: dir.path().join("cookies.json"),
            api_base_url: server.uri(),
            authorize_url: format!("{}/oauth2/authorize?client_id=test", server.uri()),
            redirect_uri: REDIRECT_URI.to_string(),
        }
    }

    fn token_redirect(token: &str) -> ResponseTemplate {
        ResponseTemplate::new(302).insert_header(
            "Location",
            format!("{REDIRECT_URI}/#access_token={token}&expires_in=3600&token_type=Bearer").as_str(),
        )
    }

    fn save_token(config: &Config, token: &str) {
        let mut store = SessionStore::new(config.session_file.clone());
        store.update(SessionData::new(
            token.to_string(),
            "Bearer".to_string(),
            chrono::Duration::hours(1),
        )
        .unwrap());
        store.save().unwrap();
    }

    #[tokio::test]
    async fn test_fresh_login_persists_token() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&server, &dir);

        Mock::given(method("GET"))
            .and(path("/oauth2/authorize"))
            .respond_with(token_redirect("fresh"))
            .expect(1)
            .mount(&server)
            .await;

        let session = AuthSession::open_with_identity(None, &config).await.unwrap();
        session.close().unwrap();

        let mut store = SessionStore::new(config.session_file.clone());
        assert!(store.load().unwrap());
        assert_eq!(store.authorization().as_deref(), Some("Bearer fresh"));
    }

    #[tokio::test]
    async fn test_second_session_skips_handshake() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&server, &dir);

        Mock::given(method("GET"))
            .and(path("/oauth2/authorize"))
            .respond_with(token_redirect("tok123"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header_eq("authorization", "Bearer tok123"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let url = format!("{}/ping", server.uri());
        {
            let mut first = AuthSession::open_with_identity(None, &config).await.unwrap();
            assert!(first.get(&url, None).await.unwrap().status().is_success());
        }
        let mut second = AuthSession::open_with_identity(None, &config).await.unwrap();
        assert!(second.get(&url, None).await.unwrap().status().is_success());

        let handshakes = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/oauth2/authorize")
            .count();
        assert_eq!(handshakes, 1);
    }

    #[tokio::test]
    async fn test_saml_form_is_submitted() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&server, &dir);

        Mock::given(method("GET"))
            .and(path("/oauth2/authorize"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/idp/sso"))
            .mount(&server)
            .await;
        let page = format!(
            r#"<html><form method="post" action="{}/saml2/idpresponse">
               <input type="hidden" name="SAMLResponse" value="c2FtbA&#x3d;&#x3d;"/>
               </form></html>"#,
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/idp/sso"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/saml2/idpresponse"))
            .and(body_string_contains("SAMLResponse=c2FtbA%3D%3D"))
            .respond_with(token_redirect("via-saml"))
            .expect(1)
            .mount(&server)
            .await;

        let session = AuthSession::open_with_identity(None, &config).await.unwrap();
        assert_eq!(session.store.authorization().as_deref(), Some("Bearer via-saml"));
    }

    #[tokio::test]
    async fn test_rejected_certificate() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&server, &dir);

        Mock::given(method("GET"))
            .and(path("/oauth2/authorize"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = AuthSession::open_with_identity(None, &config)
            .await
            .err()
            .expect("login must fail");
        assert!(matches!(err, ApiError::Authentication(_)));
        assert!(!config.session_file.exists());
    }

    #[tokio::test]
    async fn test_login_page_without_form() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&server, &dir);

        Mock::given(method("GET"))
            .and(path("/oauth2/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>down for maintenance</p>"))
            .mount(&server)
            .await;

        let err = AuthSession::open_with_identity(None, &config)
            .await
            .err()
            .expect("login must fail");
        assert!(matches!(err, ApiError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_stale_saved_token_triggers_one_login() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&server, &dir);
        save_token(&config, "stale");

        Mock::given(method("GET"))
            .and(path("/oauth2/authorize"))
            .respond_with(token_redirect("fresh"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header_eq("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header_eq("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = AuthSession::open_with_identity(None, &config).await.unwrap();
        let response = session.get(&format!("{}/ping", server.uri()), None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unauthorized_after_fresh_login_is_returned() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&server, &dir);

        Mock::given(method("GET"))
            .and(path("/oauth2/authorize"))
            .respond_with(token_redirect("fresh"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = AuthSession::open_with_identity(None, &config).await.unwrap();
        let response = session.get(&format!("{}/ping", server.uri()), None).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&server, &dir);
        save_token(&config, "tok");

        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(wiremock::matchers::body_json(json!({"hello": "world"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = AuthSession::open_with_identity(None, &config).await.unwrap();
        let response = session
            .post(&format!("{}/echo", server.uri()), &json!({"hello": "world"}))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connectivity_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&server, &dir);
        save_token(&config, "tok");

        let mut session = AuthSession::open_with_identity(None, &config).await.unwrap();
        let err = session
            .get("http://127.0.0.1:1/pass-v1/pass/access_status", None)
            .await
            .unwrap_err();
        assert!(err.is_connectivity(), "got {err:?}");
    }

    #[test]
    fn test_missing_certificate_file() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = Credentials {
            certfile: dir.path().join("cert.p12"),
            password: String::new(),
        };
        assert!(matches!(
            load_identity(&credentials),
            Err(ApiError::Authentication(_))
        ));
    }

    #[test]
    fn test_garbage_certificate_file() {
        let dir = tempfile::tempdir().unwrap();
        let certfile = dir.path().join("cert.p12");
        std::fs::write(&certfile, b"not a pkcs12 bundle").unwrap();
        let credentials = Credentials {
            certfile,
            password: "pw".to_string(),
        };
        assert!(matches!(
            load_identity(&credentials),
            Err(ApiError::Authentication(_))
        ));
    }
}
