//! OAuth credentials for read-only mailbox access.
//!
//! The first run performs the installed-application authorization-code flow:
//! a consent URL is shown, the browser redirects to a loopback listener on an
//! ephemeral port, and the returned code is exchanged for tokens. The result
//! is persisted as JSON next to the client secret so later runs reuse it
//! silently, refreshing the access token shortly before it expires.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ReportError, Result};

/// Scope granting read-only access to the mailbox.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens closer than this to expiry are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Where the client secret is read from and the token is persisted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPaths {
    /// OAuth client secret JSON downloaded from the cloud console.
    pub client_secret: PathBuf,
    /// Persisted token JSON, created on first authorization.
    pub token: PathBuf,
}

/// Client identity of an installed application.
#[derive(Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecret")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// On-disk layout of the client secret file.
#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

/// A persisted, renewable credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    /// Current access token.
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Expiry of `token`; `None` means the provider did not say.
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredToken")
            .field("token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl StoredToken {
    /// Whether the access token can be used at `now` without refreshing.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry > now + chrono::Duration::seconds(EXPIRY_MARGIN_SECS),
            None => true,
        }
    }
}

/// Successful answer of the token endpoint.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Query parameters delivered to the loopback redirect.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RedirectParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Owns the mailbox credential and its lifecycle.
///
/// The token is loaded lazily on the first call to [`Authenticator::access_token`].
pub struct Authenticator {
    paths: CredentialPaths,
    http: reqwest::blocking::Client,
    token: Option<StoredToken>,
}

impl Authenticator {
    /// Create an authenticator; nothing is read until a token is needed.
    pub fn new(paths: CredentialPaths, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReportError::Auth(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            paths,
            http,
            token: None,
        })
    }

    /// The credential file locations.
    pub fn paths(&self) -> &CredentialPaths {
        &self.paths
    }

    /// Return a usable access token, authorizing or refreshing as needed.
    ///
    /// `prompt` is called with the consent URL when interactive
    /// authorization is required.
    pub fn access_token(&mut self, prompt: &dyn Fn(&str)) -> Result<String> {
        if self.token.is_none() && !self.load()? {
            self.acquire(prompt)?;
        }

        let fresh = self.token.as_ref().is_some_and(|t| t.is_fresh(Utc::now()));
        if !fresh {
            self.refresh()?;
        }

        self.token
            .as_ref()
            .map(|t| t.token.clone())
            .ok_or_else(|| ReportError::Auth("no token available".into()))
    }

    /// Load a previously persisted token. Returns `false` if none exists.
    pub fn load(&mut self) -> Result<bool> {
        let path = &self.paths.token;
        if !path.exists() {
            return Ok(false);
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
        let token: StoredToken = serde_json::from_str(&raw).map_err(|e| {
            ReportError::Auth(format!("token file '{}' is invalid: {e}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "Loaded persisted token");
        self.token = Some(token);
        Ok(true)
    }

    /// Run the interactive authorization flow and persist the result.
    pub fn acquire(&mut self, prompt: &dyn Fn(&str)) -> Result<&StoredToken> {
        let secret = read_client_secret(&self.paths.client_secret)?;

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .map_err(|e| ReportError::Auth(format!("cannot open loopback listener: {e}")))?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://localhost:{port}/");

        let verifier = code_verifier();
        let state = uuid::Uuid::new_v4().simple().to_string();
        let url = authorization_url(&secret, &redirect_uri, &state, &code_challenge(&verifier))?;

        tracing::info!(port, "Waiting for authorization redirect");
        prompt(url.as_str());

        let params = wait_for_redirect(&listener)?;
        if let Some(error) = params.error {
            return Err(ReportError::Auth(format!("authorization denied: {error}")));
        }
        if params.state.as_deref() != Some(state.as_str()) {
            return Err(ReportError::Auth("authorization state mismatch".into()));
        }
        let code = params
            .code
            .ok_or_else(|| ReportError::Auth("redirect carried no authorization code".into()))?;

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("code_verifier", verifier.as_str()),
        ];
        let response = self.request_token(&secret.token_uri, &form)?;

        let token = StoredToken {
            token: response.access_token,
            refresh_token: response.refresh_token,
            token_uri: secret.token_uri.clone(),
            client_id: secret.client_id.clone(),
            client_secret: secret.client_secret.clone(),
            scopes: granted_scopes(response.scope.as_deref()),
            expiry: expiry_from(response.expires_in),
        };
        tracing::info!("Authorization complete");
        self.token = Some(token);
        self.persist()?;
        self.current()
    }

    /// Renew the access token with the refresh token and persist it.
    pub fn refresh(&mut self) -> Result<&StoredToken> {
        if self.token.is_none() && !self.load()? {
            return Err(ReportError::Auth("nothing to refresh; authorize first".into()));
        }
        // Work on a copy so a failed request leaves the current token in place.
        let mut token = self.current()?.clone();

        let refresh_token = token.refresh_token.clone().ok_or_else(|| {
            ReportError::Auth(format!(
                "token in '{}' has expired and carries no refresh token; delete it and authorize again",
                self.paths.token.display()
            ))
        })?;

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", token.client_id.as_str()),
            ("client_secret", token.client_secret.as_str()),
        ];
        let response = self.request_token(&token.token_uri, &form)?;

        token.token = response.access_token;
        token.expiry = expiry_from(response.expires_in);
        if let Some(rotated) = response.refresh_token {
            token.refresh_token = Some(rotated);
        }
        tracing::info!("Refreshed access token");
        self.token = Some(token);
        self.persist()?;
        self.current()
    }

    /// Write the current token to the token file.
    pub fn persist(&self) -> Result<()> {
        let token = self
            .token
            .as_ref()
            .ok_or_else(|| ReportError::Auth("no token to persist".into()))?;
        let path = &self.paths.token;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ReportError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(token)
            .map_err(|e| ReportError::Auth(format!("cannot serialize token: {e}")))?;
        std::fs::write(path, json).map_err(|e| ReportError::io(path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| ReportError::io(path, e))?;
        }

        tracing::debug!(path = %path.display(), "Persisted token");
        Ok(())
    }

    fn current(&self) -> Result<&StoredToken> {
        self.token
            .as_ref()
            .ok_or_else(|| ReportError::Auth("no token available".into()))
    }

    fn request_token(&self, token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(token_uri)
            .form(form)
            .send()
            .map_err(|e| ReportError::Http {
                url: token_uri.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ReportError::Auth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        response
            .json()
            .map_err(|e| ReportError::InvalidResponse(format!("token response: {e}")))
    }
}

/// Read an installed-app (or web) client secret file.
pub fn read_client_secret(path: &Path) -> Result<ClientSecret> {
    if !path.exists() {
        return Err(ReportError::FileNotFound(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
    parse_client_secret(&raw)
        .map_err(|reason| ReportError::Auth(format!("'{}': {reason}", path.display())))
}

/// Parse client secret JSON, accepting either the `installed` or `web` layout.
pub fn parse_client_secret(raw: &str) -> std::result::Result<ClientSecret, String> {
    let file: ClientSecretFile = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    file.installed
        .or(file.web)
        .ok_or_else(|| "expected an \"installed\" or \"web\" client section".to_string())
}

/// Build the consent URL for the authorization-code flow with PKCE.
pub fn authorization_url(
    secret: &ClientSecret,
    redirect_uri: &str,
    state: &str,
    challenge: &str,
) -> Result<Url> {
    Url::parse_with_params(
        &secret.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secret.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", GMAIL_READONLY_SCOPE),
            ("state", state),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| ReportError::Auth(format!("invalid auth_uri '{}': {e}", secret.auth_uri)))
}

/// Extract redirect parameters from an HTTP request target like `/?code=..`.
pub fn parse_redirect_target(target: &str) -> Result<RedirectParams> {
    let url = Url::parse(&format!("http://localhost{target}"))
        .map_err(|e| ReportError::Auth(format!("malformed redirect '{target}': {e}")))?;

    let mut params = RedirectParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(params)
}

/// Serve the loopback listener until a request carries a code or an error.
fn wait_for_redirect(listener: &TcpListener) -> Result<RedirectParams> {
    loop {
        let (mut stream, _) = listener.accept()?;
        let params = read_request_target(&stream).and_then(|t| parse_redirect_target(&t));

        match params {
            Ok(p) if p.code.is_some() || p.error.is_some() => {
                respond(
                    &mut stream,
                    "200 OK",
                    "The authentication flow has completed. You may close this window.",
                );
                return Ok(p);
            }
            Ok(_) => respond(&mut stream, "404 Not Found", "Not found."),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed loopback request");
                respond(&mut stream, "400 Bad Request", "Bad request.");
            }
        }
    }
}

fn read_request_target(stream: &TcpStream) -> Result<String> {
    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line)?;
    line.split_whitespace()
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| ReportError::Auth(format!("malformed request line '{}'", line.trim())))
}

fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()) {
        tracing::debug!(error = %e, "Failed to answer loopback request");
    }
}

/// A PKCE code verifier: 64 characters from the unreserved set.
fn code_verifier() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// The S256 challenge for a verifier.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn granted_scopes(scope: Option<&str>) -> Vec<String> {
    match scope {
        Some(s) => s.split_whitespace().map(str::to_string).collect(),
        None => vec![GMAIL_READONLY_SCOPE.to_string()],
    }
}

fn expiry_from(expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in.map(|secs| Utc::now() + chrono::Duration::seconds(secs))
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> ClientSecret {
        parse_client_secret(
            r#"{"installed":{"client_id":"abc.apps","client_secret":"s3cret",
                "auth_uri":"https://accounts.example.com/auth",
                "token_uri":"https://oauth.example.com/token",
                "redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_client_secret_installed_and_web() {
        assert_eq!(secret().client_id, "abc.apps");
        let web = parse_client_secret(r#"{"web":{"client_id":"w"}}"#).unwrap();
        assert_eq!(web.token_uri, DEFAULT_TOKEN_URI);
        assert!(parse_client_secret(r#"{"other":{}}"#).is_err());
    }

    #[test]
    fn test_code_challenge_known_vector() {
        // RFC 7636 appendix B.
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_code_verifier_shape() {
        let v = code_verifier();
        assert_eq!(v.len(), 64);
        assert!(v.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_authorization_url_params() {
        let url = authorization_url(&secret(), "http://localhost:8080/", "st", "ch").unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(url.host_str(), Some("accounts.example.com"));
        assert_eq!(pairs["scope"], GMAIL_READONLY_SCOPE);
        assert_eq!(pairs["redirect_uri"], "http://localhost:8080/");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["access_type"], "offline");
    }

    #[test]
    fn test_parse_redirect_target() {
        let p = parse_redirect_target("/?state=xyz&code=4%2F0Ab&scope=a").unwrap();
        assert_eq!(p.code.as_deref(), Some("4/0Ab"));
        assert_eq!(p.state.as_deref(), Some("xyz"));
        let denied = parse_redirect_target("/?error=access_denied").unwrap();
        assert_eq!(denied.error.as_deref(), Some("access_denied"));
        assert_eq!(
            parse_redirect_target("/favicon.ico").unwrap(),
            RedirectParams::default()
        );
    }

    #[test]
    fn test_token_freshness_margin() {
        let now = Utc::now();
        let mut token = StoredToken {
            token: "t".into(),
            refresh_token: None,
            token_uri: DEFAULT_TOKEN_URI.into(),
            client_id: "c".into(),
            client_secret: String::new(),
            scopes: vec![],
            expiry: Some(now + chrono::Duration::seconds(30)),
        };
        assert!(!token.is_fresh(now));
        token.expiry = Some(now + chrono::Duration::minutes(30));
        assert!(token.is_fresh(now));
        token.expiry = None;
        assert!(token.is_fresh(now));
    }

    #[test]
    fn test_stored_token_reads_python_layout() {
        let raw = r#"{"token": "ya29.x", "refresh_token": "1//r",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "id", "client_secret": "sec",
            "scopes": ["https://www.googleapis.com/auth/gmail.readonly"],
            "universe_domain": "googleapis.com", "account": "",
            "expiry": "2025-07-01T12:00:00.123456Z"}"#;
        let token: StoredToken = serde_json::from_str(raw).unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("1//r"));
        assert!(token.expiry.is_some());
        assert!(!format!("{token:?}").contains("ya29"));
    }

    #[test]
    fn test_failed_refresh_keeps_token() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CredentialPaths {
            client_secret: dir.path().join("credentials.json"),
            token: dir.path().join("token.json"),
        };
        let mut auth = Authenticator::new(paths, Duration::from_secs(5)).unwrap();
        let stale = StoredToken {
            token: "old".into(),
            refresh_token: Some("refresh".into()),
            // Nothing listens on the discard port, so the request fails fast.
            token_uri: "http://127.0.0.1:9/token".into(),
            client_id: "id".into(),
            client_secret: "sec".into(),
            scopes: vec![],
            expiry: Some(Utc::now() - chrono::Duration::minutes(5)),
        };
        auth.token = Some(stale.clone());

        assert!(auth.refresh().is_err());
        assert_eq!(auth.token, Some(stale));
    }

    #[test]
    fn test_refresh_without_refresh_token_keeps_token() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CredentialPaths {
            client_secret: dir.path().join("credentials.json"),
            token: dir.path().join("token.json"),
        };
        let mut auth = Authenticator::new(paths, Duration::from_secs(5)).unwrap();
        assert!(matches!(auth.refresh(), Err(ReportError::Auth(_))));

        let token = StoredToken {
            token: "old".into(),
            refresh_token: None,
            token_uri: DEFAULT_TOKEN_URI.into(),
            client_id: "id".into(),
            client_secret: String::new(),
            scopes: vec![],
            expiry: Some(Utc::now()),
        };
        auth.token = Some(token.clone());
        assert!(auth.refresh().is_err());
        assert_eq!(auth.token, Some(token));
    }

    #[test]
    fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let paths = CredentialPaths {
            client_secret: dir.path().join("credentials.json"),
            token: dir.path().join("nested").join("token.json"),
        };
        let mut auth = Authenticator::new(paths.clone(), Duration::from_secs(5)).unwrap();
        assert!(!auth.load().unwrap());

        auth.token = Some(StoredToken {
            token: "access".into(),
            refresh_token: Some("refresh".into()),
            token_uri: DEFAULT_TOKEN_URI.into(),
            client_id: "id".into(),
            client_secret: "sec".into(),
            scopes: vec![GMAIL_READONLY_SCOPE.into()],
            expiry: None,
        });
        auth.persist().unwrap();

        let mut reloaded = Authenticator::new(paths, Duration::from_secs(5)).unwrap();
        assert!(reloaded.load().unwrap());
        assert_eq!(reloaded.token, auth.token);
        assert_eq!(reloaded.access_token(&|_| {}).unwrap(), "access");
    }
}
