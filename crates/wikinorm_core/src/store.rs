use std::collections::BTreeMap;
use std::env;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{DEFAULT_OPT_OUT_PROPERTY, DEFAULT_USER_AGENT, NormalizerConfig};

pub const CONTENT_MODEL_WIKITEXT: &str = "wikitext";

/// Change tags MediaWiki puts on revisions that undo earlier ones.
pub const REVERT_TAGS: &[&str] = &["mw-rollback", "mw-undo", "mw-manual-revert"];

/// Latest revision of a page plus the page facts the hook policy reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredPage {
    pub title: String,
    pub namespace: i32,
    pub content_model: String,
    pub is_redirect: bool,
    pub is_revert: bool,
    pub opted_out: bool,
    pub last_editor: Option<String>,
    pub revision_id: i64,
    pub timestamp: String,
    pub text: String,
}

impl StoredPage {
    pub fn is_wikitext(&self) -> bool {
        self.content_model == CONTENT_MODEL_WIKITEXT
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EditFlags {
    pub minor: bool,
    pub bot: bool,
    pub suppress_recent_changes: bool,
    /// The edit must not trigger another normalization round.
    pub internal: bool,
}

impl EditFlags {
    /// Flags for edits made by the normalizer itself.
    pub fn service() -> Self {
        Self {
            minor: true,
            bot: true,
            suppress_recent_changes: true,
            internal: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    pub title: String,
    pub text: String,
    pub summary: String,
    pub author: String,
    pub base_revision_id: Option<i64>,
    /// Timestamp of the revision the edit is based on; the wiki rejects the
    /// save as an edit conflict when the page changed since.
    pub base_timestamp: Option<String>,
    pub flags: EditFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedRevision {
    pub title: String,
    pub revision_id: Option<i64>,
    pub no_change: bool,
}

pub trait PageStore {
    fn login(&mut self, username: &str, password: &str) -> Result<()>;
    fn load_page(&mut self, title: &str) -> Result<Option<StoredPage>>;
    fn save_page(&mut self, request: &EditRequest) -> Result<SavedRevision>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub opt_out_property: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub max_write_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_env() -> Self {
        Self::from_env_with_defaults("", DEFAULT_USER_AGENT, DEFAULT_OPT_OUT_PROPERTY)
    }

    pub fn from_config(config: &NormalizerConfig) -> Self {
        let api_default = config.api_url_owned().unwrap_or_default();
        Self::from_env_with_defaults(
            &api_default,
            &config.user_agent(),
            config.opt_out_property(),
        )
    }

    fn from_env_with_defaults(
        api_url_default: &str,
        user_agent_default: &str,
        opt_out_property: &str,
    ) -> Self {
        Self {
            api_url: env_value("WIKI_API_URL", api_url_default),
            user_agent: env_value("WIKI_USER_AGENT", user_agent_default),
            opt_out_property: opt_out_property.to_string(),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("WIKI_RATE_LIMIT_READ", 300),
            rate_limit_write_ms: env_value_u64("WIKI_RATE_LIMIT_WRITE", 1_000),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            max_write_retries: env_value_usize("WIKI_HTTP_WRITE_RETRIES", 1),
            retry_delay_ms: env_value_u64("WIKI_HTTP_RETRY_DELAY_MS", 500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Read,
    Write,
}

/// Action API client for one wiki, with rate limiting and retry on
/// transient failures.
pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
    csrf_token: Option<String>,
    logged_in_as: Option<String>,
}

impl MediaWikiClient {
    pub fn from_config(config: &NormalizerConfig) -> Result<Self> {
        Self::new(MediaWikiClientConfig::from_config(config))
    }

    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            bail!("no wiki API URL configured (set WIKI_API_URL or [wiki] api_url)");
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
            csrf_token: None,
            logged_in_as: None,
        })
    }

    fn request_json(&mut self, params: &[(&str, String)], kind: RequestKind) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid WIKI_API_URL: {}", self.config.api_url))?;
        let max_retries = match kind {
            RequestKind::Read => self.config.max_retries,
            RequestKind::Write => self.config.max_write_retries,
        };

        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }

        for attempt in 0..=max_retries {
            self.apply_rate_limit(kind);
            let request = match kind {
                RequestKind::Read => self.client.get(base_url.clone()).query(&pairs),
                RequestKind::Write => self.client.post(base_url.clone()).form(&pairs),
            };
            let response = request
                .header("User-Agent", self.config.user_agent.clone())
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < max_retries && is_retryable_status(status) {
                            tracing::warn!(%status, attempt, "retrying MediaWiki API request");
                            self.wait_before_retry(attempt, kind);
                            continue;
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }

                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    if let Some(error) = payload.get("error") {
                        let code = error
                            .get("code")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown_error");
                        let info = error
                            .get("info")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown info");
                        bail!("MediaWiki API error [{code}]: {info}");
                    }
                    return Ok(payload);
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        tracing::warn!(%error, attempt, "retrying MediaWiki API request");
                        self.wait_before_retry(attempt, kind);
                        continue;
                    }
                    return Err(error).context("failed to call MediaWiki API");
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    fn apply_rate_limit(&mut self, kind: RequestKind) {
        let delay = match kind {
            RequestKind::Read => Duration::from_millis(self.config.rate_limit_read_ms),
            RequestKind::Write => Duration::from_millis(self.config.rate_limit_write_ms),
        };
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize, kind: RequestKind) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let multiplier = if kind == RequestKind::Write { 2u64 } else { 1u64 };
        sleep(Duration::from_millis(
            base.saturating_mul(multiplier).saturating_add(jitter),
        ));
    }

    fn ensure_csrf_token(&mut self) -> Result<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        let response = self.request_json(
            &[
                ("action", "query".to_string()),
                ("meta", "tokens".to_string()),
            ],
            RequestKind::Read,
        )?;
        let parsed: TokenQueryResponse =
            serde_json::from_value(response).context("failed to decode csrf token response")?;
        let token = parsed
            .query
            .tokens
            .and_then(|tokens| tokens.csrftoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?;
        self.csrf_token = Some(token.clone());
        Ok(token)
    }
}

impl PageStore for MediaWikiClient {
    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let token_response = self.request_json(
            &[
                ("action", "query".to_string()),
                ("meta", "tokens".to_string()),
                ("type", "login".to_string()),
            ],
            RequestKind::Read,
        )?;
        let token_payload: TokenQueryResponse = serde_json::from_value(token_response)
            .context("failed to decode login token response")?;
        let login_token = token_payload
            .query
            .tokens
            .and_then(|tokens| tokens.logintoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?;

        let login_response = self.request_json(
            &[
                ("action", "login".to_string()),
                ("lgname", username.to_string()),
                ("lgpassword", password.to_string()),
                ("lgtoken", login_token),
            ],
            RequestKind::Write,
        )?;
        let login_payload: LoginResponse =
            serde_json::from_value(login_response).context("failed to decode login response")?;
        match login_payload.login.result.as_deref() {
            Some("Success") => {
                self.csrf_token = None;
                let account = login_payload
                    .login
                    .lgusername
                    .unwrap_or_else(|| account_name(username).to_string());
                tracing::info!(account = %account, "logged in to MediaWiki");
                self.logged_in_as = Some(account);
                Ok(())
            }
            other => bail!(
                "MediaWiki login failed: {}",
                login_payload
                    .login
                    .reason
                    .or_else(|| other.map(ToString::to_string))
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
        }
    }

    fn load_page(&mut self, title: &str) -> Result<Option<StoredPage>> {
        let response = self.request_json(
            &[
                ("action", "query".to_string()),
                ("titles", title.to_string()),
                ("prop", "revisions|info|pageprops".to_string()),
                ("rvprop", "content|ids|timestamp|user|tags".to_string()),
                ("rvslots", "main".to_string()),
                ("ppprop", self.config.opt_out_property.clone()),
            ],
            RequestKind::Read,
        )?;
        let opt_out_property = self.config.opt_out_property.clone();
        parse_page_response(response, &opt_out_property)
            .with_context(|| format!("failed to load page {title}"))
    }

    fn save_page(&mut self, request: &EditRequest) -> Result<SavedRevision> {
        if let Some(account) = &self.logged_in_as
            && account != &request.author
        {
            bail!(
                "cannot save {} as {}: logged in as {}",
                request.title,
                request.author,
                account
            );
        }
        let token = self.ensure_csrf_token()?;
        let response = self.request_json(&edit_params(request, token), RequestKind::Write)?;
        let edit_payload: EditResponse =
            serde_json::from_value(response).context("failed to decode edit response")?;
        let edit = edit_payload
            .edit
            .ok_or_else(|| anyhow::anyhow!("missing edit payload in API response"))?;
        if edit.result.as_deref() != Some("Success") {
            bail!(
                "MediaWiki edit failed for {}: {}",
                request.title,
                edit.result.unwrap_or_else(|| "unknown".to_string())
            );
        }

        Ok(SavedRevision {
            title: edit.title.unwrap_or_else(|| request.title.clone()),
            revision_id: edit.newrevid,
            no_change: edit.nochange.unwrap_or(false),
        })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

/// Bot passwords log in as `Account@label`; edits are attributed to
/// `Account`.
fn account_name(username: &str) -> &str {
    username.split_once('@').map_or(username, |(account, _)| account)
}

/// Edit parameters for one save. Bot edits are hidden from recent changes by
/// default, which covers `suppress_recent_changes`; `internal` edits only
/// ever rewrite existing pages.
fn edit_params(request: &EditRequest, token: String) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("action", "edit".to_string()),
        ("title", request.title.clone()),
        ("text", request.text.clone()),
        ("summary", request.summary.clone()),
    ];
    if let Some(revision_id) = request.base_revision_id {
        params.push(("baserevid", revision_id.to_string()));
    }
    if let Some(timestamp) = &request.base_timestamp {
        params.push(("basetimestamp", timestamp.clone()));
    }
    if request.flags.minor {
        params.push(("minor", "1".to_string()));
    } else {
        params.push(("notminor", "1".to_string()));
    }
    if request.flags.bot || request.flags.suppress_recent_changes {
        params.push(("bot", "1".to_string()));
    }
    if request.flags.internal {
        params.push(("nocreate", "1".to_string()));
    }
    params.push(("token", token));
    params
}

fn parse_page_response(response: Value, opt_out_property: &str) -> Result<Option<StoredPage>> {
    let parsed: PageQueryResponse =
        serde_json::from_value(response).context("failed to decode page query response")?;
    let Some(page) = parsed.query.pages.into_iter().next() else {
        return Ok(None);
    };
    if page.invalid.unwrap_or(false) {
        bail!(
            "invalid title: {}",
            page.invalidreason.unwrap_or_else(|| page.title.clone())
        );
    }
    if page.missing.unwrap_or(false) {
        return Ok(None);
    }
    let Some(revision) = page.revisions.into_iter().next() else {
        return Ok(None);
    };
    let slot = revision
        .slots
        .and_then(|slots| slots.main)
        .ok_or_else(|| anyhow::anyhow!("revision {} has no main slot", revision.revid))?;

    let is_revert = revision
        .tags
        .iter()
        .any(|tag| REVERT_TAGS.contains(&tag.as_str()));
    let content_model = slot
        .contentmodel
        .or(page.contentmodel)
        .unwrap_or_else(|| CONTENT_MODEL_WIKITEXT.to_string());

    Ok(Some(StoredPage {
        title: page.title,
        namespace: page.ns,
        content_model,
        is_redirect: page.redirect,
        is_revert,
        opted_out: page.pageprops.contains_key(opt_out_property),
        last_editor: revision.user,
        revision_id: revision.revid,
        timestamp: revision.timestamp,
        text: slot.content,
    }))
}

fn env_value(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct PageQueryResponse {
    #[serde(default)]
    query: PageQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct PageQueryPayload {
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    #[serde(default)]
    ns: i32,
    title: String,
    missing: Option<bool>,
    invalid: Option<bool>,
    invalidreason: Option<String>,
    contentmodel: Option<String>,
    #[serde(default)]
    redirect: bool,
    #[serde(default)]
    pageprops: BTreeMap<String, Value>,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    revid: i64,
    timestamp: String,
    user: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    contentmodel: Option<String>,
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    logintoken: Option<String>,
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
    lgusername: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct EditPayload {
    result: Option<String>,
    title: Option<String>,
    newrevid: Option<i64>,
    nochange: Option<bool>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn page_response(tags: &[&str], pageprops: Value) -> Value {
        json!({
            "batchcomplete": true,
            "query": {
                "pages": [{
                    "pageid": 12,
                    "ns": 0,
                    "title": "Alpha",
                    "contentmodel": "wikitext",
                    "pageprops": pageprops,
                    "revisions": [{
                        "revid": 345,
                        "parentid": 344,
                        "user": "Editor",
                        "timestamp": "2026-01-02T03:04:05Z",
                        "tags": tags,
                        "slots": {
                            "main": {
                                "contentmodel": "wikitext",
                                "contentformat": "text/x-wiki",
                                "content": "*item"
                            }
                        }
                    }]
                }]
            }
        })
    }

    #[test]
    fn page_response_maps_to_stored_page() {
        let page = parse_page_response(page_response(&[], json!({})), "nowikinorm")
            .expect("parse")
            .expect("page exists");
        assert_eq!(page.title, "Alpha");
        assert_eq!(page.namespace, 0);
        assert!(page.is_wikitext());
        assert!(!page.is_redirect);
        assert!(!page.is_revert);
        assert!(!page.opted_out);
        assert_eq!(page.last_editor.as_deref(), Some("Editor"));
        assert_eq!(page.revision_id, 345);
        assert_eq!(page.text, "*item");
    }

    #[test]
    fn revert_tags_and_opt_out_property_are_detected() {
        let page = parse_page_response(
            page_response(&["mw-undo"], json!({ "nowikinorm": "" })),
            "nowikinorm",
        )
        .expect("parse")
        .expect("page exists");
        assert!(page.is_revert);
        assert!(page.opted_out);

        let page = parse_page_response(
            page_response(&["mobile edit"], json!({ "other": "" })),
            "nowikinorm",
        )
        .expect("parse")
        .expect("page exists");
        assert!(!page.is_revert);
        assert!(!page.opted_out);
    }

    #[test]
    fn missing_page_is_none_and_invalid_title_is_an_error() {
        let missing = json!({
            "query": { "pages": [{ "ns": 0, "title": "Nope", "missing": true }] }
        });
        assert!(parse_page_response(missing, "nowikinorm").expect("parse").is_none());

        let invalid = json!({
            "query": { "pages": [{
                "title": "a[b",
                "invalid": true,
                "invalidreason": "The requested page title contains invalid characters"
            }] }
        });
        let error = parse_page_response(invalid, "nowikinorm").expect_err("must fail");
        assert!(error.to_string().contains("invalid characters"));
    }

    #[test]
    fn service_flags_render_as_edit_parameters() {
        let request = EditRequest {
            title: "Alpha".to_string(),
            text: "* item".to_string(),
            summary: "Normalize wikitext".to_string(),
            author: "Wikinorm".to_string(),
            base_revision_id: Some(345),
            base_timestamp: Some("2026-01-02T03:04:05Z".to_string()),
            flags: EditFlags::service(),
        };
        let params = edit_params(&request, "token+\\".to_string());
        let keys = params.iter().map(|(key, _)| *key).collect::<Vec<_>>();
        assert!(params.contains(&("basetimestamp", "2026-01-02T03:04:05Z".to_string())));
        assert_eq!(
            keys,
            vec![
                "action",
                "title",
                "text",
                "summary",
                "baserevid",
                "basetimestamp",
                "minor",
                "bot",
                "nocreate",
                "token"
            ]
        );

        let plain = EditRequest {
            flags: EditFlags::default(),
            base_revision_id: None,
            base_timestamp: None,
            ..request
        };
        let keys = edit_params(&plain, "t".to_string())
            .into_iter()
            .map(|(key, _)| key)
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["action", "title", "text", "summary", "notminor", "token"]);
    }

    #[test]
    fn bot_password_logins_edit_as_the_account() {
        assert_eq!(account_name("Wikinorm@normalizer"), "Wikinorm");
        assert_eq!(account_name("Wikinorm"), "Wikinorm");
    }

    #[test]
    fn client_requires_an_api_url() {
        let mut config = MediaWikiClientConfig::from_env();
        config.api_url = String::new();
        assert!(MediaWikiClient::new(config).is_err());
    }
}
