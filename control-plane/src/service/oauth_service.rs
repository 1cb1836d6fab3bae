//! # OAuth/OIDC Broker (C5)
//!
//! PKCE authorization-code flow state machine (§4.4): `authorize` mints a
//! verifier/challenge pair and an opaque `state` blob; `callback` exchanges
//! the code, pulls userinfo, and resolves or creates the local `User`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::entities::{NewUser, OAuthProvider, User};
use crate::domain::events::{OAuthAccountLinked, OAuthLogin, UserCreated};
use crate::repository::{OAuthRepository, UserRepository};
use crate::service::notification_service::NotificationService;
use crate::service::session_service::{IssuedSession, NewSessionRequest, SessionService};
use shared::auth::JwtService;
use shared::{ApiError, ApiResult};

const CODE_VERIFIER_LEN: usize = 64;

#[derive(Serialize, Deserialize)]
struct OAuthState {
    provider: String,
    code_verifier: String,
    redirect_uri: String,
    return_url: Option<String>,
}

pub struct AuthorizeRequest {
    pub provider: String,
    pub redirect_uri: String,
    pub return_url: Option<String>,
}

pub struct AuthorizeOutcome {
    pub authorize_url: String,
    pub state: String,
}

pub struct CallbackOutcome {
    pub user: User,
    pub issued_session: IssuedSession,
    pub access_token: String,
    pub return_url: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfoResponse {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
    #[serde(default)]
    groups: Option<serde_json::Value>,
    #[serde(default)]
    roles: Option<serde_json::Value>,
    #[serde(default)]
    group: Option<serde_json::Value>,
    #[serde(rename = "memberOf", default)]
    member_of: Option<serde_json::Value>,
}

impl UserInfoResponse {
    fn group_names(&self) -> Vec<String> {
        for candidate in [&self.groups, &self.roles, &self.group, &self.member_of] {
            if let Some(value) = candidate {
                return parse_group_claim(value);
            }
        }
        Vec::new()
    }
}

fn parse_group_claim(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        serde_json::Value::String(s) => s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect(),
        _ => Vec::new(),
    }
}

#[derive(Clone)]
pub struct OAuthService {
    repo: OAuthRepository,
    users: UserRepository,
    sessions: SessionService,
    jwt: JwtService,
    notifications: NotificationService,
    http: reqwest::Client,
    admin_groups: Vec<String>,
    default_role_is_admin: bool,
}

impl OAuthService {
    pub fn new(
        repo: OAuthRepository,
        users: UserRepository,
        sessions: SessionService,
        jwt: JwtService,
        notifications: NotificationService,
        admin_groups: Vec<String>,
        default_role: &str,
    ) -> Self {
        Self {
            repo,
            users,
            sessions,
            jwt,
            notifications,
            http: reqwest::Client::new(),
            admin_groups,
            default_role_is_admin: default_role.eq_ignore_ascii_case("admin"),
        }
    }

    pub async fn find_provider(&self, name: &str) -> ApiResult<OAuthProvider> {
        self.repo.find_provider_by_name(name).await?.ok_or_else(|| ApiError::NotFound(format!("unknown OAuth provider \"{name}\"")))
    }

    /// Registers or refreshes the single provider row configured via
    /// `OAUTH_*` env vars, so `authorize`/`callback` have something to
    /// resolve on the first request after startup.
    pub async fn upsert_configured_provider(&self, provider: OAuthProvider) -> ApiResult<OAuthProvider> {
        self.repo.upsert_provider(provider).await
    }

    pub async fn list_enabled_providers(&self) -> ApiResult<Vec<OAuthProvider>> {
        self.repo.list_enabled_providers().await
    }

    /// §4.4 step 1. `redirect_uri` is expected to already have been run
    /// through `normalize_redirect_uri` by the caller (the proxy-aware
    /// logic lives at the HTTP boundary, where `x-forwarded-proto` is
    /// visible).
    pub async fn authorize(&self, req: AuthorizeRequest) -> ApiResult<AuthorizeOutcome> {
        let provider = self.find_provider(&req.provider).await?;
        if !provider.enabled {
            return Err(ApiError::NotFound(format!("unknown OAuth provider \"{}\"", req.provider)));
        }

        let code_verifier = generate_code_verifier();
        let code_challenge = code_challenge_s256(&code_verifier);

        let state = OAuthState { provider: provider.name.clone(), code_verifier, redirect_uri: req.redirect_uri.clone(), return_url: req.return_url };
        let state_blob = encode_state(&state)?;

        let authorize_url = format!(
            "{issuer}/authorize?client_id={client_id}&response_type=code&redirect_uri={redirect_uri}&code_challenge={challenge}&code_challenge_method=S256&state={state}",
            issuer = provider.issuer_url.trim_end_matches('/'),
            client_id = urlencoding_component(&provider.client_id),
            redirect_uri = urlencoding_component(&req.redirect_uri),
            challenge = urlencoding_component(&code_challenge),
            state = urlencoding_component(&state_blob),
        );

        Ok(AuthorizeOutcome { authorize_url, state: state_blob })
    }

    /// §4.4 steps 2-4.
    pub async fn callback(&self, provider_name: &str, code: &str, state: &str) -> ApiResult<CallbackOutcome> {
        let decoded = decode_state(state)?;
        if decoded.provider != provider_name {
            return Err(ApiError::Validation("state does not match the callback provider".into()));
        }

        let provider = self.find_provider(provider_name).await?;

        let token_response = self
            .http
            .post(format!("{}/token", provider.issuer_url.trim_end_matches('/')))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", decoded.redirect_uri.as_str()),
                ("code_verifier", decoded.code_verifier.as_str()),
                ("client_id", provider.client_id.as_str()),
                ("client_secret", provider.client_secret_encrypted.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ApiError::BadGateway(format!("OAuth token exchange failed: {e}")))?;

        if !token_response.status().is_success() {
            return Err(ApiError::BadGateway(format!("OAuth provider returned {} during token exchange", token_response.status())));
        }
        let token: TokenResponse = token_response.json().await.map_err(|e| ApiError::BadGateway(format!("malformed token response: {e}")))?;

        let userinfo_response = self
            .http
            .get(format!("{}/userinfo", provider.issuer_url.trim_end_matches('/')))
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| ApiError::BadGateway(format!("OAuth userinfo request failed: {e}")))?;

        if !userinfo_response.status().is_success() {
            return Err(ApiError::BadGateway(format!("OAuth provider returned {} fetching userinfo", userinfo_response.status())));
        }
        let userinfo: UserInfoResponse = userinfo_response.json().await.map_err(|e| ApiError::Validation(format!("userinfo missing required claims: {e}")))?;

        if userinfo.sub.is_empty() {
            return Err(ApiError::Validation("userinfo response is missing \"sub\"".into()));
        }

        let group_names = userinfo.group_names();
        let derived_is_admin = group_names.iter().any(|g| self.admin_groups.iter().any(|ag| ag.eq_ignore_ascii_case(g)));

        let user = self.resolve_user(&provider, &userinfo, derived_is_admin).await?;

        if !user.is_active {
            return Err(ApiError::Forbidden("this account has been suspended".into()));
        }

        let issued = self
            .sessions
            .issue(NewSessionRequest {
                user_id: user.id,
                device_name: Some(format!("OAuth ({})", provider.name)),
                user_agent: None,
                ip_address: None,
            })
            .await?;
        let access_token = self.jwt.generate_access_token(&user.id.to_string(), &issued.session.id.to_string())?;

        self.notifications.dispatch_scoped(&OAuthLogin { user_id: user.id, provider: provider.name.clone() }, None, Some(user.id)).await?;

        Ok(CallbackOutcome { user, issued_session: issued, access_token, return_url: decoded.return_url })
    }

    async fn resolve_user(&self, provider: &OAuthProvider, userinfo: &UserInfoResponse, derived_is_admin: bool) -> ApiResult<User> {
        if let Some(account) = self.repo.find_account(provider.id, &userinfo.sub).await? {
            let user = self.users.find_by_id(account.user_id).await?;
            if derived_is_admin != user.is_admin {
                self.users.set_is_admin(user.id, derived_is_admin).await?;
                return self.users.find_by_id(user.id).await;
            }
            return Ok(user);
        }

        if let Some(email) = &userinfo.email {
            if let Some(existing_user) = self.users.find_by_email(email).await? {
                self.repo
                    .link_account(existing_user.id, provider.id, &userinfo.sub, userinfo.email.as_deref(), userinfo.name.as_deref(), userinfo.picture.as_deref())
                    .await?;
                self.notifications
                    .dispatch_scoped(&OAuthAccountLinked { user_id: existing_user.id, provider: provider.name.clone() }, None, Some(existing_user.id))
                    .await?;
                return Ok(existing_user);
            }
        }

        if !provider.auto_register {
            return Err(ApiError::Forbidden("this account is not registered and auto-registration is disabled".into()));
        }

        let email = userinfo.email.clone().ok_or_else(|| ApiError::Validation("userinfo is missing an email and no account exists to link".into()))?;
        let is_admin = derived_is_admin || self.default_role_is_admin;

        // §3: password_hash may be empty iff the user has a linked OAuth
        // account. Argon2id never produces an empty hash, so an empty
        // string here is unambiguous.
        let user = self.users.create(NewUser { email, password_hash: String::new(), is_admin }).await?;
        self.repo
            .link_account(user.id, provider.id, &userinfo.sub, userinfo.email.as_deref(), userinfo.name.as_deref(), userinfo.picture.as_deref())
            .await?;
        self.notifications.dispatch(&UserCreated { user_id: user.id, email: user.email.clone() }, None).await?;
        self.notifications.dispatch_scoped(&OAuthAccountLinked { user_id: user.id, provider: provider.name.clone() }, None, Some(user.id)).await?;

        Ok(user)
    }
}

/// Preserves `http://localhost`/`127.0.0.1` verbatim; elevates any other
/// `http://` scheme to `https://` when the proxy reports TLS termination
/// (§4.4 step 1).
pub fn normalize_redirect_uri(redirect_uri: &str, forwarded_proto: Option<&str>) -> String {
    if forwarded_proto != Some("https") {
        return redirect_uri.to_string();
    }
    if !redirect_uri.starts_with("http://") {
        return redirect_uri.to_string();
    }
    let is_local = redirect_uri.starts_with("http://localhost") || redirect_uri.starts_with("http://127.0.0.1");
    if is_local {
        redirect_uri.to_string()
    } else {
        format!("https://{}", &redirect_uri["http://".len()..])
    }
}

fn generate_code_verifier() -> String {
    let mut bytes = [0u8; CODE_VERIFIER_LEN];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn code_challenge_s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn encode_state(state: &OAuthState) -> ApiResult<String> {
    let json = serde_json::to_vec(state).map_err(|e| ApiError::Internal(anyhow::anyhow!("state encode failed: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_state(state: &str) -> ApiResult<OAuthState> {
    let bytes = URL_SAFE_NO_PAD.decode(state).map_err(|_| ApiError::Validation("malformed OAuth state".into()))?;
    serde_json::from_slice(&bytes).map_err(|_| ApiError::Validation("malformed OAuth state".into()))
}

fn urlencoding_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localhost_redirect_is_preserved_even_behind_https_proxy() {
        let uri = normalize_redirect_uri("http://localhost:5173/callback", Some("https"));
        assert_eq!(uri, "http://localhost:5173/callback");
    }

    #[test]
    fn loopback_ip_redirect_is_preserved() {
        let uri = normalize_redirect_uri("http://127.0.0.1:5173/callback", Some("https"));
        assert_eq!(uri, "http://127.0.0.1:5173/callback");
    }

    #[test]
    fn other_http_is_elevated_behind_https_proxy() {
        let uri = normalize_redirect_uri("http://app.example.com/callback", Some("https"));
        assert_eq!(uri, "https://app.example.com/callback");
    }

    #[test]
    fn redirect_untouched_without_forwarded_proto() {
        let uri = normalize_redirect_uri("http://app.example.com/callback", None);
        assert_eq!(uri, "http://app.example.com/callback");
    }

    #[test]
    fn state_round_trips() {
        let state = OAuthState {
            provider: "okta".to_string(),
            code_verifier: generate_code_verifier(),
            redirect_uri: "https://app.example.com/callback".to_string(),
            return_url: Some("https://app.example.com/home".to_string()),
        };
        let encoded = encode_state(&state).unwrap();
        let decoded = decode_state(&encoded).unwrap();
        assert_eq!(decoded.provider, "okta");
        assert_eq!(decoded.redirect_uri, state.redirect_uri);
        assert_eq!(decoded.return_url, state.return_url);
    }

    #[test]
    fn decode_state_rejects_garbage() {
        assert!(decode_state("not-valid-base64!!!").is_err());
    }

    #[test]
    fn code_verifier_is_url_safe_and_long_enough() {
        let verifier = generate_code_verifier();
        assert!(verifier.len() >= 43);
        assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn group_claim_parses_comma_string() {
        let value = serde_json::Value::String("admins, editors".to_string());
        assert_eq!(parse_group_claim(&value), vec!["admins".to_string(), "editors".to_string()]);
    }

    #[test]
    fn group_claim_parses_array() {
        let value = serde_json::json!(["admins", "editors"]);
        assert_eq!(parse_group_claim(&value), vec!["admins".to_string(), "editors".to_string()]);
    }
}
