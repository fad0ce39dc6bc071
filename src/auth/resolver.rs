//! Credential resolvers: turn a [`Credential`] into a `(token, user)` pair

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use log::debug;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::types::{AuthPayload, Credential, User};
use crate::error::{AuthError, Error};
use crate::fetch::Gateway;

/// Name of the deep-link parameter carrying the encoded payload
pub const CALLBACK_PARAM: &str = "data";

/// Strategy resolving one kind of credential
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, credential: &Credential) -> Result<AuthPayload, AuthError>;
}

fn unsupported(resolver: &str, credential: &Credential) -> AuthError {
    AuthError::InvalidCredentials(format!(
        "{} resolver cannot handle {} credentials",
        resolver,
        credential.kind()
    ))
}

/// Email/password login and registration
pub struct PasswordResolver {
    gateway: Gateway,
}

impl PasswordResolver {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl CredentialResolver for PasswordResolver {
    async fn resolve(&self, credential: &Credential) -> Result<AuthPayload, AuthError> {
        let request = match credential {
            Credential::Password { email, password } => self
                .gateway
                .post("/auth/login")
                .json(&json!({ "email": email, "password": password })),
            Credential::RegisterPassword {
                email,
                password,
                username,
                first_name,
                last_name,
            } => self.gateway.post("/auth/register").json(&json!({
                "firstName": first_name,
                "lastName": last_name,
                "username": username,
                "email": email,
                "password": password,
            })),
            other => return Err(unsupported("password", other)),
        };

        request
            .map_err(AuthError::from_gateway)?
            .execute::<AuthPayload>()
            .await
            .map_err(AuthError::from_gateway)
    }
}

/// Exchanges a provider access token at the backend
pub struct OAuthTokenResolver {
    gateway: Gateway,
}

impl OAuthTokenResolver {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl CredentialResolver for OAuthTokenResolver {
    async fn resolve(&self, credential: &Credential) -> Result<AuthPayload, AuthError> {
        let token = match credential {
            Credential::OAuthAccessToken { token } => token,
            other => return Err(unsupported("oauth token", other)),
        };

        self.gateway
            .post("/oauth/google/token")
            .json(&json!({ "access_token": token }))
            .map_err(AuthError::from_gateway)?
            .execute::<AuthPayload>()
            .await
            .map_err(AuthError::from_gateway)
    }
}

/// Decoded deep-link payload
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackPayload {
    pub token: String,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    user_id: Option<serde_json::Value>,
}

impl CallbackPayload {
    /// Decode the base64 JSON carried by the deep link. Every failure is a
    /// [`AuthError::MalformedCallback`].
    pub fn decode(encoded: &str) -> Result<Self, AuthError> {
        let encoded = encoded.trim();
        let bytes = [URL_SAFE, STANDARD, URL_SAFE_NO_PAD, STANDARD_NO_PAD]
            .iter()
            .find_map(|engine| engine.decode(encoded).ok())
            .ok_or_else(|| AuthError::MalformedCallback("payload is not base64".to_string()))?;

        let payload: CallbackPayload = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::MalformedCallback(e.to_string()))?;

        if payload.token.trim().is_empty() {
            return Err(AuthError::MalformedCallback("token is empty".to_string()));
        }
        if payload.user.is_none() && payload.user_id().is_none() {
            return Err(AuthError::MalformedCallback(
                "payload names no user".to_string(),
            ));
        }
        Ok(payload)
    }

    /// The user id, whether sent as a string or a number
    pub fn user_id(&self) -> Option<String> {
        match &self.user_id {
            Some(serde_json::Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(serde_json::Value::Number(id)) => Some(id.to_string()),
            _ => None,
        }
    }
}

/// Pull the encoded payload out of a deep-link URL such as
/// `ropify://oauth-callback?data=...`. The parameter may also sit in the fragment.
pub fn callback_payload_from_url(url: &str) -> Result<String, AuthError> {
    let url = Url::parse(url).map_err(|e| AuthError::MalformedCallback(e.to_string()))?;

    let from_query = url
        .query_pairs()
        .find(|(key, _)| key == CALLBACK_PARAM)
        .map(|(_, value)| value.into_owned());

    let from_fragment = || {
        url.fragment().and_then(|fragment| {
            url::form_urlencoded::parse(fragment.as_bytes())
                .find(|(key, _)| key == CALLBACK_PARAM)
                .map(|(_, value)| value.into_owned())
        })
    };

    from_query
        .or_else(from_fragment)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            AuthError::MalformedCallback(format!("missing `{}` parameter", CALLBACK_PARAM))
        })
}

impl Credential {
    /// Build an [`Credential::OAuthCallback`] from the full deep-link URL
    pub fn from_callback_url(url: &str) -> Result<Self, AuthError> {
        callback_payload_from_url(url).map(|payload| Credential::OAuthCallback {
            encoded_payload: payload,
        })
    }
}

/// Resolves the deep-link payload, fetching the user when only its id was sent
pub struct CallbackResolver {
    gateway: Gateway,
}

impl CallbackResolver {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl CredentialResolver for CallbackResolver {
    async fn resolve(&self, credential: &Credential) -> Result<AuthPayload, AuthError> {
        let encoded = match credential {
            Credential::OAuthCallback { encoded_payload } => encoded_payload,
            other => return Err(unsupported("oauth callback", other)),
        };

        let payload = CallbackPayload::decode(encoded)?;
        if let Some(user) = payload.user.clone() {
            return Ok(AuthPayload {
                token: payload.token,
                user,
            });
        }

        let user_id = payload
            .user_id()
            .ok_or_else(|| AuthError::MalformedCallback("payload names no user".to_string()))?;
        debug!("Fetching user {} named by OAuth callback", user_id);

        let user = fetch_user(&self.gateway, &user_id, Some(&payload.token))
            .await
            .map_err(AuthError::from_gateway)?;

        Ok(AuthPayload {
            token: payload.token,
            user,
        })
    }
}

/// `GET /users/user/{id}`, optionally with an explicit bearer token
pub async fn fetch_user(gateway: &Gateway, id: &str, token: Option<&str>) -> Result<User, Error> {
    let mut request = gateway.get(&format!("/users/user/{}", id));
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    request.execute::<User>().await
}

/// URL of the browser OAuth login page; its result comes back through the
/// deep link as an [`Credential::OAuthCallback`].
pub fn oauth_login_url(gateway: &Gateway, redirect_uri: &str) -> Result<Url, Error> {
    let mut url = Url::parse(&gateway.url("/oauth/google/login"))?;
    url.query_pairs_mut()
        .append_pair("redirect_uri", redirect_uri);
    Ok(url)
}

/// The three resolvers, selected exhaustively by credential variant
pub struct Resolvers {
    pub password: Box<dyn CredentialResolver>,
    pub oauth_token: Box<dyn CredentialResolver>,
    pub callback: Box<dyn CredentialResolver>,
}

impl Resolvers {
    pub fn new(gateway: &Gateway) -> Self {
        Self {
            password: Box::new(PasswordResolver::new(gateway.clone())),
            oauth_token: Box::new(OAuthTokenResolver::new(gateway.clone())),
            callback: Box::new(CallbackResolver::new(gateway.clone())),
        }
    }

    pub fn for_credential(&self, credential: &Credential) -> &dyn CredentialResolver {
        match credential {
            Credential::Password { .. } | Credential::RegisterPassword { .. } => {
                self.password.as_ref()
            }
            Credential::OAuthAccessToken { .. } => self.oauth_token.as_ref(),
            Credential::OAuthCallback { .. } => self.callback.as_ref(),
        }
    }
}
