//! Types for authentication and user management

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::AuthError;

/// Accept identifiers sent either as strings (UUIDs) or as integers.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(id) => id,
        Id::Number(id) => id.to_string(),
    })
}

/// User data
///
/// Replaced wholesale on re-authentication, never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The user ID
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,

    pub username: String,

    #[serde(rename = "firstName")]
    pub first_name: String,

    #[serde(rename = "lastName")]
    pub last_name: String,

    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,

    /// Set when the account is linked to Google
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_id: Option<String>,

    /// The creation time
    pub created_at: String,
}

/// Payload returned by every credential exchange endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    pub token: String,
    pub user: User,
}

/// One credential source per authentication attempt
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password {
        email: String,
        password: String,
    },
    RegisterPassword {
        email: String,
        password: String,
        username: String,
        first_name: String,
        last_name: String,
    },
    /// Access token issued by the OAuth provider, exchanged remotely
    OAuthAccessToken { token: String },
    /// The base64 `data` value carried by the OAuth deep link
    OAuthCallback { encoded_payload: String },
}

impl Credential {
    pub fn password(email: &str, password: &str) -> Self {
        Credential::Password {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    pub fn oauth_access_token(token: &str) -> Self {
        Credential::OAuthAccessToken {
            token: token.to_string(),
        }
    }

    pub fn oauth_callback(encoded_payload: &str) -> Self {
        Credential::OAuthCallback {
            encoded_payload: encoded_payload.to_string(),
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Password { .. } => "password",
            Credential::RegisterPassword { .. } => "register",
            Credential::OAuthAccessToken { .. } => "oauth-access-token",
            Credential::OAuthCallback { .. } => "oauth-callback",
        }
    }

    /// Checks that need no network. A failure here leaves the session untouched.
    pub fn validate(&self) -> Result<(), AuthError> {
        match self {
            Credential::Password { .. } => Ok(()),
            Credential::RegisterPassword {
                username,
                first_name,
                last_name,
                ..
            } => {
                require_non_blank("username", username)?;
                require_non_blank("first name", first_name)?;
                require_non_blank("last name", last_name)
            }
            Credential::OAuthAccessToken { token } => require_non_blank("access token", token),
            Credential::OAuthCallback { encoded_payload } => {
                super::resolver::CallbackPayload::decode(encoded_payload).map(|_| ())
            }
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password { email, .. } => f
                .debug_struct("Password")
                .field("email", email)
                .finish_non_exhaustive(),
            Credential::RegisterPassword {
                email, username, ..
            } => f
                .debug_struct("RegisterPassword")
                .field("email", email)
                .field("username", username)
                .finish_non_exhaustive(),
            Credential::OAuthAccessToken { .. } => f.write_str("OAuthAccessToken { .. }"),
            Credential::OAuthCallback { .. } => f.write_str("OAuthCallback { .. }"),
        }
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        Err(AuthError::Validation(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

/// Registration form as entered by the user, including the password confirmation
#[derive(Clone, Default)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub confirmation: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl RegisterForm {
    /// Validate the form and turn it into a register credential.
    ///
    /// The password and its confirmation must be byte-equal.
    pub fn into_credential(self) -> Result<Credential, AuthError> {
        if self.password.as_bytes() != self.confirmation.as_bytes() {
            return Err(AuthError::Validation(
                "password and confirmation do not match".to_string(),
            ));
        }

        let credential = Credential::RegisterPassword {
            email: self.email,
            password: self.password,
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
        };
        credential.validate()?;
        Ok(credential)
    }
}

impl fmt::Debug for RegisterForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterForm")
            .field("email", &self.email)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
