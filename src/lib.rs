//! Ropify Rust Client Library
//!
//! A Rust client for the Ropify closet service: a session manager that keeps
//! the user signed in across password, OAuth access-token and OAuth callback
//! credentials, and a capture pipeline that uploads garment photos for
//! analysis and renders them behind a polygon clip mask.

pub mod auth;
pub mod config;
pub mod error;
pub mod fetch;
mod flight;
pub mod garment;
pub mod mask;
pub mod store;

use std::sync::Arc;
use url::Url;

use crate::auth::SessionManager;
use crate::config::ClientOptions;
use crate::error::Error;
use crate::fetch::Gateway;
use crate::garment::{Closet, GarmentClient};
use crate::store::{CredentialStore, MemoryStore};

/// The main entry point for the Ropify client
pub struct Ropify {
    /// The base URL of the Ropify backend
    pub url: String,
    /// Client options
    pub options: ClientOptions,
    gateway: Gateway,
    session: Arc<SessionManager>,
}

impl Ropify {
    /// Create a client whose session lives in memory only
    ///
    /// # Example
    ///
    /// ```
    /// use ropify_client::Ropify;
    ///
    /// let ropify = Ropify::new("https://ropify.example.com").unwrap();
    /// let login = ropify.oauth_login_url().unwrap();
    /// assert!(login.as_str().starts_with("https://ropify.example.com/api/oauth/google/login"));
    /// ```
    pub fn new(url: &str) -> Result<Self, Error> {
        Self::new_with_options(url, Arc::new(MemoryStore::new()), ClientOptions::default())
    }

    /// Create a client with a custom credential store and options
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ropify_client::{Ropify, config::ClientOptions, store::FileStore};
    /// use std::sync::Arc;
    ///
    /// let options = ClientOptions::default().with_page_size(24);
    /// let ropify = Ropify::new_with_options(
    ///     "https://ropify.example.com",
    ///     Arc::new(FileStore::new("ropify-session.json")),
    ///     options,
    /// );
    /// ```
    pub fn new_with_options(
        url: &str,
        store: Arc<dyn CredentialStore>,
        options: ClientOptions,
    ) -> Result<Self, Error> {
        let gateway = Gateway::new(url, store, &options)?;
        let session = Arc::new(SessionManager::new(gateway.clone()));

        Ok(Self {
            url: url.to_string(),
            options,
            gateway,
            session,
        })
    }

    /// The process-wide session manager
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// A client for the garment endpoints
    pub fn garments(&self) -> GarmentClient {
        GarmentClient::new(self.gateway.clone(), self.options.page_size)
    }

    /// A closet for the signed-in user, or `None` when signed out
    pub async fn closet(&self) -> Option<Closet> {
        let session = self.session.session().await;
        session
            .user()
            .map(|user| Closet::new(self.garments(), &user.id))
    }

    /// Browser login URL redirecting back to the configured deep link
    pub fn oauth_login_url(&self) -> Result<Url, Error> {
        self.session.oauth_login_url(&self.options.oauth_redirect_uri)
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::auth::{Credential, RegisterForm, Route, Session, SessionState, User};
    pub use crate::config::ClientOptions;
    pub use crate::error::{AuthError, CaptureError, Error};
    pub use crate::garment::{Camera, CaptureOutcome, Garment, GarmentFilter, ImageHandle};
    pub use crate::mask::{render_mask, MaskRender};
    pub use crate::Ropify;
}
