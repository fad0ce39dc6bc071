//! Configuration options for the Ropify client

use std::time::Duration;

/// Default number of garments per closet page
pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// Deep-link the backend redirects to after a browser OAuth session
pub const DEFAULT_OAUTH_REDIRECT_URI: &str = "ropify://oauth-callback";

/// Configuration options for the Ropify client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Path prefix every endpoint lives under
    pub api_prefix: String,

    /// Number of garments requested per closet page
    pub page_size: u32,

    /// Redirect URI handed to the OAuth login page
    pub oauth_redirect_uri: String,

    /// Value of the `X-Client-Info` header
    pub client_info: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            api_prefix: "/api".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            oauth_redirect_uri: DEFAULT_OAUTH_REDIRECT_URI.to_string(),
            client_info: format!("ropify-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientOptions {
    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the API path prefix
    pub fn with_api_prefix(mut self, value: &str) -> Self {
        self.api_prefix = value.trim_end_matches('/').to_string();
        self
    }

    /// Set the closet page size
    pub fn with_page_size(mut self, value: u32) -> Self {
        self.page_size = value.max(1);
        self
    }

    /// Set the OAuth redirect URI
    pub fn with_oauth_redirect_uri(mut self, value: &str) -> Self {
        self.oauth_redirect_uri = value.to_string();
        self
    }

    /// Set the client info header value
    pub fn with_client_info(mut self, value: &str) -> Self {
        self.client_info = value.to_string();
        self
    }
}
