//! Session lifecycle: restore, authenticate and logout
//!
//! [`SessionManager`] owns the process-wide [`Session`]. It is constructed
//! explicitly and handed to whoever needs it; UI code subscribes to state
//! changes and maps each state to a screen with [`route_for`].

mod resolver;
mod session;
mod types;

use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::error::{AuthError, StorageError};
use crate::fetch::Gateway;
use crate::flight::SingleFlight;
use crate::store::{clear_credentials, load_credentials, save_credentials, CredentialStore};

pub use resolver::*;
pub use session::*;
pub use types::*;

pub(crate) use types::deserialize_id;

/// Owner of the session state machine
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    gateway: Gateway,
    resolvers: Resolvers,
    session: RwLock<Session>,
    restored: AtomicBool,
    auth_flight: SingleFlight,
    /// Held across every credential store access that changes the session;
    /// bumped on every write, so a request can tell whether the session moved
    /// on while it was waiting on the network.
    store_epoch: Mutex<u64>,
    state_change: broadcast::Sender<SessionState>,
}

impl SessionManager {
    /// Create a manager using the gateway's store and the default resolvers
    pub fn new(gateway: Gateway) -> Self {
        let resolvers = Resolvers::new(&gateway);
        Self::with_resolvers(gateway, resolvers)
    }

    /// Create a manager with custom resolvers
    pub fn with_resolvers(gateway: Gateway, resolvers: Resolvers) -> Self {
        let (state_change, _) = broadcast::channel(16);
        Self {
            store: gateway.store().clone(),
            gateway,
            resolvers,
            session: RwLock::new(Session::unknown()),
            restored: AtomicBool::new(false),
            auth_flight: SingleFlight::new(),
            store_epoch: Mutex::new(0),
            state_change,
        }
    }

    /// A snapshot of the current session
    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    pub async fn state(&self) -> SessionState {
        self.session.read().await.state()
    }

    /// Where the UI should be right now
    pub async fn route(&self) -> Route {
        route_for(self.state().await)
    }

    /// Whether an authentication attempt is in flight. Submit controls should
    /// be disabled while this is true.
    pub fn is_loading_auth(&self) -> bool {
        self.auth_flight.is_busy()
    }

    /// Receive every state transition
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.state_change.subscribe()
    }

    async fn set_session(&self, next: Session) -> SessionState {
        let mut current = self.session.write().await;
        let (from, to) = (current.state(), next.state());
        *current = next;
        if from != to {
            info!("Session state changing from {:?} to {:?}", from, to);
            if self.state_change.send(to).is_err() {
                debug!("No subscribers for session state {:?}", to);
            }
        }
        to
    }

    async fn current_epoch(&self) -> u64 {
        *self.store_epoch.lock().await
    }

    /// Load the persisted session. Only the first call reads storage; later
    /// calls return the current state.
    pub async fn restore(&self) -> SessionState {
        match self.auth_flight.try_begin() {
            Some(_flight) => self.restore_once().await,
            None => self.state().await,
        }
    }

    // Caller holds the auth flight.
    async fn restore_once(&self) -> SessionState {
        if self.restored.swap(true, Ordering::AcqRel) {
            return self.state().await;
        }

        let _epoch = self.store_epoch.lock().await;
        self.set_session(Session::restoring()).await;
        let next = match load_credentials(self.store.as_ref()).await {
            Ok(Some((token, user))) => {
                debug!("Restored session for user {}", user.id);
                Session::authenticated(token, user)
            }
            Ok(None) => Session::unauthenticated(),
            Err(e) => {
                warn!("Credential store unusable, starting signed out: {}", e);
                Session::unauthenticated()
            }
        };
        self.set_session(next).await
    }

    /// Resolve `credential`, persist the result and become `Authenticated`.
    ///
    /// An existing session is logged out first. Local validation failures
    /// (register fields, undecodable callback) leave the session untouched;
    /// remote failures leave it `Unauthenticated`. A logout while the
    /// credential is being resolved wins: nothing is persisted and
    /// [`AuthError::Superseded`] is returned.
    pub async fn authenticate(&self, credential: Credential) -> Result<Session, AuthError> {
        let _flight = self.auth_flight.try_begin().ok_or(AuthError::InFlight)?;
        self.restore_once().await;

        credential.validate()?;
        debug!("Authenticating with {} credential", credential.kind());

        if self.session.read().await.is_authenticated() {
            info!("Replacing the current session");
            self.clear_session().await?;
        }

        let epoch = self.current_epoch().await;
        let payload = match self
            .resolvers
            .for_credential(&credential)
            .resolve(&credential)
            .await
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!("{} authentication failed: {}", credential.kind(), e);
                self.set_session(Session::unauthenticated()).await;
                return Err(e);
            }
        };

        self.commit(epoch, payload.token, payload.user).await
    }

    /// Persist `(token, user)` and become `Authenticated`, unless the store
    /// was written since `epoch` was read. A failed write leaves both the
    /// store and the session signed out.
    async fn commit(&self, epoch: u64, token: String, user: User) -> Result<Session, AuthError> {
        let mut current = self.store_epoch.lock().await;
        if *current != epoch {
            info!("Dropping session for user {}, the session changed meanwhile", user.id);
            return Err(AuthError::Superseded);
        }
        *current += 1;

        if let Err(e) = save_credentials(self.store.as_ref(), &token, &user).await {
            warn!("Could not persist session: {}", e);
            if let Err(e) = clear_credentials(self.store.as_ref()).await {
                warn!("Failed to roll back credential store: {}", e);
            }
            self.set_session(Session::unauthenticated()).await;
            return Err(e.into());
        }

        let session = Session::authenticated(token, user);
        self.set_session(session.clone()).await;
        Ok(session)
    }

    /// Validate the registration form locally, then register.
    /// A mismatched confirmation never reaches the network.
    pub async fn register(&self, form: RegisterForm) -> Result<Session, AuthError> {
        let credential = form.into_credential()?;
        self.authenticate(credential).await
    }

    /// Clear the persisted credentials and become `Unauthenticated`.
    ///
    /// Storage is cleared before this returns, and any authenticate or
    /// refresh still waiting on the network is dropped without writing. The
    /// in-memory session is reset even when clearing fails.
    pub async fn logout(&self) -> Result<(), StorageError> {
        self.restored.store(true, Ordering::Release);
        self.clear_session().await
    }

    async fn clear_session(&self) -> Result<(), StorageError> {
        let mut epoch = self.store_epoch.lock().await;
        *epoch += 1;
        let result = clear_credentials(self.store.as_ref()).await;
        if let Err(e) = &result {
            warn!("Failed to clear credential store: {}", e);
        }
        self.set_session(Session::unauthenticated()).await;
        result
    }

    /// Fetch the current user again and replace the stored record with it
    pub async fn refresh_user(&self) -> Result<User, AuthError> {
        let epoch = self.current_epoch().await;
        let (token, user_id) = {
            let session = self.session.read().await;
            match (session.token(), session.user()) {
                (Some(token), Some(user)) => (token.to_string(), user.id.clone()),
                _ => return Err(AuthError::NotAuthenticated),
            }
        };

        let user = fetch_user(&self.gateway, &user_id, Some(&token))
            .await
            .map_err(AuthError::from_gateway)?;

        self.commit(epoch, token, user.clone()).await?;
        Ok(user)
    }

    /// URL of the browser OAuth login page
    pub fn oauth_login_url(&self, redirect_uri: &str) -> Result<url::Url, crate::error::Error> {
        oauth_login_url(&self.gateway, redirect_uri)
    }
}
