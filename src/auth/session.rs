//! Session state and route selection

use super::types::User;

/// Lifecycle of the process-wide session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Process start, before any restore
    Unknown,
    /// Reading the persisted credentials
    Restoring,
    Authenticated,
    Unauthenticated,
}

/// Session data
///
/// `token` and `user` are either both present or both absent; only the
/// session manager constructs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    state: SessionState,
    credentials: Option<(String, User)>,
}

impl Session {
    pub(crate) fn unknown() -> Self {
        Self {
            state: SessionState::Unknown,
            credentials: None,
        }
    }

    pub(crate) fn restoring() -> Self {
        Self {
            state: SessionState::Restoring,
            credentials: None,
        }
    }

    pub(crate) fn authenticated(token: String, user: User) -> Self {
        Self {
            state: SessionState::Authenticated,
            credentials: Some((token, user)),
        }
    }

    pub(crate) fn unauthenticated() -> Self {
        Self {
            state: SessionState::Unauthenticated,
            credentials: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// The bearer token
    pub fn token(&self) -> Option<&str> {
        self.credentials.as_ref().map(|(token, _)| token.as_str())
    }

    pub fn user(&self) -> Option<&User> {
        self.credentials.as_ref().map(|(_, user)| user)
    }
}

/// Top-level screens the UI switches between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Shown while the session is still being determined
    Splash,
    Login,
    /// The signed-in home screen
    Closet,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Splash => "/",
            Route::Login => "/login",
            Route::Closet => "/(authed)/(tabs)/(closet)",
        }
    }
}

/// Where the UI should be for a given session state.
pub fn route_for(state: SessionState) -> Route {
    match state {
        SessionState::Unknown | SessionState::Restoring => Route::Splash,
        SessionState::Unauthenticated => Route::Login,
        SessionState::Authenticated => Route::Closet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_follow_state() {
        assert_eq!(route_for(SessionState::Unknown), Route::Splash);
        assert_eq!(route_for(SessionState::Restoring), Route::Splash);
        assert_eq!(route_for(SessionState::Unauthenticated), Route::Login);
        assert_eq!(route_for(SessionState::Authenticated), Route::Closet);
        assert_eq!(Route::Login.path(), "/login");
    }

    #[test]
    fn unauthenticated_session_has_no_credentials() {
        let session = Session::unauthenticated();
        assert!(!session.is_authenticated());
        assert!(session.token().is_none());
        assert!(session.user().is_none());
    }
}
