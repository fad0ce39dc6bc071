use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use ropify_client::error::StorageError;
use ropify_client::prelude::*;
use ropify_client::store::{
    load_credentials, CredentialStore, FileStore, MemoryStore, TOKEN_KEY, USER_KEY,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_json(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "username": "gael",
        "firstName": "Gael",
        "lastName": "Zamora",
        "email": "gael@example.com",
        "avatar_url": "https://cdn.example.com/a.png",
        "bio": "likes denim",
        "google_id": null,
        "created_at": "2025-03-01T10:00:00Z"
    })
}

async fn mount_login(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "logged in",
            "data": { "token": token, "user": user_json("u-1") }
        })))
        .mount(server)
        .await;
}

fn file_client(uri: &str, file: &std::path::Path) -> Ropify {
    Ropify::new_with_options(uri, Arc::new(FileStore::new(file)), ClientOptions::default())
        .unwrap()
}

#[tokio::test]
async fn login_survives_restart() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1").await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("session.json");

    let first = file_client(&server.uri(), &file);
    assert_eq!(first.session().restore().await, SessionState::Unauthenticated);
    let signed_in = first
        .session()
        .authenticate(Credential::password("gael@example.com", "pw"))
        .await
        .unwrap();

    let second = file_client(&server.uri(), &file);
    assert_eq!(second.session().restore().await, SessionState::Authenticated);
    let restored = second.session().session().await;
    assert_eq!(restored.token(), Some("jwt-1"));
    assert_eq!(restored.user(), signed_in.user());
    assert_eq!(second.session().route().await, Route::Closet);
}

#[tokio::test]
async fn restore_is_idempotent() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1").await;
    let ropify = Ropify::new(&server.uri()).unwrap();
    let session = ropify.session();

    session
        .authenticate(Credential::password("gael@example.com", "pw"))
        .await
        .unwrap();
    let before = session.session().await;
    assert_eq!(session.restore().await, SessionState::Authenticated);
    assert_eq!(session.restore().await, SessionState::Authenticated);
    assert_eq!(session.session().await.token(), before.token());
}

#[tokio::test]
async fn logout_clears_before_returning() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1").await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("session.json");

    let ropify = file_client(&server.uri(), &file);
    ropify
        .session()
        .authenticate(Credential::password("gael@example.com", "pw"))
        .await
        .unwrap();

    ropify.session().logout().await.unwrap();
    assert_eq!(ropify.session().restore().await, SessionState::Unauthenticated);
    assert_eq!(ropify.session().route().await, Route::Login);

    let fresh = file_client(&server.uri(), &file);
    assert_eq!(fresh.session().restore().await, SessionState::Unauthenticated);
    assert!(load_credentials(&FileStore::new(&file)).await.unwrap().is_none());
}

#[tokio::test]
async fn mismatched_confirmation_never_calls_register() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let ropify = Ropify::new(&server.uri()).unwrap();
    let form = RegisterForm {
        email: "gael@example.com".to_string(),
        password: "hunter2".to_string(),
        confirmation: "hunter3".to_string(),
        username: "gael".to_string(),
        first_name: "Gael".to_string(),
        last_name: "Zamora".to_string(),
    };

    let result = ropify.session().register(form).await;
    assert!(matches!(result, Err(AuthError::Validation(_))));
    assert!(!ropify.session().is_loading_auth());
}

#[tokio::test]
async fn register_signs_in() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "status": "success",
            "data": { "token": "jwt-reg", "user": user_json("u-9") }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ropify = Ropify::new(&server.uri()).unwrap();
    let form = RegisterForm {
        email: "gael@example.com".to_string(),
        password: "hunter2".to_string(),
        confirmation: "hunter2".to_string(),
        username: "gael".to_string(),
        first_name: "Gael".to_string(),
        last_name: "Zamora".to_string(),
    };

    let session = ropify.session().register(form).await.unwrap();
    assert_eq!(session.user().map(|u| u.id.as_str()), Some("u-9"));
}

#[tokio::test]
async fn callback_without_token_leaves_state_unchanged() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1").await;
    let ropify = Ropify::new(&server.uri()).unwrap();
    let session = ropify.session();
    session
        .authenticate(Credential::password("gael@example.com", "pw"))
        .await
        .unwrap();

    let encoded = URL_SAFE.encode(serde_json::to_vec(&json!({ "user_id": "u-1" })).unwrap());
    let credential =
        Credential::from_callback_url(&format!("ropify://oauth-callback?data={}", encoded))
            .unwrap();

    let result = session.authenticate(credential).await;
    assert!(matches!(result, Err(AuthError::MalformedCallback(_))));
    assert_eq!(session.state().await, SessionState::Authenticated);
    assert_eq!(session.session().await.token(), Some("jwt-1"));
}

#[tokio::test]
async fn callback_fetches_user_with_callback_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/user/u-7"))
        .and(header("Authorization", "Bearer jwt-google"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": user_json("u-7")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let ropify =
        Ropify::new_with_options(&server.uri(), store, ClientOptions::default()).unwrap();

    let encoded = URL_SAFE.encode(
        serde_json::to_vec(&json!({ "token": "jwt-google", "user_id": "u-7" })).unwrap(),
    );
    let session = ropify
        .session()
        .authenticate(Credential::oauth_callback(&encoded))
        .await
        .unwrap();

    assert_eq!(session.token(), Some("jwt-google"));
    assert_eq!(session.user().map(|u| u.id.as_str()), Some("u-7"));
}

#[tokio::test]
async fn rejected_access_token_is_invalid_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/oauth/google/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "status": "fail",
            "message": "invalid google token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ropify = Ropify::new(&server.uri()).unwrap();
    let mut changes = ropify.session().subscribe();
    let result = ropify
        .session()
        .authenticate(Credential::oauth_access_token("ya29.expired"))
        .await;

    assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
    assert_eq!(changes.recv().await.unwrap(), SessionState::Restoring);
    assert_eq!(changes.recv().await.unwrap(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn unreachable_backend_is_transport_failure() {
    // Nothing listens on the discard port.
    let ropify = Ropify::new("http://127.0.0.1:9").unwrap();
    let result = ropify
        .session()
        .authenticate(Credential::password("gael@example.com", "pw"))
        .await;
    assert!(matches!(result, Err(AuthError::TransportFailure(_))));
    assert_eq!(ropify.session().state().await, SessionState::Unauthenticated);
}

/// Memory store that can be told to refuse writes of the user record
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_user_writes: AtomicBool,
}

#[async_trait]
impl CredentialStore for FlakyStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if key == USER_KEY && self.fail_user_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailure("quota exceeded".to_string()));
        }
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_item(key).await
    }
}

async fn mount_user(server: &MockServer, id: &str, delay: Duration) {
    let mut user = user_json(id);
    user["bio"] = json!("now into linen");
    Mock::given(method("GET"))
        .and(path(format!("/api/users/user/{}", id)))
        .and(header("Authorization", "Bearer jwt-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(delay)
                .set_body_json(json!({ "status": "success", "data": user })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn logout_wins_over_pending_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_json(json!({
                    "status": "success",
                    "data": { "token": "jwt-1", "user": user_json("u-1") }
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let ropify =
        Ropify::new_with_options(&server.uri(), store.clone(), ClientOptions::default()).unwrap();
    let session = ropify.session();

    let login = session.authenticate(Credential::password("gael@example.com", "pw"));
    let logout = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.logout().await
    };
    let (login, logout) = tokio::join!(login, logout);

    logout.unwrap();
    assert!(matches!(login, Err(AuthError::Superseded)));
    assert_eq!(session.state().await, SessionState::Unauthenticated);
    assert_eq!(store.get_item(TOKEN_KEY).await.unwrap(), None);
    assert_eq!(session.restore().await, SessionState::Unauthenticated);
}

#[tokio::test]
async fn logout_wins_over_pending_refresh() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1").await;
    mount_user(&server, "u-1", Duration::from_millis(300)).await;

    let store = Arc::new(MemoryStore::new());
    let ropify =
        Ropify::new_with_options(&server.uri(), store.clone(), ClientOptions::default()).unwrap();
    let session = ropify.session();
    session
        .authenticate(Credential::password("gael@example.com", "pw"))
        .await
        .unwrap();

    let refresh = session.refresh_user();
    let logout = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.logout().await
    };
    let (refresh, logout) = tokio::join!(refresh, logout);

    logout.unwrap();
    assert!(matches!(refresh, Err(AuthError::Superseded)));
    assert_eq!(session.state().await, SessionState::Unauthenticated);
    assert_eq!(store.get_item(TOKEN_KEY).await.unwrap(), None);
    assert_eq!(store.get_item(USER_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn refresh_user_replaces_stored_record() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1").await;
    mount_user(&server, "u-1", Duration::ZERO).await;

    let store = Arc::new(MemoryStore::new());
    let ropify =
        Ropify::new_with_options(&server.uri(), store.clone(), ClientOptions::default()).unwrap();
    let session = ropify.session();
    session
        .authenticate(Credential::password("gael@example.com", "pw"))
        .await
        .unwrap();

    let user = session.refresh_user().await.unwrap();
    assert_eq!(user.bio.as_deref(), Some("now into linen"));
    assert_eq!(session.session().await.user(), Some(&user));

    let (token, stored) = load_credentials(store.as_ref()).await.unwrap().unwrap();
    assert_eq!(token, "jwt-1");
    assert_eq!(stored, user);
}

#[tokio::test]
async fn failed_refresh_write_signs_out() {
    let server = MockServer::start().await;
    mount_login(&server, "jwt-1").await;
    mount_user(&server, "u-1", Duration::ZERO).await;

    let store = Arc::new(FlakyStore::default());
    let ropify =
        Ropify::new_with_options(&server.uri(), store.clone(), ClientOptions::default()).unwrap();
    let session = ropify.session();
    session
        .authenticate(Credential::password("gael@example.com", "pw"))
        .await
        .unwrap();

    store.fail_user_writes.store(true, Ordering::SeqCst);
    let result = session.refresh_user().await;

    assert!(matches!(result, Err(AuthError::Storage(_))));
    assert_eq!(session.state().await, SessionState::Unauthenticated);
    assert!(session.session().await.token().is_none());
    assert_eq!(store.get_item(TOKEN_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn corrupt_session_file_restores_signed_out() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("session.json");
    tokio::fs::write(&file, b"{\"token\": \"jwt-1\", \"user\"").await.unwrap();

    let ropify = file_client("http://127.0.0.1:9", &file);
    assert_eq!(ropify.session().restore().await, SessionState::Unauthenticated);
    assert_eq!(ropify.session().route().await, Route::Login);
}
