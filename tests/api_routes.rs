use std::sync::Arc;

use axum::{
    body::Body,
    extract::FromRef,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use shelfsmart::{
    app::build_app,
    auth::{
        accounts::MemoryAccounts,
        dto::JwtKeys,
        repo_types::{Role, UserStatus},
    },
    lending::memory::MemoryLendingStore,
    state::AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    app: Router,
    keys: JwtKeys,
    accounts: Arc<MemoryAccounts>,
    lending: Arc<MemoryLendingStore>,
}

impl TestApp {
    fn new() -> Self {
        let accounts = Arc::new(MemoryAccounts::new());
        let lending = Arc::new(MemoryLendingStore::new());
        let state = AppState {
            accounts: accounts.clone(),
            lending: lending.clone(),
            ..AppState::fake()
        };
        let keys = JwtKeys::from_ref(&state);
        Self {
            app: build_app(state),
            keys,
            accounts,
            lending,
        }
    }

    /// Registers an account with `status` and returns its id and an access token.
    async fn account(&self, role: Role, status: UserStatus) -> (Uuid, String) {
        let id = Uuid::new_v4();
        self.accounts.insert(id, role, status).await;
        (id, self.keys.sign_access(id, role).unwrap())
    }

    async fn patron(&self) -> String {
        self.account(Role::User, UserStatus::Active).await.1
    }

    async fn admin(&self) -> String {
        self.account(Role::Admin, UserStatus::Active).await.1
    }

    async fn send(&self, req: Request<Body>) -> Response {
        self.app.clone().oneshot(req).await.unwrap()
    }
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let t = TestApp::new();
    let resp = t.send(request(Method::GET, "/api/v1/health", None, None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let t = TestApp::new();
    let resp = t.send(request(Method::GET, "/api/v1/me/borrows", None, None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn refresh_token_cannot_be_used_as_bearer() {
    let t = TestApp::new();
    let (id, _) = t.account(Role::User, UserStatus::Active).await;
    let token = t.keys.sign_refresh(id, Role::User).unwrap();
    let resp = t
        .send(request(Method::GET, "/api/v1/me/notifications", Some(&token), None))
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn patrons_are_forbidden_from_admin_routes() {
    let t = TestApp::new();
    let token = t.patron().await;
    for (method, uri) in [
        (Method::GET, "/api/v1/admin/users"),
        (Method::GET, "/api/v1/admin/dashboard"),
        (Method::GET, "/api/v1/admin/borrows"),
        (Method::POST, "/api/v1/admin/notifications/overdue"),
    ] {
        let resp = t.send(request(method.clone(), uri, Some(&token), None)).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{method} {uri}");
    }
}

#[tokio::test]
async fn token_for_removed_account_is_unauthorized() {
    let t = TestApp::new();
    let (id, token) = t.account(Role::User, UserStatus::Active).await;
    t.accounts.remove(id).await;
    let resp = t
        .send(request(Method::GET, "/api/v1/me/notifications", Some(&token), None))
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn suspended_account_is_forbidden_with_valid_token() {
    let t = TestApp::new();
    for status in [UserStatus::Suspended, UserStatus::Inactive] {
        let (_, token) = t.account(Role::User, status).await;
        let resp = t
            .send(request(Method::GET, "/api/v1/me/borrows", Some(&token), None))
            .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{status:?}");
        assert_eq!(json_body(resp).await["error"]["code"], "FORBIDDEN");
    }
}

#[tokio::test]
async fn demoted_admin_token_loses_admin_routes() {
    let t = TestApp::new();
    let id = Uuid::new_v4();
    t.accounts.insert(id, Role::User, UserStatus::Active).await;
    let token = t.keys.sign_access(id, Role::Admin).unwrap();
    let resp = t
        .send(request(Method::GET, "/api/v1/admin/borrows", Some(&token), None))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn borrow_creates_record_and_takes_a_copy() {
    let t = TestApp::new();
    let book = t.lending.add_book("Dune", 2).await;
    let token = t.patron().await;

    let resp = t
        .send(request(Method::POST, &format!("/api/v1/books/{book}/borrow"), Some(&token), None))
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = json_body(resp).await;
    assert_eq!(body["book_id"], book.to_string());
    assert_eq!(body["is_returned"], false);
    assert_eq!(t.lending.stock(book).await.unwrap().quantity, 1);
}

#[tokio::test]
async fn last_copy_goes_to_one_patron() {
    let t = TestApp::new();
    let book = t.lending.add_book("Dune", 1).await;
    let uri = format!("/api/v1/books/{book}/borrow");

    let first = t.patron().await;
    let resp = t.send(request(Method::POST, &uri, Some(&first), None)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let second = t.patron().await;
    let resp = t.send(request(Method::POST, &uri, Some(&second), None)).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(resp).await["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn returning_twice_conflicts() {
    let t = TestApp::new();
    let book = t.lending.add_book("Dune", 1).await;
    let token = t.patron().await;
    let resp = t
        .send(request(Method::POST, &format!("/api/v1/books/{book}/borrow"), Some(&token), None))
        .await;
    let record = json_body(resp).await["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/borrows/{record}/return");

    let resp = t.send(request(Method::POST, &uri, Some(&token), None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["is_returned"], true);

    let resp = t.send(request(Method::POST, &uri, Some(&token), None)).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(t.lending.stock(book).await.unwrap().quantity, 1);
}

#[tokio::test]
async fn renewals_stop_at_the_configured_limit() {
    let t = TestApp::new();
    let book = t.lending.add_book("Dune", 1).await;
    let token = t.patron().await;
    let resp = t
        .send(request(Method::POST, &format!("/api/v1/books/{book}/borrow"), Some(&token), None))
        .await;
    let record = json_body(resp).await["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/borrows/{record}/renew");

    for expected in 1..=2 {
        let resp = t.send(request(Method::POST, &uri, Some(&token), None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["renewal_count"], expected);
    }
    let resp = t.send(request(Method::POST, &uri, Some(&token), None)).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn updated_settings_govern_renewals() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let resp = t
        .send(request(
            Method::PUT,
            "/api/v1/admin/settings",
            Some(&admin),
            Some(json!({ "max_renewals": 0 })),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["max_renewals"], 0);

    let book = t.lending.add_book("Dune", 1).await;
    let token = t.patron().await;
    let resp = t
        .send(request(Method::POST, &format!("/api/v1/books/{book}/borrow"), Some(&token), None))
        .await;
    let record = json_body(resp).await["id"].as_str().unwrap().to_string();
    let resp = t
        .send(request(Method::POST, &format!("/api/v1/borrows/{record}/renew"), Some(&token), None))
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_book_or_record_is_not_found() {
    let t = TestApp::new();
    let token = t.patron().await;
    let missing = Uuid::new_v4();
    for uri in [
        format!("/api/v1/books/{missing}/borrow"),
        format!("/api/v1/borrows/{missing}/return"),
        format!("/api/v1/borrows/{missing}/renew"),
    ] {
        let resp = t.send(request(Method::POST, &uri, Some(&token), None)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(json_body(resp).await["error"]["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn disabled_email_blocks_bulk_notices() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let resp = t
        .send(request(
            Method::PUT,
            "/api/v1/admin/settings",
            Some(&admin),
            Some(json!({ "email_notifications": false })),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    for uri in [
        "/api/v1/admin/notifications/overdue",
        "/api/v1/admin/notifications/due-reminders",
    ] {
        let resp = t.send(request(Method::POST, uri, Some(&admin), None)).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT, "{uri}");
    }
}

#[tokio::test]
async fn patron_dashboard_counts_only_own_loans() {
    let t = TestApp::new();
    let dune = t.lending.add_book("Dune", 2).await;
    let emma = t.lending.add_book("Emma", 2).await;
    let token = t.patron().await;
    let other = t.patron().await;

    let resp = t
        .send(request(Method::POST, &format!("/api/v1/books/{dune}/borrow"), Some(&token), None))
        .await;
    let record = json_body(resp).await["id"].as_str().unwrap().to_string();
    t.send(request(Method::POST, &format!("/api/v1/borrows/{record}/return"), Some(&token), None))
        .await;
    t.send(request(Method::POST, &format!("/api/v1/books/{emma}/borrow"), Some(&token), None))
        .await;
    t.send(request(Method::POST, &format!("/api/v1/books/{emma}/borrow"), Some(&other), None))
        .await;

    let resp = t
        .send(request(Method::GET, "/api/v1/me/dashboard", Some(&token), None))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["total_borrowed"], 1);
    assert_eq!(body["total_returned"], 1);
    assert_eq!(body["total_overdue"], 0);

    let mut statuses: Vec<&str> = body["recent_activity"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["status"].as_str().unwrap())
        .collect();
    statuses.sort_unstable();
    assert_eq!(statuses, ["active", "returned"]);
}

#[tokio::test]
async fn isbn_lookup_rejects_malformed_isbn() {
    let t = TestApp::new();
    let token = t.admin().await;
    let resp = t
        .send(request(
            Method::POST,
            "/api/v1/isbn/lookup",
            Some(&token),
            Some(json!({ "isbn": "12-34" })),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["error"]["code"], "VALIDATION");
}

#[tokio::test]
async fn isbn_lookup_without_volume_is_not_found() {
    let t = TestApp::new();
    let token = t.admin().await;
    let resp = t
        .send(request(
            Method::POST,
            "/api/v1/isbn/lookup",
            Some(&token),
            Some(json!({ "isbn": "978-0-441-17271-9" })),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blank_search_query_is_rejected() {
    let t = TestApp::new();
    let token = t.patron().await;
    let resp = t
        .send(request(
            Method::POST,
            "/api/v1/search-history",
            Some(&token),
            Some(json!({ "query": "   " })),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn password_reset_confirm_rejects_short_password() {
    let t = TestApp::new();
    let resp = t
        .send(request(
            Method::POST,
            "/api/v1/auth/password-reset/confirm",
            None,
            Some(json!({ "username": "ada", "code": "123456", "new_password": "short" })),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn garbage_refresh_token_is_unauthorized() {
    let t = TestApp::new();
    let resp = t
        .send(request(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": "not-a-jwt" })),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
