use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use manabi_server::{
    api::AppState,
    auth::{CredentialVerifier, StoreVerifier, StubVerifier},
    content::ContentLibrary,
    store::{Store, memory::MemoryStore, sqlite::SqliteStore},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_sessions::{MemoryStore as SessionStore, SessionManagerLayer};

async fn build_app(store: Arc<dyn Store>, verifier: Arc<dyn CredentialVerifier>) -> Router {
    let library = ContentLibrary::load(concat!(env!("CARGO_MANIFEST_DIR"), "/content")).unwrap();
    library.seed(store.as_ref()).await.unwrap();
    manabi_server::app(AppState { store, verifier })
        .layer(SessionManagerLayer::new(SessionStore::default()))
}

/// Seeded in-memory store with the stub credential pair.
async fn stub_app() -> Router {
    let store = Arc::new(MemoryStore::seeded().unwrap());
    build_app(store, Arc::new(StubVerifier)).await
}

/// Empty store verified against registered users.
async fn registration_app() -> Router {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let verifier = Arc::new(StoreVerifier::new(store.clone()));
    build_app(store, verifier).await
}

fn request(method: &str, uri: &str, cookie: Option<&str>, body: Option<&Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(
    app: &Router,
    req: Request<Body>,
) -> (StatusCode, Option<String>, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_owned);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, cookie, body)
}

async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> (StatusCode, Value) {
    let (status, _, body) = send(app, request("GET", uri, cookie, None)).await;
    (status, body)
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, cookie, _) = send(
        app,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(&json!({ "email": email, "password": password })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    cookie.expect("login sets a session cookie")
}

async fn stub_login(app: &Router) -> String {
    login(app, "test@example.com", "password123").await
}

#[tokio::test]
async fn themes_list_is_ordered_and_filterable() {
    let app = stub_app().await;

    let (status, body) = get(&app, "/api/themes", None).await;
    assert_eq!(status, StatusCode::OK);
    let themes = body.as_array().unwrap();
    assert_eq!(themes.len(), 12);
    let orders: Vec<i64> = themes.iter().map(|t| t["order"].as_i64().unwrap()).collect();
    assert!(orders.windows(2).all(|w| w[0] <= w[1]));

    let (status, body) = get(&app, "/api/themes?subject=sansu&grade=5", None).await;
    assert_eq!(status, StatusCode::OK);
    let themes = body.as_array().unwrap();
    assert_eq!(themes.len(), 1);
    assert_eq!(themes[0]["id"], "theme-sansu-002");
    assert_eq!(themes[0]["subject"], "sansu");
    assert_eq!(themes[0]["grade"], 5);
    assert_eq!(themes[0]["title"], "分数の計算");
    assert_eq!(
        themes[0]["description"],
        "分数のたし算、ひき算、かけ算、わり算を学びます"
    );
}

#[tokio::test]
async fn theme_filter_validation() {
    let app = stub_app().await;

    let (status, body) = get(&app, "/api/themes?subject=eigo", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "無効な科目です");

    let (status, body) = get(&app, "/api/themes?grade=7", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "無効な学年です");

    let (status, _) = get(&app, "/api/themes?grade=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn theme_detail() {
    let app = stub_app().await;

    let (status, body) = get(&app, "/api/themes/theme-rika-002", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "植物の光合成");
    assert!(body["content"].as_str().unwrap().contains("光合成の仕組み"));

    let (status, body) = get(&app, "/api/themes/theme-nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "テーマが見つかりません");
    assert!(body["message"].as_str().unwrap().contains("theme-nope"));
}

#[tokio::test]
async fn quiz_listing() {
    let app = stub_app().await;

    let (status, body) = get(&app, "/api/quizzes", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "themeIdクエリパラメータが必要です");

    // theme exists but has no quizzes: still a 404
    let (status, body) = get(&app, "/api/quizzes?themeId=theme-kokugo-001", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "クイズが見つかりません");

    let (status, body) = get(&app, "/api/quizzes?themeId=theme-rika-002", None).await;
    assert_eq!(status, StatusCode::OK);
    let quizzes = body.as_array().unwrap();
    assert_eq!(quizzes.len(), 3);
    let orders: Vec<i64> = quizzes.iter().map(|q| q["order"].as_i64().unwrap()).collect();
    assert_eq!(orders, [1, 2, 3]);
    assert_eq!(quizzes[0]["question"], "光合成で作られるものはどれ？");
    assert_eq!(quizzes[0]["correct_answer"], 1);
    assert_eq!(quizzes[0]["options"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn progress_requires_a_session() {
    let app = stub_app().await;
    let body = json!({ "themeId": "theme-sansu-002", "completed": true });

    let (status, response) = get(&app, "/api/progress", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"], "認証されていません");

    let (status, _, _) = send(&app, request("POST", "/api/progress", None, Some(&body))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(&app, request("PUT", "/api/progress", None, Some(&body))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn progress_is_owner_scoped() {
    let app = stub_app().await;
    let cookie = stub_login(&app).await;

    let (status, body) = get(&app, "/api/progress", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["theme_id"], "theme-rika-002");
    assert_eq!(records[0]["completed"], false);

    // own id is allowed explicitly
    let (status, _) = get(&app, "/api/progress?userId=user-001", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);

    // an empty userId counts as absent
    let (status, body) = get(&app, "/api/progress?userId=", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    // any other id is forbidden, existing or not
    let (status, body) = get(&app, "/api/progress?userId=user-999", Some(&cookie)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "権限がありません");
}

#[tokio::test]
async fn progress_create_then_update() {
    let app = stub_app().await;
    let cookie = stub_login(&app).await;

    let create = json!({ "themeId": "theme-sansu-002", "completed": true, "quizScore": 67 });
    let (status, _, body) = send(
        &app,
        request("POST", "/api/progress", Some(&cookie), Some(&create)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user_id"], "user-001");
    assert_eq!(body["theme_id"], "theme-sansu-002");
    assert_eq!(body["completed"], true);
    assert_eq!(body["quiz_score"].as_f64(), Some(67.0));
    assert!(body["completed_at"].is_string());

    // second create on the same pair conflicts
    let (status, _, body) = send(
        &app,
        request("POST", "/api/progress", Some(&cookie), Some(&create)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "進捗が既に存在します");

    // update merges: omitted quizScore keeps 67
    let update = json!({ "themeId": "theme-sansu-002", "completed": true });
    let (status, _, body) = send(
        &app,
        request("PUT", "/api/progress", Some(&cookie), Some(&update)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quiz_score"].as_f64(), Some(67.0));

    // update without a prior create is a 404
    let update = json!({ "themeId": "theme-kokugo-001", "completed": true });
    let (status, _, body) = send(
        &app,
        request("PUT", "/api/progress", Some(&cookie), Some(&update)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "進捗が見つかりません");
}

#[tokio::test]
async fn progress_validation() {
    let app = stub_app().await;
    let cookie = stub_login(&app).await;

    let cases = [
        (json!({ "completed": true }), "themeIdが必要です"),
        (
            json!({ "themeId": "theme-sansu-002", "completed": "yes" }),
            "completedはbooleanである必要があります",
        ),
        (
            json!({ "themeId": "theme-sansu-002", "completed": true, "quizScore": 150 }),
            "quizScoreは0-100の数値である必要があります",
        ),
        (
            json!({ "themeId": "theme-sansu-002", "completed": true, "quizScore": null }),
            "quizScoreは0-100の数値である必要があります",
        ),
    ];
    for (body, message) in cases {
        let (status, _, response) = send(
            &app,
            request("POST", "/api/progress", Some(&cookie), Some(&body)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response["message"], message);
    }
}

#[tokio::test]
async fn malformed_body_keeps_the_error_shape() {
    let app = stub_app().await;
    let cookie = stub_login(&app).await;

    // syntactically invalid JSON still answers with {error, message}
    let req = Request::builder()
        .method("POST")
        .uri("/api/progress")
        .header(header::COOKIE, &cookie)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "無効なリクエストです");
    assert_eq!(body["message"], "リクエストボディをJSONとして解釈できません");

    // so does a body sent without a JSON content type
    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/register")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "無効なリクエストです");

    // login takes a typed body through the same extractor
    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("not json at all"))
        .unwrap();
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "無効なリクエストです");
}

#[tokio::test]
async fn registration_validation_and_conflict() {
    let app = stub_app().await;

    let ok = json!({
        "email": "hanako@example.com", "password": "password456",
        "name": "花子", "grade": 4
    });
    let (status, _, body) = send(&app, request("POST", "/api/auth/register", None, Some(&ok))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "ユーザー登録が完了しました");
    assert_eq!(body["user"]["email"], "hanako@example.com");
    assert_eq!(body["user"]["grade"], 4);
    assert!(body["user"].get("password").is_none());
    assert!(body["user"].get("password_hash").is_none());

    // seed user keeps its record on a duplicate registration
    let duplicate = json!({
        "email": "test@example.com", "password": "password456",
        "name": "別の名前", "grade": 6
    });
    let (status, _, body) = send(
        &app,
        request("POST", "/api/auth/register", None, Some(&duplicate)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "メールアドレスは既に登録されています");
    let cookie = stub_login(&app).await;
    let (_, body) = get(&app, "/api/auth/me", Some(&cookie)).await;
    assert_eq!(body["name"], "テストユーザー");
    assert_eq!(body["grade"], 5);

    let cases = [
        (json!({ "email": "a@b.co", "password": "password456" }),
         "email, password, name, gradeはすべて必須です"),
        (json!({ "email": "not-an-email", "password": "password456", "name": "名前", "grade": 4 }),
         "正しいメールアドレスを入力してください"),
        (json!({ "email": "a@b.co", "password": "short", "name": "名前", "grade": 4 }),
         "パスワードは8文字以上である必要があります"),
        (json!({ "email": "a@b.co", "password": "password456", "name": "名前", "grade": 7 }),
         "gradeは 4, 5, 6 のいずれかである必要があります"),
    ];
    for (body, message) in cases {
        let (status, _, response) = send(
            &app,
            request("POST", "/api/auth/register", None, Some(&body)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response["message"], message);
    }
}

#[tokio::test]
async fn register_then_login_round_trip() {
    let app = registration_app().await;

    let register = json!({
        "email": "taro@example.com", "password": "himitsu-dayo",
        "name": "太郎", "grade": 6
    });
    let (status, _, _) = send(
        &app,
        request("POST", "/api/auth/register", None, Some(&register)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // wrong password: same generic 401
    let (status, _, body) = send(
        &app,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(&json!({ "email": "taro@example.com", "password": "machigai-desu" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "認証に失敗しました");

    let cookie = login(&app, "taro@example.com", "himitsu-dayo").await;
    let (status, body) = get(&app, "/api/auth/me", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "taro@example.com");
    assert_eq!(body["grade"], 6);

    let (status, body) = get(&app, "/api/progress", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn sqlite_backend_through_the_api() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
    let verifier = Arc::new(StoreVerifier::new(store.clone()));
    let app = build_app(store, verifier).await;

    let (status, body) = get(&app, "/api/themes?subject=sansu&grade=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let register = json!({
        "email": "jiro@example.com", "password": "password789",
        "name": "次郎", "grade": 5
    });
    let (status, _, _) = send(
        &app,
        request("POST", "/api/auth/register", None, Some(&register)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let cookie = login(&app, "jiro@example.com", "password789").await;

    let create = json!({ "themeId": "theme-rika-002", "completed": true, "quizScore": 100 });
    let (status, _, _) = send(
        &app,
        request("POST", "/api/progress", Some(&cookie), Some(&create)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _, _) = send(
        &app,
        request("POST", "/api/progress", Some(&cookie), Some(&create)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn stub_login_and_logout() {
    let app = stub_app().await;

    let (status, _, body) = send(
        &app,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(&json!({ "email": "test@example.com", "password": "wrong" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "認証に失敗しました");

    let cookie = stub_login(&app).await;
    let (status, body) = get(&app, "/api/auth/me", Some(&cookie)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "user-001");

    let (status, _, _) = send(&app, request("POST", "/api/auth/logout", Some(&cookie), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&app, "/api/auth/me", Some(&cookie)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
