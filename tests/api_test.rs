use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use imagi_gallery::{
    config::{Config, GitHubConfig},
    models::{Image, Submission},
    routes::create_router,
    AppState,
};
use serde_json::{json, Value};
use std::{io::Cursor, sync::Arc};
use tower::ServiceExt;
use uuid::Uuid;

const ADMIN_TOKEN: &str = "test-admin-token";
const BASE_URL: &str = "http://localhost:3000";
const BOUNDARY: &str = "imagi-test-boundary";

fn test_config() -> Config {
    Config {
        admin_token: Some(ADMIN_TOKEN.into()),
        admin_emails: vec!["mod@imagi.gg".into()],
        public_base_url: BASE_URL.into(),
        ..Config::default()
    }
}

fn github_config(quota_bytes: u64) -> GitHubConfig {
    GitHubConfig {
        token: "ghp_test".into(),
        owner: "imagi".into(),
        repo: "screenshots".into(),
        branch: "main".into(),
        upload_dir: "uploads".into(),
        quota_bytes,
        api_base: "https://api.github.com".into(),
    }
}

fn app(config: Config) -> (Arc<AppState>, Router) {
    let state = Arc::new(AppState::in_memory(config));
    (state.clone(), create_router(state))
}

fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let buffer = RgbImage::from_pixel(width, height, Rgb([30, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(buffer).write_to(&mut out, format).unwrap();
    out.into_inner()
}

fn jpeg() -> Vec<u8> {
    encoded(64, 48, ImageFormat::Jpeg)
}

struct FileField<'a> {
    file_name: &'a str,
    content_type: &'a str,
    data: &'a [u8],
}

fn multipart_body(fields: &[(&str, &str)], file: Option<FileField<'_>>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }
    if let Some(file) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                file.file_name, file.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(file.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(uri: &str, admin: bool, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"));
    if admin {
        builder = builder.header("x-admin-token", ADMIN_TOKEN);
    }
    builder.body(Body::from(body)).unwrap()
}

fn json_request(method: Method, uri: &str, admin: bool, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if admin {
        builder = builder.header("x-admin-token", ADMIN_TOKEN);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, admin: bool) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if admin {
        builder = builder.header("x-admin-token", ADMIN_TOKEN);
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn screenshot_form<'a>(name: &'a str, user: &'a str, data: &'a [u8]) -> Vec<u8> {
    multipart_body(
        &[
            ("name", name),
            ("genre", "RPG"),
            ("game", "Elden Ring"),
            ("userId", user),
            ("userEmail", "u@imagi.gg"),
        ],
        Some(FileField { file_name: "shot.jpg", content_type: "image/jpeg", data }),
    )
}

fn seeded_image(title: &str, game: &str, genre: &str, likes: i64, age_minutes: i64) -> Image {
    let mut image = Image::from_submission(
        Uuid::new_v4(),
        Submission {
            title: title.into(),
            url: format!("{BASE_URL}/assets/screenshots/{title}.jpg"),
            genre: genre.into(),
            game: game.into(),
            uploader_id: "seed".into(),
            uploader_email: Some("seed@imagi.gg".into()),
            storage_path: None,
            public_id: Some(format!("screenshots/{title}.jpg")),
        },
        Utc::now() - Duration::minutes(age_minutes),
    );
    image.likes = likes;
    image
}

fn asset_path(url: &str) -> String {
    url.strip_prefix(BASE_URL).unwrap().to_string()
}

#[tokio::test]
async fn upload_approve_and_toggle_like() {
    let (_, app) = app(test_config());
    let data = jpeg();

    let (status, request) = send(&app, multipart_request("/api/upload", false, screenshot_form("Boss Fight", "U", &data))).await;
    assert_eq!(status, StatusCode::CREATED, "{request}");
    assert_eq!(request["status"], "pending");
    assert_eq!(request["title"], "Boss Fight");
    let request_id = request["request_id"].as_str().unwrap().to_string();

    // The returned asset URL is reachable.
    let response = app.clone().oneshot(get(&asset_path(request["url"].as_str().unwrap()), false)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(response.headers()[header::CONTENT_SECURITY_POLICY], "sandbox");

    let (status, image) = send(&app, admin_post(&format!("/api/requests/{request_id}/approve"))).await;
    assert_eq!(status, StatusCode::OK, "{image}");
    assert_eq!(image["title"], "Boss Fight");
    assert_eq!(image["likes"], 0);
    assert_eq!(image["dislikes"], 0);

    let (_, requests) = send(&app, get("/api/requests", true)).await;
    assert!(requests.as_array().unwrap().iter().all(|r| r["request_id"] != request_id.as_str()));

    let image_id = image["image_id"].as_str().unwrap().to_string();
    let vote_uri = format!("/api/images/{image_id}/vote");

    let (status, liked) = send(&app, json_request(Method::POST, &vote_uri, false, json!({"user_id": "U", "vote": "like"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(liked["likes"], 1);
    assert_eq!(liked["likers"], json!(["U"]));

    let (_, unliked) = send(&app, json_request(Method::POST, &vote_uri, false, json!({"user_id": "U", "vote": "like"}))).await;
    assert_eq!(unliked["likes"], 0);
    assert_eq!(unliked["likers"], json!([]));
}

fn admin_post(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("x-admin-token", ADMIN_TOKEN)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn upload_requires_every_field() {
    let (state, app) = app(test_config());
    let data = jpeg();
    let body = multipart_body(
        &[("name", "Boss Fight"), ("game", "Elden Ring"), ("userId", "U"), ("userEmail", "u@imagi.gg")],
        Some(FileField { file_name: "shot.jpg", content_type: "image/jpeg", data: &data }),
    );

    let (status, error) = send(&app, multipart_request("/api/upload", false, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].as_str().unwrap().contains("genre"), "{error}");
    assert!(state.requests.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn upload_rejects_non_images() {
    let (state, app) = app(test_config());
    let body = multipart_body(
        &[("name", "Notes"), ("genre", "RPG"), ("game", "Elden Ring"), ("userId", "U"), ("userEmail", "u@imagi.gg")],
        Some(FileField { file_name: "notes.txt", content_type: "text/plain", data: b"not a screenshot" }),
    );

    let (status, _) = send(&app, multipart_request("/api/upload", false, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(state.requests.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn admin_endpoints_need_the_token() {
    let (_, app) = app(test_config());

    let (status, _) = send(&app, get("/api/requests", false)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let change = json!({"action": "add_genre", "name": "Shooter"});
    let (status, _) = send(&app, json_request(Method::POST, "/api/config", false, change)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut request = get("/api/requests", false);
    request.headers_mut().insert("x-admin-token", "wrong".parse().unwrap());
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_upload_publishes_directly() {
    let (state, app) = app(test_config());
    let data = jpeg();

    let (status, image) = send(&app, multipart_request("/api/admin-upload", true, screenshot_form("Vista", "admin", &data))).await;
    assert_eq!(status, StatusCode::CREATED, "{image}");
    assert_eq!(image["likes"], 0);
    assert!(image["public_id"].as_str().unwrap().starts_with("screenshots/"));
    assert!(state.requests.list_all().await.unwrap().is_empty());
    assert_eq!(state.images.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn rejected_requests_stay_and_cannot_be_approved() {
    let (_, app) = app(test_config());
    let data = jpeg();
    let (_, request) = send(&app, multipart_request("/api/upload", false, screenshot_form("Blurry", "U", &data))).await;
    let request_id = request["request_id"].as_str().unwrap().to_string();

    let (status, rejected) = send(&app, admin_post(&format!("/api/requests/{request_id}/reject"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "rejected");

    let (_, listed) = send(&app, get("/api/requests?status=rejected", true)).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["request_id"], request_id.as_str());

    let (status, _) = send(&app, admin_post(&format!("/api/requests/{request_id}/approve"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, admin_post(&format!("/api/requests/{}/approve", Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn requests_are_listed_newest_first() {
    let (_, app) = app(test_config());
    let data = jpeg();
    for name in ["First", "Second", "Third"] {
        send(&app, multipart_request("/api/upload", false, screenshot_form(name, "U", &data))).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let (_, listed) = send(&app, get("/api/requests?status=pending", true)).await;
    let titles: Vec<&str> = listed.as_array().unwrap().iter().map(|r| r["title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["Third", "Second", "First"]);

    let (status, _) = send(&app, get("/api/requests?status=archived", true)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_without_identifiers_keeps_the_document() {
    let (state, app) = app(test_config());
    let image = seeded_image("Keep", "Elden Ring", "RPG", 0, 0);
    state.images.create(&image).await.unwrap();

    let body = json!({ "doc_id": image.image_id.to_string() });
    let (status, _) = send(&app, json_request(Method::POST, "/api/delete", true, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, json_request(Method::POST, "/api/delete", true, json!({ "public_id": "x.jpg" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(state.images.get_by_id(image.image_id).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_retries_with_the_folder_prefix() {
    let (state, app) = app(test_config());
    let image = seeded_image("Legacy", "Elden Ring", "RPG", 0, 0);
    state.images.create(&image).await.unwrap();
    state
        .hosted_storage
        .upload("screenshots/legacy.jpg", jpeg(), Some("image/jpeg".into()))
        .await
        .unwrap();

    // Older records stored the id without the folder.
    let body = json!({ "doc_id": image.image_id.to_string(), "public_id": "legacy.jpg" });
    let (status, result) = send(&app, json_request(Method::POST, "/api/delete", true, body)).await;
    assert_eq!(status, StatusCode::OK, "{result}");
    assert_eq!(result, json!({ "success": true }));

    assert!(state.images.get_by_id(image.image_id).await.unwrap().is_none());
    let (status, _) = send(&app, get("/assets/screenshots/legacy.jpg", false)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_blob_delete_keeps_the_document() {
    let (state, app) = app(test_config());
    let image = seeded_image("Orphan", "Elden Ring", "RPG", 0, 0);
    state.images.create(&image).await.unwrap();

    let body = json!({ "doc_id": image.image_id.to_string(), "public_id": "screenshots/missing.jpg" });
    let (status, error) = send(&app, json_request(Method::POST, "/api/delete", true, body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error["details"].as_str().is_some(), "{error}");
    assert!(state.images.get_by_id(image.image_id).await.unwrap().is_some());
}

#[tokio::test]
async fn config_changes_show_up_on_the_next_read() {
    let (_, app) = app(test_config());

    for change in [
        json!({"action": "add_genre", "name": "  Shooter "}),
        json!({"action": "add_game", "name": "Halo"}),
        json!({"action": "add_game", "name": "Halo"}),
    ] {
        let (status, _) = send(&app, json_request(Method::POST, "/api/config", true, change)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, config) = send(&app, get("/api/config", false)).await;
    assert_eq!(config["genres"], json!(["Shooter"]));
    assert_eq!(config["games"], json!(["Halo"]));

    let (status, _) = send(&app, json_request(Method::POST, "/api/config", true, json!({"action": "remove_game", "name": "Halo"}))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, config) = send(&app, get("/api/config", false)).await;
    assert_eq!(config["games"], json!([]));

    let (status, _) = send(&app, json_request(Method::POST, "/api/config", true, json!({"action": "remove_genre", "name": "Racing"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, json_request(Method::POST, "/api/config", true, json!({"action": "add_game", "name": " "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logo_upload_records_the_game_logo() {
    let (_, app) = app(test_config());
    send(&app, json_request(Method::POST, "/api/config", true, json!({"action": "add_game", "name": "Halo"}))).await;
    let png = encoded(32, 32, ImageFormat::Png);

    let body = multipart_body(
        &[("game", "Halo")],
        Some(FileField { file_name: "halo.png", content_type: "image/png", data: &png }),
    );
    let (status, result) = send(&app, multipart_request("/api/logo-upload", true, body)).await;
    assert_eq!(status, StatusCode::OK, "{result}");
    let url = result["url"].as_str().unwrap();
    assert!(url.contains("/assets/logos/"));

    let (_, config) = send(&app, get("/api/config", false)).await;
    assert_eq!(config["game_logos"]["Halo"], url);

    let body = multipart_body(
        &[("game", "Unknown")],
        Some(FileField { file_name: "x.png", content_type: "image/png", data: &png }),
    );
    let (status, _) = send(&app, multipart_request("/api/logo-upload", true, body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gallery_filters_and_pages() {
    let (state, app) = app(test_config());
    for image in [
        seeded_image("Boss Fight", "Elden Ring", "RPG", 3, 30),
        seeded_image("Sunset", "Elden Ring", "RPG", 9, 20),
        seeded_image("Warthog", "Halo", "Shooter", 5, 10),
        seeded_image("Castle", "Elden Ring", "Adventure", 1, 0),
    ] {
        state.images.create(&image).await.unwrap();
    }

    let (_, page) = send(&app, get("/api/images?game=Elden%20Ring&genre=RPG&sort=likes", false)).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["images"][0]["title"], "Sunset");
    assert_eq!(page["images"][1]["title"], "Boss Fight");

    let (_, page) = send(&app, get("/api/images?search=WART", false)).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["images"][0]["game"], "Halo");

    let (_, page) = send(&app, get("/api/images?sort=recent&offset=1&limit=2", false)).await;
    assert_eq!(page["total"], 4);
    assert_eq!(page["offset"], 1);
    let titles: Vec<&str> = page["images"].as_array().unwrap().iter().map(|i| i["title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["Warthog", "Sunset"]);

    let (_, weekly) = send(&app, get("/api/images/weekly", false)).await;
    assert_eq!(weekly.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn admins_edit_image_details() {
    let (state, app) = app(test_config());
    let image = seeded_image("Typo", "Elden Ring", "RPG", 0, 0);
    state.images.create(&image).await.unwrap();
    let uri = format!("/api/images/{}", image.image_id);

    let (status, _) = send(&app, json_request(Method::PATCH, &uri, false, json!({"title": "Fixed"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, updated) = send(&app, json_request(Method::PATCH, &uri, true, json!({"title": "Fixed"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Fixed");
    assert_eq!(updated["game"], "Elden Ring");

    let (_, fetched) = send(&app, get(&uri, false)).await;
    assert_eq!(fetched["title"], "Fixed");

    let (status, _) = send(&app, get(&format!("/api/images/{}", Uuid::new_v4()), false)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, get("/api/images/not-a-uuid", false)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_votes_are_all_counted() {
    let (state, app) = app(test_config());
    let image = seeded_image("Popular", "Elden Ring", "RPG", 0, 0);
    state.images.create(&image).await.unwrap();
    let uri = format!("/api/images/{}/vote", image.image_id);

    let tasks: Vec<_> = (0..25)
        .map(|i| {
            let app = app.clone();
            let uri = uri.clone();
            let vote = if i % 5 == 0 { "dislike" } else { "like" };
            tokio::spawn(async move {
                send(&app, json_request(Method::POST, &uri, false, json!({"user_id": format!("user-{i}"), "vote": vote}))).await.0
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    let stored = state.images.get_by_id(image.image_id).await.unwrap().unwrap();
    assert_eq!(stored.likes, 20);
    assert_eq!(stored.dislikes, 5);
    assert_eq!(stored.likers.len(), 20);
    assert!(stored.likers.is_disjoint(&stored.dislikers));
}

#[tokio::test]
async fn voting_on_a_missing_image_is_not_found() {
    let (_, app) = app(test_config());
    let uri = format!("/api/images/{}/vote", Uuid::new_v4());
    let (status, _) = send(&app, json_request(Method::POST, &uri, false, json!({"user_id": "U", "vote": "like"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn repository_upload_is_unavailable_without_github() {
    let (_, app) = app(test_config());
    let data = jpeg();
    let (status, _) = send(&app, multipart_request("/api/github-upload", false, screenshot_form("Boss Fight", "U", &data))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (status, _) = send(&app, get("/api/github-upload", false)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn repository_upload_recompresses_and_tracks_usage() {
    let (state, app) = app(Config {
        github: Some(github_config(10 * 1024 * 1024)),
        ..test_config()
    });
    let wide = encoded(2400, 600, ImageFormat::Png);

    let (status, request) = send(&app, multipart_request("/api/github-upload", false, screenshot_form("Panorama", "U", &wide))).await;
    assert_eq!(status, StatusCode::CREATED, "{request}");
    assert_eq!(request["status"], "pending");
    let storage_path = request["storage_path"].as_str().unwrap().to_string();
    assert!(storage_path.starts_with("uploads/") && storage_path.ends_with(".jpg"));

    let repository = state.repository_storage.clone().unwrap();
    let (stored, content_type) = repository.download(&storage_path).await.unwrap();
    assert_eq!(content_type.as_deref(), Some("image/jpeg"));
    let decoded = image::load_from_memory(&stored).unwrap();
    assert_eq!(decoded.dimensions(), (1920, 480));

    let (status, usage) = send(&app, get("/api/github-upload", false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["file_count"], 1);
    assert_eq!(usage["size_bytes"], stored.len() as u64);
    assert_eq!(usage["remaining_bytes"], 10 * 1024 * 1024 - stored.len() as u64);
}

#[tokio::test]
async fn repository_upload_over_quota_is_refused() {
    let (state, app) = app(Config {
        github: Some(github_config(16)),
        ..test_config()
    });
    let data = jpeg();

    let (status, error) = send(&app, multipart_request("/api/github-upload", false, screenshot_form("Too Big", "U", &data))).await;
    assert_eq!(status, StatusCode::INSUFFICIENT_STORAGE, "{error}");
    assert!(state.requests.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn profile_edits_respect_the_cooldown() {
    let (_, app) = app(test_config());
    let (status, _) = send(&app, json_request(Method::POST, "/api/users", false, json!({"user_id": "u1", "username": "ash", "email": "ash@imagi.gg"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app, json_request(Method::POST, "/api/users", false, json!({"user_id": "u1", "username": "again", "email": "ash@imagi.gg"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, profile) = send(&app, json_request(Method::PATCH, "/api/users/u1", false, json!({"username": "ashen"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["username"], "ashen");
    assert!(profile["last_profile_edit"].is_string());

    let (status, error) = send(&app, json_request(Method::PATCH, "/api/users/u1", false, json!({"username": "ashen one"}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(error["details"].as_str().unwrap().contains("next edit allowed"));

    let (status, profile) = send(&app, json_request(Method::PATCH, "/api/users/u1", true, json!({"username": "ashen one"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["username"], "ashen one");
}

#[tokio::test]
async fn admin_accounts_skip_the_cooldown() {
    let (_, app) = app(test_config());
    send(&app, json_request(Method::POST, "/api/users", false, json!({"user_id": "m1", "username": "mod", "email": "Mod@imagi.gg"}))).await;

    for name in ["mod-a", "mod-b"] {
        let (status, _) = send(&app, json_request(Method::PATCH, "/api/users/m1", false, json!({"username": name}))).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, profile) = send(&app, get("/api/users/m1", false)).await;
    assert_eq!(profile["username"], "mod-b");

    let (status, _) = send(&app, get("/api/users/nobody", false)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_photo_is_cropped_and_linked() {
    let (_, app) = app(test_config());
    send(&app, json_request(Method::POST, "/api/users", false, json!({"user_id": "u2", "username": "kit", "email": "kit@imagi.gg"}))).await;
    let png = encoded(800, 600, ImageFormat::Png);

    let body = multipart_body(
        &[("userId", "u2")],
        Some(FileField { file_name: "me.png", content_type: "image/png", data: &png }),
    );
    let (status, result) = send(&app, multipart_request("/api/profile-photo", false, body)).await;
    assert_eq!(status, StatusCode::OK, "{result}");
    let url = result["url"].as_str().unwrap().to_string();
    assert!(url.contains("/assets/profile-photos/"));

    let response = app.clone().oneshot(get(&asset_path(&url), false)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(response.headers()[header::CONTENT_SECURITY_POLICY], "sandbox");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (400, 400));

    let (_, profile) = send(&app, get("/api/users/u2", false)).await;
    assert_eq!(profile["photo_url"], url.as_str());
}

#[tokio::test]
async fn profile_photo_rejects_other_types() {
    let (_, app) = app(test_config());
    let bmp = encoded(16, 16, ImageFormat::Bmp);
    let body = multipart_body(
        &[("userId", "u3")],
        Some(FileField { file_name: "me.bmp", content_type: "image/bmp", data: &bmp }),
    );
    let (status, _) = send(&app, multipart_request("/api/profile-photo", false, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_photo_counts_as_an_edit() {
    let (_, app) = app(test_config());
    send(&app, json_request(Method::POST, "/api/users", false, json!({"user_id": "u4", "username": "rue", "email": "rue@imagi.gg"}))).await;
    let (status, _) = send(&app, json_request(Method::PATCH, "/api/users/u4", false, json!({"photo_url": "http://localhost:3000/assets/old.jpg"}))).await;
    assert_eq!(status, StatusCode::OK);

    let png = encoded(120, 120, ImageFormat::Png);
    let form = || {
        multipart_body(
            &[("userId", "u4")],
            Some(FileField { file_name: "me.png", content_type: "image/png", data: &png }),
        )
    };
    let (status, error) = send(&app, multipart_request("/api/profile-photo", false, form())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS, "{error}");
    let (_, profile) = send(&app, get("/api/users/u4", false)).await;
    assert_eq!(profile["photo_url"], "http://localhost:3000/assets/old.jpg");

    let (status, result) = send(&app, multipart_request("/api/profile-photo", true, form())).await;
    assert_eq!(status, StatusCode::OK, "{result}");
    let (_, profile) = send(&app, get("/api/users/u4", false)).await;
    assert_eq!(profile["photo_url"], result["url"]);
}

#[tokio::test]
async fn fresh_profile_photo_starts_the_cooldown() {
    let (_, app) = app(test_config());
    send(&app, json_request(Method::POST, "/api/users", false, json!({"user_id": "u5", "username": "ivy", "email": "ivy@imagi.gg"}))).await;
    let png = encoded(50, 50, ImageFormat::Png);
    let body = multipart_body(
        &[("userId", "u5")],
        Some(FileField { file_name: "me.png", content_type: "image/png", data: &png }),
    );
    let (status, _) = send(&app, multipart_request("/api/profile-photo", false, body)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, profile) = send(&app, get("/api/users/u5", false)).await;
    assert!(profile["last_profile_edit"].is_string());
    let (status, _) = send(&app, json_request(Method::PATCH, "/api/users/u5", false, json!({"username": "ivy2"}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn svg_uploads_are_refused() {
    let (state, app) = app(test_config());
    let svg = br#"<svg xmlns="http://www.w3.org/2000/svg"><script>alert(1)</script></svg>"#;
    let body = multipart_body(
        &[("name", "Vector"), ("genre", "RPG"), ("game", "Elden Ring"), ("userId", "U"), ("userEmail", "u@imagi.gg")],
        Some(FileField { file_name: "shot.svg", content_type: "image/svg+xml", data: svg }),
    );

    let (status, error) = send(&app, multipart_request("/api/upload", false, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].as_str().unwrap().contains("image/svg+xml"), "{error}");
    assert!(state.requests.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_input_gets_a_json_error() {
    let (state, app) = app(test_config());
    let image = seeded_image("Arena", "Halo", "Shooter", 0, 1);
    state.images.create(&image).await.unwrap();

    let uri = format!("/api/images/{}/vote", image.image_id);
    let (status, error) = send(&app, json_request(Method::POST, &uri, false, json!({"vote": "like"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "Invalid JSON body");
    assert!(error["details"].as_str().unwrap().contains("user_id"), "{error}");

    let (status, error) = send(&app, json_request(Method::POST, "/api/config", true, json!({"action": "rename_game"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "Invalid JSON body");

    let (status, error) = send(&app, get("/api/images?offset=-1", false)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "Invalid query string");

    let stored = state.images.get_by_id(image.image_id).await.unwrap().unwrap();
    assert_eq!(stored.likes, 0);
}

#[tokio::test]
async fn health_and_missing_assets() {
    let (_, app) = app(test_config());
    let (status, body) = send(&app, get("/health", false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));

    let (status, _) = send(&app, get("/assets/screenshots/nothing.jpg", false)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
