use agora_api::{
    bootstrap::seed_admin,
    server::{ServerState, app, token::TokenIssuer, upload::UploadDir},
};
use agora_common::model::{
    IdSource,
    auth::PasswordHash,
    user::{CreateUser, Role, User, Username},
};
use agora_db::{Store, memory::MemoryStore};
use axum::{
    Router,
    body::{Body, Bytes},
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::{path::Path, sync::Arc};
use tempfile::TempDir;
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;

const BOUNDARY: &str = "agora-test-boundary";
const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    tokens: Arc<TokenIssuer>,
    upload_dir: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let upload_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        seed_admin(store.as_ref(), "admin", "admin").await.unwrap();

        let tokens = Arc::new(TokenIssuer::new(b"test secret"));
        let uploads = UploadDir::create(upload_dir.path(), IdSource::default())
            .await
            .unwrap();

        let state = ServerState {
            store: store.clone(),
            tokens: tokens.clone(),
            uploads: Arc::new(uploads),
        };

        Self {
            router: app(state, MAX_UPLOAD_BYTES),
            store,
            tokens,
            upload_dir,
        }
    }

    async fn send_raw(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        (status, body)
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send_raw(request).await;
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };

        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(empty(Method::GET, uri, None)).await
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .send(json_request(
                Method::POST,
                "/api/login",
                &json!({ "username": username, "password": password }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        body["token"].as_str().unwrap().to_owned()
    }

    async fn admin(&self) -> User {
        self.store
            .fetch_user_by_username(&Username::new("admin".to_owned()).unwrap())
            .await
            .unwrap()
            .unwrap()
    }

    async fn create_post(&self, parts: &[Part<'_>]) -> String {
        let (status, body) = self.send(multipart("/api/post", parts)).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        body["postId"].as_str().unwrap().to_owned()
    }

    fn stored_files(&self) -> usize {
        count_files(self.upload_dir.path())
    }
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

fn multipart(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();

    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
            Part::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    request.body(Body::empty()).unwrap()
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

fn ids(list: &Value) -> Vec<&str> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap())
        .collect()
}

const PNG: Part<'static> = Part::File {
    name: "image",
    file_name: "cat.png",
    content_type: "image/png",
    bytes: b"\x89PNG\r\n\x1a\nnot much of a cat",
};

#[tokio::test]
async fn created_posts_are_listed_newest_first() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(multipart("/api/post", &[Part::Text("content", "first")]))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Post created successfully");
    let first = body["postId"].as_str().unwrap().to_owned();

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/post",
            &json!({ "content": "second", "userName": "layla" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let second = body["postId"].as_str().unwrap().to_owned();

    let (status, posts) = app.get("/api/posts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&posts), [second.as_str(), first.as_str()]);
    assert_eq!(posts[0]["userName"], "layla");
    assert_eq!(posts[1]["userName"], "Anonymous");
    assert_eq!(posts[1]["content"], "first");
    assert_eq!(posts[1]["imageUrl"], Value::Null);

    let (status, post) = app.get(&format!("/api/posts/{first}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(post, posts[1]);
}

#[tokio::test]
async fn blank_content_is_rejected_before_storing_the_image() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(multipart("/api/post", &[Part::Text("content", "  \n "), PNG]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let (status, body) = app.send(multipart("/api/post", &[PNG])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    assert_eq!(app.stored_files(), 0);
    assert_eq!(app.get("/api/posts").await.1, json!([]));
}

#[tokio::test]
async fn non_image_uploads_are_rejected() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send(multipart(
            "/api/post",
            &[
                Part::Text("content", "look at this"),
                Part::File {
                    name: "image",
                    file_name: "notes.txt",
                    content_type: "text/plain",
                    bytes: b"hello",
                },
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(multipart(
            "/api/post",
            &[Part::Text("content", "two of them"), PNG, PNG],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.stored_files(), 0);
    assert_eq!(app.get("/api/posts").await.1, json!([]));
}

#[tokio::test]
async fn uploaded_images_are_served() {
    let app = TestApp::new().await;

    let post_id = app
        .create_post(&[Part::Text("content", "my cat"), PNG])
        .await;
    let (_, post) = app.get(&format!("/api/posts/{post_id}")).await;
    let image_url = post["imageUrl"].as_str().unwrap();
    assert!(image_url.starts_with("/uploads/"), "{image_url}");
    assert_eq!(app.stored_files(), 1);

    let (status, bytes) = app.send_raw(empty(Method::GET, image_url, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&bytes[..], b"\x89PNG\r\n\x1a\nnot much of a cat");
}

#[tokio::test]
async fn unknown_and_malformed_post_ids() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/posts/12345").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);

    let (status, _) = app.get("/api/posts/not-an-id").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleting_posts_requires_an_admin() {
    let app = TestApp::new().await;
    let post_id = app
        .create_post(&[Part::Text("content", "delete me"), PNG])
        .await;
    let uri = format!("/api/posts/{post_id}");

    let (status, _) = app.send(empty(Method::DELETE, &uri, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(empty(Method::DELETE, &uri, Some("garbage")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.store
        .create_user(&CreateUser {
            username: Username::new("reader".to_owned()).unwrap(),
            password_hash: PasswordHash::generate("hunter2").unwrap(),
            role: Role::User,
        })
        .await
        .unwrap();
    let user_token = app.login("reader", "hunter2").await;
    let (status, _) = app
        .send(empty(Method::DELETE, &uri, Some(&user_token)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(ids(&app.get("/api/posts").await.1), [post_id.as_str()]);
    assert_eq!(app.stored_files(), 1);

    let admin_token = app.login("admin", "admin").await;
    let (status, body) = app
        .send(empty(Method::DELETE, &uri, Some(&admin_token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["postId"], post_id.as_str());
    assert_eq!(app.get("/api/posts").await.1, json!([]));
    assert_eq!(app.stored_files(), 0);

    let (status, _) = app
        .send(empty(Method::DELETE, &uri, Some(&admin_token)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_with_a_malformed_id_still_requires_an_admin() {
    let app = TestApp::new().await;
    let uri = "/api/posts/not-an-id";

    let (status, body) = app.send(empty(Method::DELETE, uri, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);

    app.store
        .create_user(&CreateUser {
            username: Username::new("reader".to_owned()).unwrap(),
            password_hash: PasswordHash::generate("hunter2").unwrap(),
            role: Role::User,
        })
        .await
        .unwrap();
    let user_token = app.login("reader", "hunter2").await;
    let (status, body) = app
        .send(empty(Method::DELETE, uri, Some(&user_token)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);

    let admin_token = app.login("admin", "admin").await;
    let (status, body) = app
        .send(empty(Method::DELETE, uri, Some(&admin_token)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn expired_tokens_are_rejected() {
    let app = TestApp::new().await;
    let post_id = app.create_post(&[Part::Text("content", "still here")]).await;

    let issued_at = OffsetDateTime::now_utc() - Duration::hours(13);
    let expired = app.tokens.issue_at(&app.admin().await, issued_at).unwrap();

    let (status, _) = app
        .send(empty(
            Method::DELETE,
            &format!("/api/posts/{post_id}"),
            Some(&expired.token),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(ids(&app.get("/api/posts").await.1), [post_id.as_str()]);
}

#[tokio::test]
async fn player_visits_are_counted() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(multipart(
            "/api/players",
            &[
                Part::Text("name", "Sami"),
                Part::Text("biography", "Goalkeeper since 2010"),
                PNG,
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Player added successfully");
    let player_id = body["playerId"].as_str().unwrap().to_owned();

    let visits_uri = format!("/api/players/{player_id}/visits");
    for expected in 1..=3 {
        let (status, player) = app.send(empty(Method::PATCH, &visits_uri, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(player["visits"], expected);
    }

    let (status, player) = app.get(&format!("/api/players/{player_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(player["name"], "Sami");
    assert_eq!(player["visits"], 3);
    assert!(player["imageUrl"].as_str().unwrap().starts_with("/uploads/"));

    let (status, players) = app.get("/api/players").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&players), [player_id.as_str()]);
}

#[tokio::test]
async fn visits_to_missing_players() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(multipart(
            "/api/players",
            &[
                Part::Text("name", "Sami"),
                Part::Text("biography", "Goalkeeper since 2010"),
                PNG,
            ],
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let player_id = body["playerId"].as_str().unwrap().to_owned();

    let (status, _) = app
        .send(empty(Method::PATCH, "/api/players/12345/visits", None))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(empty(Method::PATCH, "/api/players/nope/visits", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, player) = app.get(&format!("/api/players/{player_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(player["visits"], 0);
    assert_eq!(ids(&app.get("/api/players").await.1), [player_id.as_str()]);
}

#[tokio::test]
async fn players_need_a_name_and_biography() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(multipart("/api/players", &[Part::Text("name", "Sami")]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("biography"));

    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/api/players",
            &json!({ "name": "", "biography": "Striker" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, player) = app.get(&format!("/api/players/{player_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(player["visits"], 0);
    assert_eq!(ids(&app.get("/api/players").await.1), [player_id.as_str()]);
}

#[tokio::test]
async fn login_issues_bearer_tokens() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/login",
            &json!({ "username": "admin", "password": "admin" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tokenType"], "Bearer");
    assert_eq!(body["expiresIn"], 12 * 60 * 60);

    let claims = app.tokens.verify(body["token"].as_str().unwrap()).unwrap();
    assert_eq!(claims.role, Role::Admin);
    assert_eq!(claims.user_id(), app.admin().await.id);
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let app = TestApp::new().await;

    for (credentials, expected) in [
        (
            json!({ "username": "admin", "password": "wrong" }),
            StatusCode::UNAUTHORIZED,
        ),
        (
            json!({ "username": "nobody", "password": "admin" }),
            StatusCode::UNAUTHORIZED,
        ),
        (
            json!({ "username": " admin ", "password": "admin" }),
            StatusCode::UNAUTHORIZED,
        ),
        (json!({ "username": "admin" }), StatusCode::BAD_REQUEST),
        (
            json!({ "username": "", "password": "admin" }),
            StatusCode::BAD_REQUEST,
        ),
        (json!({}), StatusCode::BAD_REQUEST),
    ] {
        let (status, body) = app
            .send(json_request(Method::POST, "/api/login", &credentials))
            .await;
        assert_eq!(status, expected, "{credentials} -> {body}");
        assert_eq!(body["status"], expected.as_u16());
        assert!(body.get("token").is_none());
    }
}

#[tokio::test]
async fn unknown_routes_are_json_404s() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/nothing-here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
    assert!(body["message"].as_str().unwrap().contains("/api/nothing-here"));
}

#[tokio::test]
async fn wrong_methods_are_json_405s() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/post").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["status"], 405);
    assert!(body["message"].as_str().unwrap().contains("/api/post"));

    let (status, body) = app
        .send(empty(Method::PUT, "/api/posts/12345", None))
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["status"], 405);
}
