use std::sync::Arc;

use anyhow::{anyhow, ensure, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use reviewdesk::config::AppConfig;
use reviewdesk::routes;
use reviewdesk::state::AppState;
use reviewdesk::storage::{MemoryObjectStorage, ObjectStorage};
use reviewdesk::store::{DocumentStore, MemoryStore};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "correct horse battery";

#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub email: String,
    pub role: String,
}

/// A logged-in user: their id plus a bearer token.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub token: String,
}

pub struct TestApp {
    router: Router,
    storage: Arc<MemoryObjectStorage>,
}

impl TestApp {
    pub fn new() -> Result<Self> {
        let config = AppConfig::for_tests("test-secret");
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryObjectStorage::new());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        let state = AppState::new(config, store, storage_for_state)?;
        let router = routes::create_router(state);
        Ok(Self { router, storage })
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<MemoryObjectStorage> {
        self.storage.clone()
    }

    pub async fn register_user(&self, email: &str, role: &str) -> Result<RegisteredUser> {
        let response = self
            .post_json(
                "/api/auth/register",
                &json!({ "email": email, "password": PASSWORD, "role": role }),
                None,
            )
            .await?;
        ensure!(
            response.status() == StatusCode::CREATED,
            "register failed with status {}",
            response.status()
        );
        read_json(response).await
    }

    pub async fn login_token(&self, email: &str, password: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct LoginResponse {
            access_token: String,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &json!({ "email": email, "password": password }),
                None,
            )
            .await?;
        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );
        let parsed: LoginResponse = read_json(response).await?;
        Ok(parsed.access_token)
    }

    /// Registers and logs in a user in one step.
    #[allow(dead_code)]
    pub async fn session(&self, email: &str, role: &str) -> Result<Session> {
        let user = self.register_user(email, role).await?;
        let token = self.login_token(email, PASSWORD).await?;
        Ok(Session { id: user.id, token })
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload, token).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::GET, path, token).await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::DELETE, path, token).await
    }

    #[allow(dead_code)]
    pub async fn upload_document(
        &self,
        title: &str,
        organization: &str,
        filename: &str,
        data: &[u8],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        for (name, value) in [("title", title), ("organization", organization)] {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend(value.as_bytes());
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend(b"Content-Type: application/pdf\r\n\r\n");
        body.extend(data);
        body.extend(b"\r\n");
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/documents")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;
        self.dispatch(request).await
    }

    /// Uploads a document and returns its id, failing unless it was created.
    #[allow(dead_code)]
    pub async fn create_document(&self, title: &str, token: &str) -> Result<Uuid> {
        #[derive(Deserialize)]
        struct Created {
            id: Uuid,
        }

        let response = self
            .upload_document(title, "Acme Foundation", "proposal.pdf", b"%PDF-1.4", token)
            .await?;
        ensure!(
            response.status() == StatusCode::CREATED,
            "upload failed with status {}",
            response.status()
        );
        let created: Created = read_json(response).await?;
        Ok(created.id)
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.dispatch(builder.body(Body::from(body))?).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.dispatch(builder.body(Body::empty())?).await
    }

    async fn dispatch(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn read_json<T: DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Asserts the status and the `reason` field of an error response.
#[allow(dead_code)]
pub async fn assert_error(
    response: hyper::Response<Body>,
    status: StatusCode,
    reason: &str,
) -> Result<()> {
    #[derive(Deserialize)]
    struct ErrorBody {
        reason: String,
    }

    ensure!(
        response.status() == status,
        "expected {status}, got {}",
        response.status()
    );
    let body: ErrorBody = read_json(response).await?;
    ensure!(
        body.reason == reason,
        "expected reason {reason}, got {}",
        body.reason
    );
    Ok(())
}
