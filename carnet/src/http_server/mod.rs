//! Public, unauthenticated surface: badge verification pages and photos.

pub mod page;

use crate::badge_rpc::db_ops::Repo;
use crate::photo::{content_type, PhotoOp};
use crate::utils::LogErr;
use crate::verify::{today, verify_token, Verdict};
use anyhow::Result;
use chrono::Local;
use hyper::header::{HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use log::{debug, error, info};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Everything a public request may read
pub struct PublicState {
    pub repo: Arc<dyn Repo + Send + Sync>,
    pub photos: Arc<dyn PhotoOp + Send + Sync>,
}

/// Handle to stop the public server
pub struct PublicServerHandle {
    stop: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl PublicServerHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.join.await {
            error!("public server task failed: {}", e);
        }
    }
}

pub fn verdict_status(verdict: Verdict) -> StatusCode {
    match verdict {
        Verdict::Valid | Verdict::Expired => StatusCode::OK,
        Verdict::Revoked => StatusCode::GONE,
        Verdict::Invalid => StatusCode::NOT_FOUND,
    }
}

fn wants_json(req: &Request<Body>) -> bool {
    req.headers()
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("application/json"))
}

fn plain(status: StatusCode, text: &'static str) -> Response<Body> {
    let mut resp = Response::new(Body::from(text));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}

fn respond(status: StatusCode, content_type: &str, body: Vec<u8>) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .header(CACHE_CONTROL, "no-store")
        .body(Body::from(body))
        .unwrap_or_else(|_| plain(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
}

async fn verify_page(state: &PublicState, token: &str, json: bool) -> Response<Body> {
    let verification = verify_token(state.repo.as_ref(), token, today()).await;
    debug!("verification answered {}", verification.verdict);
    let status = verdict_status(verification.verdict);
    if json {
        match serde_json::to_vec(&verification) {
            Ok(body) => respond(status, "application/json", body),
            Err(e) => {
                error!("encode verification: {}", e);
                plain(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    } else {
        let html = page::render(&verification, Local::now().naive_local());
        respond(status, "text/html; charset=utf-8", html.into_bytes())
    }
}

async fn photo(state: &PublicState, photo_id: &str) -> Response<Body> {
    let mime = match content_type(photo_id) {
        Some(mime) => mime,
        None => return plain(StatusCode::NOT_FOUND, "not found"),
    };
    match state.photos.get_photo(photo_id.to_owned()).await {
        Ok(data) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, mime)
            .header(CACHE_CONTROL, "public, max-age=86400, immutable")
            .body(Body::from(data))
            .unwrap_or_else(|_| plain(StatusCode::INTERNAL_SERVER_ERROR, "internal error")),
        Err(e) if e.is_not_found() => plain(StatusCode::NOT_FOUND, "not found"),
        Err(e) => {
            error!("read photo {}: {}", photo_id, e);
            plain(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// Route one request, never fails at the hyper level
pub async fn handle(
    state: Arc<PublicState>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::GET {
        return Ok(plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"));
    }

    let path = req.uri().path().to_owned();
    let resp = if path == "/health" {
        plain(StatusCode::OK, "ok")
    } else if let Some(token) = path.strip_prefix("/verify/") {
        verify_page(&state, token, wants_json(&req)).await
    } else if let Some(photo_id) = path.strip_prefix("/photos/") {
        photo(&state, photo_id).await
    } else {
        plain(StatusCode::NOT_FOUND, "not found")
    };
    Ok(resp)
}

/// Bind the public server and serve it on a background task
pub async fn start_public(
    url: &str,
    state: Arc<PublicState>,
) -> Result<(SocketAddr, PublicServerHandle)> {
    let addr = url.parse::<SocketAddr>()?;
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(state.clone(), req))) }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    let local_addr = server.local_addr();
    let (stop, stopped) = oneshot::channel::<()>();
    let graceful = server.with_graceful_shutdown(async {
        stopped.await.ok();
    });
    let join = tokio::spawn(async move {
        graceful.await.log_error();
        info!("public server stopped");
    });

    Ok((local_addr, PublicServerHandle { stop, join }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge_rpc::db_ops::fixtures::{input, memory_db};
    use crate::badge_rpc::db_ops::{DbOpsImpl, WorkerRepo};
    use crate::lifecycle::{CredentialLifecycle, LifecycleApi};
    use crate::photo::fixtures::png;
    use crate::photo::{upload_photo, DbPhotoStore};
    use crate::verify::Verification;

    async fn setup() -> (Arc<PublicState>, Arc<DbOpsImpl>, CredentialLifecycle) {
        let conn = memory_db().await;
        let repo = Arc::new(DbOpsImpl::new(conn.clone()));
        let state = Arc::new(PublicState {
            repo: repo.clone(),
            photos: Arc::new(DbPhotoStore::new(repo.clone())),
        });
        (state, repo, CredentialLifecycle::new(conn))
    }

    fn get(uri: &str, accept: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(accept) = accept {
            builder = builder.header(ACCEPT, accept);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_string(resp: Response<Body>) -> String {
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn valid_token_renders_badge() {
        let (state, repo, lifecycle) = setup().await;
        let worker = repo.create_worker(input("Ana", "V-77"), None).await.unwrap();
        let issued = lifecycle.issue(worker.id, None).await.unwrap();

        let resp = handle(state.clone(), get(&format!("/verify/{}", issued.token), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CACHE_CONTROL], "no-store");
        assert!(resp.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        let html = body_string(resp).await;
        assert!(html.contains("V-77"));
        assert!(html.contains("Carnet vigente hasta el 31/12/2030"));
    }

    #[tokio::test]
    async fn json_verdicts_and_status_codes() {
        let (state, repo, lifecycle) = setup().await;
        let worker = repo.create_worker(input("Ana", "V-77"), None).await.unwrap();
        let issued = lifecycle.issue(worker.id, None).await.unwrap();
        lifecycle.revoke(issued.id, None).await.unwrap();

        let resp = handle(
            state.clone(),
            get(&format!("/verify/{}", issued.token), Some("application/json")),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::GONE);
        let v: Verification = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(v.verdict, Verdict::Revoked);
        assert!(v.worker.is_none());

        let resp = handle(state, get("/verify/unknown", Some("application/json")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_string(resp).await;
        assert!(body.contains("INVALID"));
        assert!(!body.contains("V-77"));
    }

    #[tokio::test]
    async fn serves_photos_health_and_rejects_the_rest() {
        let (state, repo, _) = setup().await;
        let url = upload_photo(repo.as_ref(), png(), "http://x").await.unwrap();
        let path = url.trim_start_matches("http://x");

        let resp = handle(state.clone(), get(path, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "image/png");
        assert_eq!(
            hyper::body::to_bytes(resp.into_body()).await.unwrap().to_vec(),
            png()
        );

        let resp = handle(state.clone(), get("/photos/nope.png", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = handle(state.clone(), get("/health", None)).await.unwrap();
        assert_eq!(body_string(resp).await, "ok");

        let resp = handle(state.clone(), get("/admin", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let post = Request::builder()
            .method(Method::POST)
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = handle(state, post).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
