use std::net::SocketAddr;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::Result;

/// Serve `/healthz` and `/readyz` until `cancel` fires.
///
/// `ready` is the supervisor's readiness token; nothing else is shared.
pub async fn serve(
    addr: SocketAddr,
    ready: CancellationToken,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("diagnostics listening on {}", listener.local_addr()?);

    axum::serve(listener, router(ready))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

/// Run [`serve`] on its own task, logging a failure instead of returning it.
pub fn spawn(
    addr: SocketAddr,
    ready: CancellationToken,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = serve(addr, ready, cancel).await {
            error!("diagnostics endpoint failed: {}", e);
        }
    })
}

/// Wait for the diagnostics task. Returns false if it panicked or was aborted.
pub async fn join(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            error!("diagnostics task failed: {}", e);
            false
        }
    }
}

pub fn router(ready: CancellationToken) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(ready)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(ready): State<CancellationToken>) -> Readiness {
    if ready.is_cancelled() {
        Readiness::Ready
    } else {
        Readiness::NotReady
    }
}

enum Readiness {
    Ready,
    NotReady,
}

impl IntoResponse for Readiness {
    fn into_response(self) -> Response {
        match self {
            Readiness::Ready => (StatusCode::OK, "ok").into_response(),
            Readiness::NotReady => (StatusCode::SERVICE_UNAVAILABLE, "not synced").into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn status(app: Router, path: &str) -> StatusCode {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_healthz_always_ok() {
        let app = router(CancellationToken::new());
        assert_eq!(status(app, "/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readyz_follows_token() {
        let ready = CancellationToken::new();
        assert_eq!(
            status(router(ready.clone()), "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        ready.cancel();
        assert_eq!(status(router(ready), "/readyz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_join_reports_panicked_task() {
        let task: JoinHandle<()> = tokio::spawn(async { panic!("diagnostics blew up") });
        assert!(!join(task).await);
    }

    #[tokio::test]
    async fn test_join_after_graceful_shutdown() {
        let cancel = CancellationToken::new();
        let task = spawn(
            "127.0.0.1:0".parse().unwrap(),
            CancellationToken::new(),
            cancel.clone(),
        );
        cancel.cancel();
        assert!(join(task).await);
    }
}
