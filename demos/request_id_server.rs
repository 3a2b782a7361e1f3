//! Example: an Axum server that propagates X-Request-ID into every log line
//!
//! Run it and try:
//! ```text
//! curl -i localhost:3000/
//! curl -i -H 'X-Request-ID: my-request' localhost:3000/work
//! ```

use axum::{routing::get, Router};
use x_request_id::{get_request_id, logging, RequestId, RequestIdLayer};

#[tokio::main]
async fn main() {
    // Installs one stderr handler on the root logger.
    // Lines written inside a request end with [<request id>], lines outside it with [unknown].
    if let Err(e) = logging::init(None) {
        eprintln!("logging already configured: {e}");
    }

    let app = Router::new()
        .route("/", get(handler))
        .route("/work", get(work_handler))
        .layer(RequestIdLayer::new());

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();

    tracing::info!("Starting server on 0.0.0.0:3000");
    axum::serve(listener, app).await.unwrap();
}

async fn handler(request_id: RequestId) -> String {
    tracing::info!("Handling request");
    format!("Hello! Your request ID is: {request_id}")
}

async fn work_handler() -> &'static str {
    // Background work spawned through the crate inherits the request ID
    let child = x_request_id::spawn(async {
        tracing::info!("Background step running");
        get_request_id()
    });
    let inherited = child.await.ok().flatten();
    tracing::warn!(inherited = ?inherited.map(RequestId::into_string), "Background step finished");
    "done"
}
