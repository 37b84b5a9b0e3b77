//! HTTP surface of the sink.
//!
//! | Route | Method | Response |
//! |---|---|---|
//! | `/mails` | GET | summaries of every stored mail |
//! | `/mails` | POST | raw RFC 5322 body in, `{"id": n}` out (201) |
//! | `/mails/:id` | GET | one summary |
//! | `/mails/:id/source` | GET | raw source |
//! | `/mails/:id/text` | GET | plain-text part |
//! | `/mails/:id/html` | GET | HTML part with `cid:` references resolved |
//! | `/mails/:id/html/:content_id` | GET | inline part bytes |
//! | `/mails/:id/html/query` | POST | `{"xpath": ".."}` in, `HtmlNode` list out |
//! | `/mails/:id/attachments` | GET | attachment metadata |
//! | `/mails/:id/attachments/:index` | GET | attachment bytes |
//! | `/purge` | POST | drop every mail (204) |
//! | `/createMail` | POST | send the demo mail (204) |

pub mod base_url;
pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::service::Mailbox;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub mailbox: Arc<Mailbox>,
    /// Configured external base URL; overrides request headers when set.
    pub public_url: Option<String>,
}

/// Build the application router. Request bodies above `max_body` bytes are
/// answered with 413.
pub fn router(state: AppState, max_body: usize) -> Router {
    Router::new()
        .route("/mails", get(handlers::list_mails).post(handlers::ingest_mail))
        .route("/mails/:id", get(handlers::get_mail))
        .route("/mails/:id/source", get(handlers::get_source))
        .route("/mails/:id/text", get(handlers::get_text))
        .route("/mails/:id/html", get(handlers::get_html))
        .route("/mails/:id/html/query", post(handlers::query_html))
        .route("/mails/:id/html/:content_id", get(handlers::get_content))
        .route("/mails/:id/attachments", get(handlers::list_attachments))
        .route("/mails/:id/attachments/:index", get(handlers::get_attachment))
        .route("/purge", post(handlers::purge))
        .route("/createMail", post(handlers::create_mail))
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}

/// Serve `app` on `addr` until Ctrl-C.
pub async fn serve(addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
