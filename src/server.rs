//! HTTP gateway.
//!
//! Every request is answered from the shared, read-only [`ServingCatalog`]:
//!
//! | Route | Query | Response |
//! |---|---|---|
//! | `/{name}` | none | the file itself, with range and conditional support |
//! | `/{name}` | `archive=zip\|tar.gz` | a freshly built archive of that entry |
//! | `/DownThemAll` | `archive=zip\|tar.gz` | one archive of every entry |
//!
//! Unknown names and formats answer 404; build and I/O failures answer 500.
//! Archives are encoded on the blocking pool and held in memory until sent,
//! so concurrent large archive requests cost memory proportional to their
//! sizes; there is no cap.

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, Query, Request, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveFormat, ArchiveRequest};
use crate::catalog::ServingCatalog;
use crate::error::{Error, Result};
use crate::urls::DOWNLOAD_ALL;

/// How long in-flight requests may keep running after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// What a request asks for, decided before touching the filesystem.
#[derive(Debug, PartialEq, Eq)]
enum Target {
    Original(String),
    Archive(String, ArchiveFormat),
    Combined(ArchiveFormat),
}

impl Target {
    fn parse(name: String, archive: Option<&str>) -> Result<Self> {
        let Some(archive) = archive else {
            return Ok(Target::Original(name));
        };
        let format = archive.parse::<ArchiveFormat>()?;
        if name == DOWNLOAD_ALL {
            Ok(Target::Combined(format))
        } else {
            Ok(Target::Archive(name, format))
        }
    }
}

/// Build the gateway's routes over `catalog`.
///
/// # Arguments
///
/// * `catalog` - Entries to expose, shared with every request handler
///
/// # Returns
///
/// A [`Router`] answering `GET`/`HEAD /{name}`. Anything else is 404 or 405.
pub fn router(catalog: Arc<ServingCatalog>) -> Router {
    Router::new()
        .route("/{name}", get(serve_entry))
        .with_state(catalog)
}

async fn serve_entry(
    State(catalog): State<Arc<ServingCatalog>>,
    Path(name): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    request: Request,
) -> Result<Response> {
    match Target::parse(name, archive_param(&query))? {
        Target::Original(name) => serve_original(&catalog, &name, request).await,
        Target::Archive(name, format) => {
            let path = lookup(&catalog, &name)?;
            let filename = format!("{name}.{format}");
            serve_archive(vec![path], format, filename).await
        }
        Target::Combined(format) => {
            let filename = format!("{}_{}.{}", DOWNLOAD_ALL, Utc::now().timestamp(), format);
            serve_archive(catalog.paths(), format, filename).await
        }
    }
}

/// First `archive` value wins; later repeats are ignored.
fn archive_param(query: &[(String, String)]) -> Option<&str> {
    query
        .iter()
        .find(|(key, _)| key == "archive")
        .map(|(_, value)| value.as_str())
}

fn lookup(catalog: &ServingCatalog, name: &str) -> Result<PathBuf> {
    catalog
        .resolve(name)
        .map(|p| p.to_path_buf())
        .ok_or_else(|| Error::LookupNotFound(name.to_string()))
}

async fn serve_original(catalog: &ServingCatalog, name: &str, request: Request) -> Result<Response> {
    let path = lookup(catalog, name)?;
    debug!("request original {}", path.display());

    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|e| Error::io(&path, e))?;
    if metadata.is_dir() {
        // Directories are only offered as archives.
        return Err(Error::LookupNotFound(name.to_string()));
    }

    match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}

async fn serve_archive(
    paths: Vec<PathBuf>,
    format: ArchiveFormat,
    filename: String,
) -> Result<Response> {
    debug!("request {}", filename);

    let archive = ArchiveRequest::new(paths, format);
    let bytes = tokio::task::spawn_blocking(move || archive.build())
        .await
        .map_err(|e| Error::io("<archive task>", io::Error::other(e)))??;

    let headers = [
        (header::CONTENT_TYPE, format.mime_type().to_string()),
        (header::CONTENT_DISPOSITION, content_disposition(&filename)),
        (header::LAST_MODIFIED, http_date_now()),
        (header::CACHE_CONTROL, "no-store".to_string()),
    ];
    Ok((headers, bytes).into_response())
}

fn content_disposition(filename: &str) -> String {
    let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
    format!("attachment; filename=\"{escaped}\"")
}

fn http_date_now() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Bind all interfaces on `port`, dual-stack when IPv6 is available.
///
/// Tries `[::]:port` first and falls back to `0.0.0.0:port`.
///
/// # Errors
///
/// The IPv4 bind error when both attempts fail.
pub async fn bind(port: u16) -> io::Result<TcpListener> {
    match TcpListener::bind(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))).await {
        Ok(listener) => Ok(listener),
        Err(e) => {
            debug!("IPv6 bind failed ({}), falling back to IPv4", e);
            TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await
        }
    }
}

/// Serve `catalog` until `signal` resolves, then allow in-flight requests
/// [`SHUTDOWN_GRACE`] to finish before returning.
///
/// # Arguments
///
/// * `listener` - Bound socket, usually from [`bind`]
/// * `catalog` - Entries to serve
/// * `signal` - Future that starts the shutdown, usually [`shutdown_signal`]
///
/// # Returns
///
/// `Ok(())` once every connection has closed or the window has elapsed.
/// Requests still open after the window are abandoned.
pub async fn serve<F>(listener: TcpListener, catalog: Arc<ServingCatalog>, signal: F) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    serve_with_grace(listener, catalog, signal, SHUTDOWN_GRACE).await
}

pub(crate) async fn serve_with_grace<F>(
    listener: TcpListener,
    catalog: Arc<ServingCatalog>,
    signal: F,
    grace: Duration,
) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    if let Ok(addr) = listener.local_addr() {
        info!("listening on {}", addr);
    }

    let stop = Arc::new(Notify::new());
    let server = axum::serve(listener, router(catalog)).with_graceful_shutdown({
        let stop = stop.clone();
        async move { stop.notified().await }
    });
    let mut server = std::pin::pin!(server.into_future());

    tokio::select! {
        result = &mut server => return result,
        _ = signal => {}
    }

    info!("shutting down, waiting up to {:?} for open requests", grace);
    stop.notify_one();
    match tokio::time::timeout(grace, server).await {
        Ok(result) => result,
        Err(_) => {
            warn!("shutdown window elapsed, abandoning open requests");
            Ok(())
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
