use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use clap::Parser;

use forumdocs::cli::SiteArgs;
use forumdocs::engage::EngageQuery;
use forumdocs::error::{ResolveError, SiteError};
use forumdocs::site::Site;

const WARNING_HEADER: &str = "discourse-warning";

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Public origin used for sitemap URLs; defaults to `http://<addr>`.
    #[arg(long)]
    base_url: Option<String>,

    #[command(flatten)]
    site: SiteArgs,
}

#[derive(Clone)]
struct AppState {
    site: Arc<Site>,
    base_url: String,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    forumdocs::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting forumdocs-server");

    let config = args.site.site_config()?;
    let prefix = config.url_prefix.clone();
    let site = tokio::task::spawn_blocking(move || Site::from_config(config)).await??;
    let state = AppState {
        site: Arc::new(site),
        base_url: args
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", args.addr)),
    };

    let routes = Router::new()
        .route("/", get(home_handler))
        .route("/sitemap.txt", get(sitemap_txt_handler))
        .route("/sitemap.xml", get(sitemap_xml_handler))
        .route("/*path", get(page_handler));
    let app = if prefix == "/" {
        routes
    } else {
        Router::new().nest(&prefix, routes)
    };
    let app = app
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, %prefix, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

/// The engage listing on the home page takes its filters from the query
/// string.
async fn home_handler(State(state): State<AppState>, Query(query): Query<EngageQuery>) -> Response {
    serve_page(state, "/".to_owned(), query).await
}

async fn page_handler(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    serve_page(state, format!("/{path}"), EngageQuery::default()).await
}

async fn serve_page(state: AppState, relative_path: String, query: EngageQuery) -> Response {
    let site = Arc::clone(&state.site);
    let joined = tokio::task::spawn_blocking(move || {
        let page = site.page_with_query(&relative_path, &query);
        (page, site.take_warnings())
    })
    .await;

    let (result, warnings) = match joined {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(error = %err, "page task failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response = match result {
        Ok(page) => Json(page).into_response(),
        Err(err) => error_response(err),
    };
    append_warnings(response.headers_mut(), &warnings);
    response
}

fn error_response(err: SiteError) -> Response {
    match err {
        SiteError::Resolve(ResolveError::RedirectFound { target_url, .. }) => {
            match HeaderValue::from_str(&target_url) {
                Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
                Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }
        SiteError::Resolve(err @ ResolveError::PathNotFound { .. }) => {
            (StatusCode::NOT_FOUND, err.to_string()).into_response()
        }
        SiteError::Forum(err) => {
            let status = err
                .status()
                .and_then(|status| StatusCode::from_u16(status.as_u16()).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            tracing::warn!(error = %err, %status, "forum request failed");
            (status, err.to_string()).into_response()
        }
        err @ SiteError::Content { .. } => {
            tracing::error!(error = %err, "render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

fn append_warnings(headers: &mut HeaderMap, warnings: &[String]) {
    for warning in warnings {
        tracing::warn!(%warning, "index warning");
        match HeaderValue::from_str(warning) {
            Ok(value) => {
                headers.append(WARNING_HEADER, value);
            }
            Err(_) => tracing::debug!(%warning, "warning is not a valid header value"),
        }
    }
}

async fn sitemap_txt_handler(State(state): State<AppState>) -> Response {
    sitemap(state, false).await
}

async fn sitemap_xml_handler(State(state): State<AppState>) -> Response {
    sitemap(state, true).await
}

async fn sitemap(state: AppState, xml: bool) -> Response {
    let site = Arc::clone(&state.site);
    let base_url = state.base_url.clone();
    let joined = tokio::task::spawn_blocking(move || {
        if xml {
            site.sitemap_xml(&base_url)
        } else {
            site.sitemap_text(&base_url)
        }
    })
    .await;

    let content_type = if xml { "application/xml" } else { "text/plain; charset=utf-8" };
    match joined {
        Ok(Ok(body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Ok(Err(err)) => error_response(SiteError::Forum(err)),
        Err(err) => {
            tracing::error!(error = %err, "sitemap task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
