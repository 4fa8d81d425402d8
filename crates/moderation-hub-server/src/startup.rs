//! Actix server startup + app wiring.
//!
//! Builds the long-lived dependencies once, then serves the API, the
//! frontend page and the OpenAPI endpoints.

use std::path::PathBuf;
use std::time::Instant;

use actix_cors::Cors;
use actix_files::{Files, NamedFile};
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::{Next, from_fn};
use actix_web::{App, Error, HttpServer, web};
use anyhow::Result;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api;
use crate::catalog::build_enricher;
use crate::config;
use crate::moderation_db::ModerationDb;
use crate::moderation_service::ModerationService;
use crate::openapi;
use crate::state::AppState;

/// Build server state and start the Actix HTTP server.
pub(crate) async fn run(args: crate::Args) -> Result<()> {
    let mut cfg = load_config(args.config.as_ref())?;
    cfg.apply_env(|key| std::env::var(key).ok());

    let bind = match args.bind {
        Some(addr) => addr,
        None => config::bind_from_config(&cfg)?,
    };
    let static_dir = args
        .static_dir
        .unwrap_or_else(|| config::static_dir_from_config(&cfg));
    let cors_origins = cfg.cors_origins();
    tracing::info!(
        bind = %bind,
        static_dir = %static_dir.display(),
        cors_origins = ?cors_origins,
        "starting moderation-hub-server"
    );

    let catalog = build_enricher(&cfg.spotify);
    let db = ModerationDb::new(&cfg.database_settings());
    let state = web::Data::new(AppState::new(ModerationService::new(catalog, db)));

    let index_path = static_dir.join("index.html");
    if index_path.exists() {
        tracing::info!(path = %index_path.display(), "frontend page enabled");
    } else {
        tracing::info!(path = %index_path.display(), "frontend page disabled (index.html not found)");
    }

    HttpServer::new(move || {
        let cors = build_cors(&cors_origins);

        let mut app = App::new()
            .app_data(state.clone())
            .app_data(api::json_config())
            .wrap(cors)
            .wrap(from_fn(log_requests))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi::ApiDoc::openapi()),
            )
            .service(api::health::health)
            .service(api::blacklist_track)
            .service(api::blacklist_playlist)
            .service(api::whitelist_profile)
            .service(api::track_decision)
            .service(api::playlist_decision)
            .service(api::profile_decision);

        if static_dir.exists() {
            app = app.service(Files::new("/static", static_dir.clone()));
        }
        if index_path.exists() {
            let index = index_path.clone();
            app = app.service(
                web::resource("/").route(web::get().to(move || serve_index(index.clone()))),
            );
        }

        app
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}

fn build_cors(origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![actix_web::http::header::CONTENT_TYPE])
        .max_age(3600);
    for origin in origins {
        cors = cors.allowed_origin(origin);
    }
    cors
}

/// Load server config from `--config`, a `config.toml` next to the binary, or defaults.
fn load_config(path: Option<&PathBuf>) -> Result<config::ServerConfig> {
    if let Some(path) = path {
        return config::ServerConfig::load(path);
    }
    let auto_path = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("config.toml")))
        .filter(|path| path.exists());
    match auto_path {
        Some(path) => config::ServerConfig::load(&path),
        None => {
            tracing::info!("no config file found; using environment and defaults");
            Ok(config::ServerConfig::default())
        }
    }
}

async fn serve_index(index_path: PathBuf) -> actix_web::Result<NamedFile> {
    Ok(NamedFile::open(index_path)?)
}

/// Return true when the request path should be logged.
fn should_log_path(path: &str) -> bool {
    !(path == "/health" || path.starts_with("/static/") || path.starts_with("/swagger-ui/"))
}

/// Request logging middleware: one line per request, level by response status.
async fn log_requests(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    if !should_log_path(req.path()) {
        return next.call(req).await;
    }
    let path = req.path().to_string();
    let method = req.method().clone();
    let peer = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("-")
        .to_string();
    let start = Instant::now();

    let res = next.call(req).await?;
    let status = res.status();
    let elapsed_ms = start.elapsed().as_millis();
    if status.is_server_error() {
        tracing::error!(%method, %path, status = status.as_u16(), %peer, elapsed_ms, "request failed");
    } else if status.is_client_error() {
        tracing::warn!(%method, %path, status = status.as_u16(), %peer, elapsed_ms, "request rejected");
    } else {
        tracing::info!(%method, %path, status = status.as_u16(), %peer, elapsed_ms, "request served");
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_and_assets_are_not_logged() {
        assert!(!should_log_path("/health"));
        assert!(!should_log_path("/static/app.js"));
        assert!(!should_log_path("/swagger-ui/index.html"));
        assert!(should_log_path("/api/blacklist_track"));
        assert!(should_log_path("/"));
    }

    #[actix_web::test]
    async fn request_logger_passes_responses_through() {
        use actix_web::http::StatusCode;
        use actix_web::{HttpResponse, test};

        let app = test::init_service(
            App::new()
                .wrap(from_fn(log_requests))
                .route("/health", web::get().to(|| async { HttpResponse::Ok().body("ok") }))
                .route("/boom", web::get().to(|| async { HttpResponse::InternalServerError().finish() })),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "ok");

        let resp = test::call_service(&app, test::TestRequest::get().uri("/boom").to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/missing").to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let path = std::env::temp_dir().join("moderation-hub-server-missing-config.toml");
        assert!(load_config(Some(&path)).is_err());
    }
}
