use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use noticeboard::config::AppConfig;
use noticeboard::openapi::ApiDoc;
use noticeboard::repo::MessageRepo;
use noticeboard::storage::build_attachment_store;
use noticeboard::{config, AppState, MessageStore, SecurityHeaders};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("configuration error: {e}");
            eprintln!("Please copy .env.example to .env and configure it");
            std::process::exit(1);
        }
    };
    info!(
        upload_dir = %cfg.upload_dir.display(),
        max_files = cfg.limits.max_files,
        max_file_bytes = cfg.limits.max_file_bytes,
        "Bootstrapping noticeboard"
    );

    let repo = build_repo(&cfg).await?;
    let files = build_attachment_store(&cfg)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let state = AppState { messages: MessageStore::new(repo, files, cfg.limits.clone()) };
    let openapi = ApiDoc::openapi();
    let frontend_url = cfg.frontend_url.clone();

    let server = HttpServer::new(move || {
        let mut cors = Cors::default()
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
            .allowed_origin("http://localhost:5173")
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .max_age(3600);
        if let Some(front) = &frontend_url {
            cors = cors.allowed_origin(front);
        }

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(cfg.bind_addr.as_str())?;

    info!("Listening on http://{}", cfg.bind_addr);
    server.run().await
}

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &AppConfig) -> std::io::Result<Arc<dyn MessageRepo>> {
    use sqlx::postgres::PgPoolOptions;
    let to_io = |e: String| std::io::Error::new(std::io::ErrorKind::Other, e);

    let url = cfg.database_url.as_deref().ok_or_else(|| to_io("DATABASE_URL must be set for postgres-store".into()))?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .map_err(|e| to_io(format!("postgres connect failed: {e}")))?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| to_io(format!("migration failed: {e}")))?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(noticeboard::repo::pg::PgRepo::new(pool)))
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo(cfg: &AppConfig) -> std::io::Result<Arc<dyn MessageRepo>> {
    use noticeboard::repo::inmem::InMemRepo;
    let repo = match &cfg.data_dir {
        Some(dir) => InMemRepo::with_snapshot_dir(dir)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?,
        None => InMemRepo::new(),
    };
    info!(snapshot = cfg.data_dir.is_some(), "Using in-memory repository backend");
    Ok(Arc::new(repo))
}
