mod native {
    extern crate chirp;

    use actix_web::middleware::Logger;
    use actix_web::{web, App, HttpResponse, HttpServer};
    use tracing_subscriber::EnvFilter;

    use chirp::config::Config;
    use chirp::core::db::seed_demo_data;
    use chirp::AppState;

    fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        // also installs the log bridge, so actix's Logger lines come through
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    pub async fn run() -> std::io::Result<()> {
        init_tracing();

        let config = Config::load();
        let state = AppState::new(config.clone());

        if config.seed_demo_data {
            if let Err(e) = seed_demo_data(state.kv()) {
                tracing::error!(error = %e, "failed to seed demo data");
            }
        }

        let data = web::Data::new(state);
        tracing::info!(host = %config.host, port = config.port, "server listening");

        HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .wrap(Logger::default())
                .configure(chirp::configure)
                .default_service(web::route().to(not_found))
        })
        .bind((config.host.as_str(), config.port))?
        .run()
        .await
    }

    async fn not_found() -> HttpResponse {
        HttpResponse::NotFound().json(serde_json::json!({"error": "No route found"}))
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    native::run().await
}
