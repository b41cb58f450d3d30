use std::io;

use dotenvy::dotenv;
use order_payment_service::config::AppConfig;
use order_payment_service::{build_server, create_pool, run_migrations};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(io::Error::other)?;
    log::info!("Gateway at {}, shop {}", config.gateway.base_url, config.gateway.shop_id);

    let pool = create_pool(&config.database_url).map_err(io::Error::other)?;
    run_migrations(&pool).map_err(io::Error::other)?;

    log::info!("Starting server at http://{}:{}", config.host, config.port);

    build_server(&config, pool)?.await
}
