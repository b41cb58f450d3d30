pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use application::order_service::OrderService;
use application::payment_service::PaymentService;
use application::webhook_service::WebhookService;
use config::AppConfig;
use infrastructure::gateway::HttpPaymentGateway;
use infrastructure::order_repo::DieselOrderRepository;
use infrastructure::payment_repo::DieselPaymentRepository;
use infrastructure::signature::WebhookVerifier;

pub use db::{create_pool, DbPool};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::orders::create_order,
        handlers::orders::get_order,
        handlers::orders::list_orders,
        handlers::orders::cancel_order,
        handlers::payments::create_payment,
        handlers::payments::reconcile_payment,
        handlers::webhook::handle_webhook,
    ),
    components(schemas(
        handlers::orders::OrderResponse,
        handlers::orders::OrderItemResponse,
        handlers::orders::ListOrdersResponse,
        handlers::payments::CreatePaymentBody,
        handlers::payments::PaymentHandleResponse,
        handlers::payments::PaymentResponse,
    )),
    tags(
        (name = "orders", description = "Cart checkout and order history"),
        (name = "payments", description = "Gateway payments and notifications"),
    )
)]
pub struct ApiDoc;

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)?;
    Ok(())
}

/// Build and return an actix-web `Server` bound to the configured address.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    config: &AppConfig,
    pool: DbPool,
) -> std::io::Result<actix_web::dev::Server> {
    let gateway =
        HttpPaymentGateway::new(config.gateway.clone()).map_err(std::io::Error::other)?;
    let orders = DieselOrderRepository::new(pool.clone());
    let payments = DieselPaymentRepository::new(pool);

    let order_service = web::Data::new(OrderService::new(orders.clone()));
    let payment_service = web::Data::new(PaymentService::new(orders, payments.clone(), gateway));
    let webhook_service = web::Data::new(WebhookService::new(
        payments,
        WebhookVerifier::new(config.webhook.secret.clone()),
    ));
    let webhook_config = web::Data::new(config.webhook.clone());
    let operator_token = web::Data::new(handlers::OperatorToken(config.operator_token.clone()));
    let openapi = ApiDoc::openapi();

    Ok(HttpServer::new(move || {
        App::new()
            .app_data(order_service.clone())
            .app_data(payment_service.clone())
            .app_data(webhook_service.clone())
            .app_data(webhook_config.clone())
            .app_data(operator_token.clone())
            .wrap(Logger::default())
            .service(
                web::scope("/orders")
                    .route("", web::post().to(handlers::orders::create_order))
                    .route("", web::get().to(handlers::orders::list_orders))
                    .route("/{id}", web::get().to(handlers::orders::get_order))
                    .route("/{id}/cancel", web::post().to(handlers::orders::cancel_order)),
            )
            .service(
                web::scope("/payments")
                    .route("", web::post().to(handlers::payments::create_payment))
                    .route("/webhook", web::post().to(handlers::webhook::handle_webhook))
                    .route(
                        "/{gateway_id}/reconcile",
                        web::post().to(handlers::payments::reconcile_payment),
                    ),
            )
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone()),
            )
    })
    .bind((config.host.clone(), config.port))?
    .run())
}
