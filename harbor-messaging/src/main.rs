use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;
use socketioxide::SocketIo;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod config;
mod events;
mod models;
mod notify;
mod routes;
mod schema;
mod services;
mod socket;
mod validation;

use config::AppConfig;
use harbor_shared::clients::db::{create_pool, DbPool};
use harbor_shared::clients::minio::MinioClient;
use harbor_shared::clients::rabbitmq::RabbitMQClient;
use harbor_shared::clients::redis::RedisClient;
use harbor_shared::clients::users::UsersClient;
use notify::{Notifier, SocketNotifier};

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub rabbitmq: RabbitMQClient,
    pub redis: RedisClient,
    pub minio: MinioClient,
    pub users: UsersClient,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: metrics_exporter_prometheus::PrometheusHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    harbor_shared::middleware::init_tracing("harbor-messaging");

    let config = AppConfig::load()?;
    let port = config.port;

    let metrics = harbor_shared::middleware::init_metrics();

    let db = create_pool(&config.database_url);

    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;
    let redis = RedisClient::connect(&config.redis_url).await?;

    let minio = MinioClient::new(
        &config.minio_endpoint,
        &config.minio_access_key,
        &config.minio_secret_key,
        &config.minio_bucket,
        &config.minio_public_url,
    )
    .await;

    let users = UsersClient::new(reqwest::Client::new(), config.user_service_url.clone());

    // Build the Socket.IO layer; the notifier wraps io so REST handlers can
    // push through the same transport
    let (sio_layer, io) = SocketIo::builder().build_layer();
    let notifier: Arc<dyn Notifier> = Arc::new(SocketNotifier::new(io.clone()));

    let state = Arc::new(AppState {
        db,
        config,
        rabbitmq,
        redis,
        minio,
        users,
        notifier,
        metrics,
    });

    // Configure the Socket.IO namespace with state via closure
    io.ns("/", {
        let state = state.clone();
        move |socket: socketioxide::extract::SocketRef| {
            let state = state.clone();
            async move {
                socket::handlers::on_connect_with_state(socket, state).await;
            }
        }
    });

    // Spawn the user.deleted subscriber
    let sub_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = events::subscriber::listen_user_deleted(sub_state).await {
            tracing::error!(error = %e, "user.deleted subscriber failed");
        }
    });

    let app = Router::new()
        // Health and metrics
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        // Conversations
        .route("/conversations", post(routes::conversations::create_conversation)
            .get(routes::conversations::list_conversations))
        .route("/conversations/group", post(routes::conversations::create_group))
        .route("/conversations/:id", get(routes::conversations::get_conversation)
            .patch(routes::conversations::update_group))
        .route("/conversations/:id/photo", post(routes::conversations::upload_group_photo)
            .layer(DefaultBodyLimit::max(10 * 1024 * 1024)))
        .route("/conversations/:id/members", post(routes::conversations::add_member))
        .route("/conversations/:id/members/:user_id", delete(routes::conversations::remove_member))
        .route("/conversations/:id/leave", post(routes::conversations::leave_group))
        .route("/conversations/:id/seen", put(routes::messages::mark_seen))
        // Messages
        .route("/conversations/:id/messages", get(routes::messages::list_messages)
            .post(routes::messages::send_message))
        .route("/conversations/:id/media", post(routes::messages::send_media)
            .layer(DefaultBodyLimit::max(50 * 1024 * 1024)))
        // Unread count
        .route("/unread-count", get(routes::messages::get_unread_count))
        .layer(axum::middleware::from_fn(harbor_shared::middleware::metrics_middleware))
        .layer(sio_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "harbor-messaging starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
