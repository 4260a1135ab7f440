use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, routing::get};
use matte_backend::config::AppConfig;
use matte_backend::cors::build_cors_layer;
use matte_backend::features::health::health_check;
use matte_backend::features::process::{Compositor, build_remover, create_process_router};
use matte_backend::shutdown::ShutdownManager;
use matte_backend::state::AppState;
use tokio::sync::Semaphore;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        matte_backend::features::process::handler::process_images,
        matte_backend::features::health::handler::health_check,
    ),
    components(
        schemas(
            matte_backend::error::ErrorBody,
            matte_backend::features::health::handler::HealthResponse,
        )
    ),
    tags(
        (name = "Process", description = "Image compositing APIs"),
        (name = "Health", description = "Health APIs"),
    ),
    info(
        title = "Matte Backend API",
        version = "0.1.0",
        description = "Background removal + style compositing service (Axum)"
    )
)]
pub struct ApiDoc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matte_backend=info,tower_http=info".into()),
        )
        .init();

    // 创建优雅退出管理器
    let shutdown_manager = ShutdownManager::new();

    // Load config
    if let Err(e) = AppConfig::init_global() {
        tracing::error!("Config init failed: {}", e);
        std::process::exit(1);
    }
    let config = AppConfig::global();

    // 启动信号处理器
    if let Err(e) = shutdown_manager.start_signal_handler().await {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    // 注入抠图实现
    let remover = match build_remover(&config.remover) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("抠图实现初始化失败: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Background remover: {}", remover.name());

    // Shared state
    let app_state = AppState {
        compositor: Arc::new(Compositor::from_config(&config.pipeline)),
        remover,
        removal_semaphore: Arc::new(Semaphore::new(config.removal_permits())),
        upload: config.upload.clone(),
    };

    // Routes
    let mut app = Router::new()
        .route("/health", get(health_check))
        .merge(create_process_router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state)
        // multipart 请求体上限（超限由 axum 直接拒绝）
        .layer(DefaultBodyLimit::max(config.upload.max_request_bytes));

    if let Some(cors) = build_cors_layer(&config.cors) {
        app = app.layer(cors);
    }

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("Process API: http://{}/process", addr);

    // 运行服务器直到收到退出信号；合成过程中的请求在超时边界被直接放弃。
    let graceful = axum::serve(listener, app).with_graceful_shutdown(async move {
        let reason = shutdown_manager.wait_for_shutdown().await;
        tracing::info!("接收到退出信号: {:?}，开始优雅关闭HTTP服务器...", reason);
    });

    if let Err(e) = graceful.await {
        tracing::error!("服务器运行错误: {}", e);
        std::process::exit(1);
    }

    tracing::info!("服务器已优雅关闭");
}
