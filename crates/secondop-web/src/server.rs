//! Web服务器

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use secondop_core::{Result, SecondOpError};
use secondop_database::PlatformStore;
use secondop_workflow::{CaseService, ImageExchange};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::auth::{resolve_principal, AuthService};
use crate::handlers::{
    api_root, assign_case, create_image_request, get_current_user, health, list_case_images,
    list_users, set_case_status, set_user_active, upload_image,
};

/// 上传体大小上限（32 MB）
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub cases: Arc<CaseService>,
    pub exchange: Arc<ImageExchange>,
    pub store: Arc<dyn PlatformStore>,
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        let app = create_app(state);
        Self { addr, app }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| SecondOpError::Internal(format!("Web server failed: {}", e)))?;

        Ok(())
    }
}

/// 构建路由
///
/// 主体解析中间件覆盖全部路由；上传端点刻意不设守卫，令牌即凭证。
pub fn create_app(state: AppState) -> Router {
    Router::new()
        // 根路径与健康检查
        .route("/", get(api_root))
        .route("/health", get(health))

        // 当前用户与用户管理
        .route("/auth/me", get(get_current_user))
        .route("/users", get(list_users))
        .route("/users/:id/active", put(set_user_active))

        // 病例生命周期
        .route("/cases/:id/assign", put(assign_case))
        .route("/cases/:id/status", put(set_case_status))
        .route("/cases/:id/images", get(list_case_images))

        // 影像交换
        .route("/images/request", post(create_image_request))
        .route("/images/upload/:token", post(upload_image))

        // 主体解析
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            resolve_principal,
        ))

        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
