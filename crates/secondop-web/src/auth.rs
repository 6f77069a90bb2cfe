//! 认证与授权守卫
//!
//! 主体解析（会话令牌 → 用户）是协作服务；守卫只消费解析结果：
//! 无主体返回 `Unauthenticated`，角色不在允许列表返回 `Forbidden`。
//! 所有变更病例、影像请求或用户启用标记的处理器必须先通过守卫。

use crate::server::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use secondop_core::{Result, SecondOpError, User, UserRole};
use secondop_database::PlatformStore;
use secondop_workflow::token;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

/// 已解析的请求主体（未认证请求为 None）
#[derive(Clone)]
pub struct CurrentUser(pub Option<User>);

/// 认证服务
///
/// 持有会话表并对照存储解析用户。会话签发走平台引导流程（注册登录
/// 属外部协作面，不在本服务内）。
pub struct AuthService {
    store: Arc<dyn PlatformStore>,
    sessions: RwLock<HashMap<String, Uuid>>,
}

impl AuthService {
    pub fn new(store: Arc<dyn PlatformStore>) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// 为用户开启会话，返回会话令牌
    pub async fn open_session(&self, user_id: Uuid) -> String {
        let session_token = token::issue().plaintext;
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_token.clone(), user_id);
        session_token
    }

    /// 解析 Authorization 头为用户
    ///
    /// 停用账号不再解析为主体，相当于立即吊销其全部会话。
    pub async fn authenticate(&self, auth_header: Option<&str>) -> Result<Option<User>> {
        let session_token = match auth_header {
            Some(header) if header.starts_with("Bearer ") => &header[7..],
            _ => return Ok(None),
        };

        let user_id = {
            let sessions = self.sessions.read().await;
            match sessions.get(session_token) {
                Some(user_id) => *user_id,
                None => return Ok(None),
            }
        };

        let user = match self.store.get_user(user_id).await? {
            Some(user) if user.is_active => user,
            _ => return Ok(None),
        };

        Ok(Some(user))
    }
}

/// 主体解析中间件
///
/// 对所有路由运行，把解析结果（可能为空）放入请求扩展。是否要求
/// 主体由各处理器的守卫决定，免认证的上传路径因此也走同一条链。
pub async fn resolve_principal(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let current = match state.auth.authenticate(auth_header).await {
        Ok(user) => CurrentUser(user),
        Err(e) => {
            // 解析失败按未认证处理，守卫路径上会得到 401
            warn!("Principal resolution failed: {}", e);
            CurrentUser(None)
        }
    };

    request.extensions_mut().insert(current);
    next.run(request).await
}

/// 授权守卫
pub fn require_role(current: &CurrentUser, allowed: &[UserRole]) -> Result<User> {
    let user = current
        .0
        .as_ref()
        .ok_or_else(|| SecondOpError::Unauthenticated("Authentication required".to_string()))?;

    if !allowed.contains(&user.role) {
        return Err(SecondOpError::Forbidden(format!(
            "Role {} is not allowed for this operation",
            user.role.as_str()
        )));
    }

    Ok(user.clone())
}
