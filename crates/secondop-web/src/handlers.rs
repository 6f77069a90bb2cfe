//! HTTP处理器

use crate::auth::{require_role, CurrentUser};
use crate::server::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use secondop_core::{CaseStatus, SecondOpError, UserRole};
use secondop_workflow::{NewImageRequest, UploadedFile};
use serde::Deserialize;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

/// HTTP 层错误包装，把领域错误映射为响应
pub struct ApiError(pub SecondOpError);

impl From<SecondOpError> for ApiError {
    fn from(e: SecondOpError) -> Self {
        ApiError(e)
    }
}

/// 处理器统一结果类型
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self.0 {
            SecondOpError::Unauthenticated(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg)
            }
            SecondOpError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            SecondOpError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            SecondOpError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            SecondOpError::InvalidAssignee(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_ASSIGNEE", msg)
            }
            SecondOpError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "INVALID_TOKEN",
                "Invalid or already consumed upload token".to_string(),
            ),
            // 内部细节只进日志，响应体保持不透明
            other => {
                error!("Internal error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": true,
            "kind": kind,
            "message": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "SecondOp Web API",
        "version": "1.0.0",
        "status": "running",
        "endpoints": {
            "health": "/health",
            "cases": "/cases/{id}/assign, /cases/{id}/status",
            "images": "/images/request, /images/upload/{token}"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": "1.0.0"
    }))
}

// ========== 病例相关处理器 ==========

#[derive(Debug, Deserialize)]
pub struct AssignBody {
    pub doctor_id: Option<Uuid>,
}

/// 指派医生（仅管理员）
pub async fn assign_case(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<AssignBody>,
) -> ApiResult<impl IntoResponse> {
    require_role(&current, &[UserRole::Admin])?;

    let doctor_id = body
        .doctor_id
        .ok_or_else(|| SecondOpError::Validation("doctor_id is required".to_string()))?;

    let case = state.cases.assign(case_id, doctor_id).await?;
    Ok(Json(json!({
        "message": "Case assigned",
        "case": case
    })))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: Option<String>,
}

/// 设置病例状态（仅管理员）
pub async fn set_case_status(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<StatusBody>,
) -> ApiResult<impl IntoResponse> {
    require_role(&current, &[UserRole::Admin])?;

    let status: CaseStatus = body
        .status
        .ok_or_else(|| SecondOpError::Validation("status is required".to_string()))?
        .parse()?;

    let case = state.cases.set_status(case_id, status).await?;
    Ok(Json(json!({
        "message": "Case status updated",
        "case": case
    })))
}

/// 查看病例影像（管理员、主治医生或病例所属患者）
pub async fn list_case_images(
    State(state): State<AppState>,
    Path(case_id): Path<Uuid>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    let user = require_role(
        &current,
        &[UserRole::Admin, UserRole::Doctor, UserRole::Patient],
    )?;

    let case = state
        .store
        .get_case(case_id)
        .await?
        .ok_or_else(|| SecondOpError::NotFound(format!("Case {} not found", case_id)))?;

    let allowed = match user.role {
        UserRole::Admin => true,
        UserRole::Doctor => case.doctor_id == Some(user.id),
        UserRole::Patient => case.patient_id == user.id,
    };
    if !allowed {
        return Err(SecondOpError::Forbidden(
            "Not a participant of this case".to_string(),
        )
        .into());
    }

    let images = state.store.list_images_for_case(case_id).await?;
    let total = images.len();
    Ok(Json(json!({
        "images": images,
        "total": total
    })))
}

// ========== 影像交换处理器 ==========

/// 患者发起影像请求（仅患者）
///
/// 响应体经由 `ImageRequest` 的序列化规则自动略去令牌字段。
pub async fn create_image_request(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<NewImageRequest>,
) -> ApiResult<impl IntoResponse> {
    let patient = require_role(&current, &[UserRole::Patient])?;

    let request = state.exchange.create_request(&patient, body).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// 外部机构上传影像（免认证，路径中的令牌即凭证）
pub async fn upload_image(
    State(state): State<AppState>,
    Path(token): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut file: Option<UploadedFile> = None;
    let mut case_id: Option<Uuid> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SecondOpError::Validation(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload.bin".to_string());
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| SecondOpError::Validation(format!("Unreadable file field: {}", e)))?
                    .to_vec();
                file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            Some("case_id") => {
                let text = field.text().await.map_err(|e| {
                    SecondOpError::Validation(format!("Unreadable case_id field: {}", e))
                })?;
                let parsed = text
                    .parse()
                    .map_err(|_| SecondOpError::Validation("case_id must be a UUID".to_string()))?;
                case_id = Some(parsed);
            }
            _ => {}
        }
    }

    let file =
        file.ok_or_else(|| SecondOpError::Validation("file is required".to_string()))?;

    let image = state.exchange.accept_upload(&token, file, case_id).await?;
    Ok((StatusCode::CREATED, Json(image)))
}

// ========== 用户相关处理器 ==========

/// 获取当前用户信息
pub async fn get_current_user(
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    let user = require_role(
        &current,
        &[UserRole::Admin, UserRole::Doctor, UserRole::Patient],
    )?;
    Ok(Json(user))
}

/// 获取所有用户（仅管理员）
pub async fn list_users(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    require_role(&current, &[UserRole::Admin])?;

    let users = state.store.list_users().await?;
    let total = users.len();
    Ok(Json(json!({
        "users": users,
        "total": total
    })))
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
    pub is_active: Option<bool>,
}

/// 切换用户启用标记（仅管理员）
pub async fn set_user_active(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<ActiveBody>,
) -> ApiResult<impl IntoResponse> {
    require_role(&current, &[UserRole::Admin])?;

    let is_active = body
        .is_active
        .ok_or_else(|| SecondOpError::Validation("is_active is required".to_string()))?;

    let user = state
        .store
        .set_user_active(user_id, is_active)
        .await?
        .ok_or_else(|| SecondOpError::NotFound(format!("User {} not found", user_id)))?;

    Ok(Json(json!({
        "message": "User updated",
        "user": user
    })))
}
