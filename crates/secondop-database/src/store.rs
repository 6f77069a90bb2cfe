//! 存储接口定义
//!
//! 所有病例、用户、影像请求的读写都经由该接口注入到上层服务中，
//! 领域逻辑不直接持有任何进程级全局状态。

use async_trait::async_trait;
use secondop_core::{Case, CaseStatus, ImageRequest, MedicalImage, Result, User};
use uuid::Uuid;

/// 一次成功令牌兑换要落库的上传件内容
///
/// `request_id` 和 `patient_id` 由被兑换的影像请求行填充，调用方不提供。
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub storage_ref: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub file_size: i64,
    pub checksum: String,
    /// 上传方随表单附带的病例ID；缺省时回落到影像请求所属的病例
    pub case_id: Option<Uuid>,
}

/// 平台存储接口
#[async_trait]
pub trait PlatformStore: Send + Sync {
    // ========== 用户相关操作 ==========

    async fn create_user(&self, user: &User) -> Result<()>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn list_users(&self) -> Result<Vec<User>>;

    /// 切换用户的启用标记，返回更新后的用户；用户不存在时返回 None
    async fn set_user_active(&self, id: Uuid, is_active: bool) -> Result<Option<User>>;

    // ========== 病例相关操作 ==========

    async fn create_case(&self, case: &Case) -> Result<()>;

    async fn get_case(&self, id: Uuid) -> Result<Option<Case>>;

    /// 指派医生：单条条件更新，强制状态为 ASSIGNED 并刷新 updated_at。
    /// 病例不存在时返回 None。重复指派直接覆盖。
    async fn assign_case(&self, case_id: Uuid, doctor_id: Uuid) -> Result<Option<Case>>;

    /// 设置病例状态：单条条件更新。仅在进入 COMPLETED 时写入
    /// completed_at，其余状态保留既有值；updated_at 总是刷新。
    /// completed_at 的计算必须在同一条更新语句内完成，不允许读写分离。
    async fn set_case_status(&self, case_id: Uuid, status: CaseStatus) -> Result<Option<Case>>;

    // ========== 影像交换相关操作 ==========

    async fn create_image_request(&self, request: &ImageRequest) -> Result<()>;

    async fn get_image_request(&self, id: Uuid) -> Result<Option<ImageRequest>>;

    /// 原子性兑换上传令牌并落库影像记录
    ///
    /// 按令牌摘要做一次 check-and-set：只有状态仍为 PENDING 的请求会被
    /// 标记为 USED，并在同一事务内写入 `MedicalImage`。并发兑换同一令牌
    /// 时恰好一个调用成功，其余得到 None。令牌未知或已消费同样返回 None。
    async fn consume_token_and_store_image(
        &self,
        token_digest: &str,
        upload: NewUpload,
    ) -> Result<Option<MedicalImage>>;

    async fn list_images_for_case(&self, case_id: Uuid) -> Result<Vec<MedicalImage>>;
}
