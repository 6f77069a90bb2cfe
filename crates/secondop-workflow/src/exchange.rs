//! 影像交换工作流
//!
//! 患者为病例发起影像请求，平台签发一次性上传令牌并通过外部通知通道
//! 交付影像机构；机构免认证上传，令牌本身即凭证。

use crate::token;
use async_trait::async_trait;
use chrono::Utc;
use secondop_core::{
    utils, ImageRequest, ImageRequestStatus, MedicalImage, Result, SecondOpError, User, UserRole,
};
use secondop_database::{NewUpload, PlatformStore};
use secondop_storage::StorageManager;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// 患者提交的影像请求内容
///
/// 必填字段以 `Option` 接收，缺失在工作流层统一报校验错误而不是在
/// 反序列化时拒绝。
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct NewImageRequest {
    pub case_id: Option<Uuid>,
    pub facility_name: Option<String>,
    pub facility_email: Option<String>,
    pub facility_phone: Option<String>,
    pub image_type: Option<String>,
    pub study_date: Option<chrono::NaiveDate>,
    pub notes: Option<String>,
}

/// 外部机构收到的上传件
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// 上传邀请通知通道（邮件投递为外部协作方）
///
/// 令牌明文只经由该通道离开平台，任何响应体和日志都不携带它。
#[async_trait]
pub trait FacilityNotifier: Send + Sync {
    async fn send_upload_invitation(&self, request: &ImageRequest, upload_token: &str)
        -> Result<()>;
}

/// 仅记录投递事实的通知实现（不落令牌）
pub struct LogOnlyNotifier;

#[async_trait]
impl FacilityNotifier for LogOnlyNotifier {
    async fn send_upload_invitation(
        &self,
        request: &ImageRequest,
        _upload_token: &str,
    ) -> Result<()> {
        info!(
            "Upload invitation for request {} dispatched to {}",
            request.id, request.facility_email
        );
        Ok(())
    }
}

/// 影像交换工作流
pub struct ImageExchange {
    store: Arc<dyn PlatformStore>,
    storage: Arc<StorageManager>,
    notifier: Arc<dyn FacilityNotifier>,
}

impl ImageExchange {
    pub fn new(
        store: Arc<dyn PlatformStore>,
        storage: Arc<StorageManager>,
        notifier: Arc<dyn FacilityNotifier>,
    ) -> Self {
        Self {
            store,
            storage,
            notifier,
        }
    }

    /// 患者发起影像请求
    ///
    /// 校验必填机构字段，确认病例存在且属于发起患者，签发令牌并持久化
    /// 其摘要，最后把明文交给通知通道。返回的请求对象经序列化后不含
    /// 令牌字段。
    pub async fn create_request(
        &self,
        patient: &User,
        input: NewImageRequest,
    ) -> Result<ImageRequest> {
        debug_assert_eq!(patient.role, UserRole::Patient);

        let case_id = input
            .case_id
            .ok_or_else(|| SecondOpError::Validation("case_id is required".to_string()))?;
        let facility_name = input
            .facility_name
            .filter(|s| utils::is_present(s))
            .ok_or_else(|| SecondOpError::Validation("facility_name is required".to_string()))?;
        let facility_email = input
            .facility_email
            .filter(|s| utils::is_valid_email(s))
            .ok_or_else(|| {
                SecondOpError::Validation("facility_email must be a valid email".to_string())
            })?;
        let image_type = input
            .image_type
            .filter(|s| utils::is_present(s))
            .ok_or_else(|| SecondOpError::Validation("image_type is required".to_string()))?;

        let case = self
            .store
            .get_case(case_id)
            .await?
            .ok_or_else(|| SecondOpError::NotFound(format!("Case {} not found", case_id)))?;

        if case.patient_id != patient.id {
            return Err(SecondOpError::Forbidden(
                "Case belongs to a different patient".to_string(),
            ));
        }

        let issued = token::issue();
        let request = ImageRequest {
            id: Uuid::new_v4(),
            case_id: case.id,
            patient_id: patient.id,
            facility_name,
            facility_email,
            facility_phone: input.facility_phone,
            image_type,
            study_date: input.study_date,
            notes: input.notes,
            token_digest: issued.digest,
            status: ImageRequestStatus::Pending,
            created_at: Utc::now(),
            consumed_at: None,
        };

        self.store.create_image_request(&request).await?;

        // 投递失败不回滚请求：请求已持久化，运维可通过通知通道重发
        if let Err(e) = self
            .notifier
            .send_upload_invitation(&request, &issued.plaintext)
            .await
        {
            warn!(
                "Failed to dispatch upload invitation for request {}: {}",
                request.id, e
            );
        }

        info!(
            "Image request {} created for case {} ({})",
            request.id, request.case_id, request.image_type
        );
        Ok(request)
    }

    /// 接受外部机构上传（无认证，令牌即凭证）
    ///
    /// 文件先写入存储，再以单次原子 check-and-set 消费令牌并落库影像
    /// 记录；兑换失败时清理孤儿文件。并发兑换同一令牌恰有一个成功。
    pub async fn accept_upload(
        &self,
        upload_token: &str,
        file: UploadedFile,
        case_id: Option<Uuid>,
    ) -> Result<MedicalImage> {
        if !token::is_well_formed(upload_token) {
            return Err(SecondOpError::InvalidToken);
        }
        if file.bytes.is_empty() {
            return Err(SecondOpError::Validation("file is required".to_string()));
        }

        let checksum = StorageManager::checksum(&file.bytes);
        let storage_ref = self.storage.store_file(&file.bytes).await?;

        let upload = NewUpload {
            storage_ref: storage_ref.clone(),
            file_name: file.file_name,
            content_type: file.content_type,
            file_size: file.bytes.len() as i64,
            checksum,
            case_id,
        };

        // 兑换不成功（令牌被拒或存储报错）都要清理已写入的孤儿文件
        let digest = token::digest_of(upload_token);
        let image = match self
            .store
            .consume_token_and_store_image(&digest, upload)
            .await
        {
            Ok(Some(image)) => image,
            Ok(None) => {
                self.discard_orphan(&storage_ref).await;
                return Err(SecondOpError::InvalidToken);
            }
            Err(e) => {
                self.discard_orphan(&storage_ref).await;
                return Err(e);
            }
        };

        info!(
            "Upload accepted for request {} ({} bytes)",
            image.request_id, image.file_size
        );
        Ok(image)
    }

    async fn discard_orphan(&self, storage_ref: &str) {
        if let Err(e) = self.storage.delete_file(storage_ref).await {
            warn!("Failed to clean up orphan upload {}: {}", storage_ref, e);
        }
    }
}
