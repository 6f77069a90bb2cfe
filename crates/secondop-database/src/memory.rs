//! 内存存储实现
//!
//! 实现与 PostgreSQL 相同的 `PlatformStore` 接口，用作测试替身和演示
//! 模式的存储。令牌兑换在写锁临界区内完成 check-and-set，与数据库实现
//! 的条件更新具有相同的并发语义。

use crate::store::{NewUpload, PlatformStore};
use async_trait::async_trait;
use chrono::Utc;
use secondop_core::{
    Case, CaseStatus, ImageRequest, ImageRequestStatus, MedicalImage, Result, User,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryInner {
    users: HashMap<Uuid, User>,
    cases: HashMap<Uuid, Case>,
    image_requests: HashMap<Uuid, ImageRequest>,
    images: HashMap<Uuid, MedicalImage>,
}

/// 内存存储
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlatformStore for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let inner = self.inner.read().await;
        let mut users: Vec<User> = inner.users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> Result<Option<User>> {
        let mut inner = self.inner.write().await;
        Ok(inner.users.get_mut(&id).map(|user| {
            user.is_active = is_active;
            user.clone()
        }))
    }

    async fn create_case(&self, case: &Case) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.cases.insert(case.id, case.clone());
        Ok(())
    }

    async fn get_case(&self, id: Uuid) -> Result<Option<Case>> {
        let inner = self.inner.read().await;
        Ok(inner.cases.get(&id).cloned())
    }

    async fn assign_case(&self, case_id: Uuid, doctor_id: Uuid) -> Result<Option<Case>> {
        let mut inner = self.inner.write().await;
        Ok(inner.cases.get_mut(&case_id).map(|case| {
            case.doctor_id = Some(doctor_id);
            case.status = CaseStatus::Assigned;
            case.updated_at = Utc::now();
            case.clone()
        }))
    }

    async fn set_case_status(&self, case_id: Uuid, status: CaseStatus) -> Result<Option<Case>> {
        let mut inner = self.inner.write().await;
        Ok(inner.cases.get_mut(&case_id).map(|case| {
            let now = Utc::now();
            case.status = status;
            if status == CaseStatus::Completed {
                case.completed_at = Some(now);
            }
            case.updated_at = now;
            case.clone()
        }))
    }

    async fn create_image_request(&self, request: &ImageRequest) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.image_requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_image_request(&self, id: Uuid) -> Result<Option<ImageRequest>> {
        let inner = self.inner.read().await;
        Ok(inner.image_requests.get(&id).cloned())
    }

    async fn consume_token_and_store_image(
        &self,
        token_digest: &str,
        upload: NewUpload,
    ) -> Result<Option<MedicalImage>> {
        // 整个兑换在同一把写锁下完成，消费标记与影像落库要么都发生要么都不发生
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let request = match inner.image_requests.values_mut().find(|r| {
            r.token_digest == token_digest && r.status == ImageRequestStatus::Pending
        }) {
            Some(request) => request,
            None => return Ok(None),
        };

        let now = Utc::now();
        request.status = ImageRequestStatus::Used;
        request.consumed_at = Some(now);

        let image = MedicalImage {
            id: Uuid::new_v4(),
            request_id: request.id,
            patient_id: request.patient_id,
            case_id: upload.case_id.or(Some(request.case_id)),
            storage_ref: upload.storage_ref,
            file_name: upload.file_name,
            content_type: upload.content_type,
            file_size: upload.file_size,
            checksum: upload.checksum,
            uploaded_at: now,
        };

        inner.images.insert(image.id, image.clone());
        Ok(Some(image))
    }

    async fn list_images_for_case(&self, case_id: Uuid) -> Result<Vec<MedicalImage>> {
        let inner = self.inner.read().await;
        let mut images: Vec<MedicalImage> = inner
            .images
            .values()
            .filter(|img| img.case_id == Some(case_id))
            .cloned()
            .collect();
        images.sort_by_key(|img| img.uploaded_at);
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secondop_core::UserRole;

    fn sample_user(role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            email: format!("{}@secondop.example", role.as_str().to_lowercase()),
            name: "Test User".to_string(),
            role,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn sample_case(patient_id: Uuid) -> Case {
        Case {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id: None,
            title: "Second opinion on MRI findings".to_string(),
            status: CaseStatus::Submitted,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }

    fn sample_request(case_id: Uuid, patient_id: Uuid, digest: &str) -> ImageRequest {
        ImageRequest {
            id: Uuid::new_v4(),
            case_id,
            patient_id,
            facility_name: "General Hospital".to_string(),
            facility_email: "lab@hospital.example".to_string(),
            facility_phone: None,
            image_type: "MRI".to_string(),
            study_date: None,
            notes: None,
            token_digest: digest.to_string(),
            status: ImageRequestStatus::Pending,
            created_at: Utc::now(),
            consumed_at: None,
        }
    }

    fn sample_upload() -> NewUpload {
        NewUpload {
            storage_ref: "images/test.bin".to_string(),
            file_name: "scan.dcm".to_string(),
            content_type: Some("application/octet-stream".to_string()),
            file_size: 42,
            checksum: "abc".to_string(),
            case_id: None,
        }
    }

    #[tokio::test]
    async fn test_consume_token_exactly_once() {
        let store = MemoryStore::new();
        let patient = sample_user(UserRole::Patient);
        let case = sample_case(patient.id);
        store.create_user(&patient).await.unwrap();
        store.create_case(&case).await.unwrap();
        store
            .create_image_request(&sample_request(case.id, patient.id, "digest-1"))
            .await
            .unwrap();

        let first = store
            .consume_token_and_store_image("digest-1", sample_upload())
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .consume_token_and_store_image("digest-1", sample_upload())
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_consume_unknown_token() {
        let store = MemoryStore::new();
        let result = store
            .consume_token_and_store_image("no-such-digest", sample_upload())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_redemption_single_winner() {
        let store = MemoryStore::new();
        let patient = sample_user(UserRole::Patient);
        let case = sample_case(patient.id);
        store.create_user(&patient).await.unwrap();
        store.create_case(&case).await.unwrap();
        store
            .create_image_request(&sample_request(case.id, patient.id, "digest-race"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .consume_token_and_store_image("digest-race", sample_upload())
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_set_status_keeps_completed_at() {
        let store = MemoryStore::new();
        let patient = sample_user(UserRole::Patient);
        let case = sample_case(patient.id);
        store.create_user(&patient).await.unwrap();
        store.create_case(&case).await.unwrap();

        let completed = store
            .set_case_status(case.id, CaseStatus::Completed)
            .await
            .unwrap()
            .unwrap();
        let completed_at = completed.completed_at.unwrap();

        // 状态回退不清除 completed_at
        let reopened = store
            .set_case_status(case.id, CaseStatus::Pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reopened.status, CaseStatus::Pending);
        assert_eq!(reopened.completed_at, Some(completed_at));
    }

    #[tokio::test]
    async fn test_assign_overwrites_doctor() {
        let store = MemoryStore::new();
        let patient = sample_user(UserRole::Patient);
        let case = sample_case(patient.id);
        store.create_user(&patient).await.unwrap();
        store.create_case(&case).await.unwrap();

        let first_doctor = Uuid::new_v4();
        let second_doctor = Uuid::new_v4();

        store.assign_case(case.id, first_doctor).await.unwrap();
        let updated = store
            .assign_case(case.id, second_doctor)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.doctor_id, Some(second_doctor));
        assert_eq!(updated.status, CaseStatus::Assigned);
    }
}
