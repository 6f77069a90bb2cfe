//! 病例服务
//!
//! 管理员对病例的医生指派与状态管理。所有校验在任何持久化写入之前
//! 完成；写入本身是单条条件更新，失败不重试。

use crate::state_machine::CaseStateMachine;
use secondop_core::{Case, CaseStatus, Result, SecondOpError, UserRole};
use secondop_database::PlatformStore;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// 病例服务
pub struct CaseService {
    store: Arc<dyn PlatformStore>,
    machine: CaseStateMachine,
}

impl CaseService {
    pub fn new(store: Arc<dyn PlatformStore>) -> Self {
        Self {
            store,
            machine: CaseStateMachine::new(),
        }
    }

    /// 指派医生
    ///
    /// 目标用户必须存在且角色为 DOCTOR；病例状态被强制为 ASSIGNED。
    /// 重复指派直接覆盖既有医生。
    pub async fn assign(&self, case_id: Uuid, doctor_id: Uuid) -> Result<Case> {
        let doctor = self
            .store
            .get_user(doctor_id)
            .await?
            .ok_or_else(|| SecondOpError::NotFound(format!("Doctor {} not found", doctor_id)))?;

        if doctor.role != UserRole::Doctor {
            return Err(SecondOpError::InvalidAssignee(format!(
                "User {} has role {}",
                doctor_id,
                doctor.role.as_str()
            )));
        }

        let case = self
            .store
            .assign_case(case_id, doctor_id)
            .await?
            .ok_or_else(|| SecondOpError::NotFound(format!("Case {} not found", case_id)))?;

        info!("Assigned case {} to doctor {}", case_id, doctor_id);
        Ok(case)
    }

    /// 设置病例状态
    ///
    /// 只接受五个可设置状态；非规范跳转不被拒绝但会记录告警。
    /// completed_at 由存储层在同一条更新内条件写入。
    pub async fn set_status(&self, case_id: Uuid, status: CaseStatus) -> Result<Case> {
        if !status.is_settable() {
            return Err(SecondOpError::Validation(format!(
                "Status {} cannot be set directly",
                status.as_str()
            )));
        }

        let current = self
            .store
            .get_case(case_id)
            .await?
            .ok_or_else(|| SecondOpError::NotFound(format!("Case {} not found", case_id)))?;

        if !self.machine.can_transition(current.status, status) {
            warn!(
                "Non-canonical status jump on case {}: {} -> {}",
                case_id,
                current.status.as_str(),
                status.as_str()
            );
        }

        let case = self
            .store
            .set_case_status(case_id, status)
            .await?
            .ok_or_else(|| SecondOpError::NotFound(format!("Case {} not found", case_id)))?;

        info!(
            "Case {} status changed: {} -> {}",
            case_id,
            current.status.as_str(),
            case.status.as_str()
        );
        Ok(case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use secondop_core::User;
    use secondop_database::MemoryStore;

    async fn seed_user(store: &MemoryStore, role: UserRole) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: format!("{}@secondop.example", Uuid::new_v4()),
            name: "Test User".to_string(),
            role,
            is_active: true,
            created_at: Utc::now(),
        };
        store.create_user(&user).await.unwrap();
        user
    }

    async fn seed_case(store: &MemoryStore, patient_id: Uuid) -> Case {
        let case = Case {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id: None,
            title: "Second opinion on biopsy".to_string(),
            status: CaseStatus::Submitted,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        };
        store.create_case(&case).await.unwrap();
        case
    }

    fn service(store: &MemoryStore) -> CaseService {
        CaseService::new(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_assign_success() {
        let store = MemoryStore::new();
        let patient = seed_user(&store, UserRole::Patient).await;
        let doctor = seed_user(&store, UserRole::Doctor).await;
        let case = seed_case(&store, patient.id).await;

        let updated = service(&store).assign(case.id, doctor.id).await.unwrap();
        assert_eq!(updated.status, CaseStatus::Assigned);
        assert_eq!(updated.doctor_id, Some(doctor.id));
    }

    #[tokio::test]
    async fn test_assign_rejects_non_doctor() {
        let store = MemoryStore::new();
        let patient = seed_user(&store, UserRole::Patient).await;
        let other_patient = seed_user(&store, UserRole::Patient).await;
        let case = seed_case(&store, patient.id).await;

        let result = service(&store).assign(case.id, other_patient.id).await;
        assert!(matches!(result, Err(SecondOpError::InvalidAssignee(_))));

        // 失败路径不得产生任何写入
        let unchanged = store.get_case(case.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, CaseStatus::Submitted);
        assert_eq!(unchanged.doctor_id, None);
    }

    #[tokio::test]
    async fn test_assign_unknown_doctor() {
        let store = MemoryStore::new();
        let patient = seed_user(&store, UserRole::Patient).await;
        let case = seed_case(&store, patient.id).await;

        let result = service(&store).assign(case.id, Uuid::new_v4()).await;
        assert!(matches!(result, Err(SecondOpError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_assign_unknown_case() {
        let store = MemoryStore::new();
        let doctor = seed_user(&store, UserRole::Doctor).await;

        let result = service(&store).assign(Uuid::new_v4(), doctor.id).await;
        assert!(matches!(result, Err(SecondOpError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_status_completed_sets_timestamp() {
        let store = MemoryStore::new();
        let patient = seed_user(&store, UserRole::Patient).await;
        let case = seed_case(&store, patient.id).await;
        let svc = service(&store);

        let completed = svc.set_status(case.id, CaseStatus::Completed).await.unwrap();
        assert!(completed.completed_at.is_some());

        // 回退到 PENDING 保留既有完成时间
        let reopened = svc.set_status(case.id, CaseStatus::Pending).await.unwrap();
        assert_eq!(reopened.status, CaseStatus::Pending);
        assert_eq!(reopened.completed_at, completed.completed_at);
    }

    #[tokio::test]
    async fn test_set_status_rejects_non_settable() {
        let store = MemoryStore::new();
        let patient = seed_user(&store, UserRole::Patient).await;
        let case = seed_case(&store, patient.id).await;

        let result = service(&store).set_status(case.id, CaseStatus::Draft).await;
        assert!(matches!(result, Err(SecondOpError::Validation(_))));
    }

    #[tokio::test]
    async fn test_set_status_unknown_case() {
        let store = MemoryStore::new();
        let result = service(&store)
            .set_status(Uuid::new_v4(), CaseStatus::Pending)
            .await;
        assert!(matches!(result, Err(SecondOpError::NotFound(_))));
    }
}
