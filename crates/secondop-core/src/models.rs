//! 核心数据模型定义

use crate::error::SecondOpError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// 用户角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// 患者 - 发起病例和影像请求
    Patient,
    /// 医生 - 承接病例给出第二意见
    Doctor,
    /// 管理员 - 病例指派和状态管理
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Patient => "PATIENT",
            UserRole::Doctor => "DOCTOR",
            UserRole::Admin => "ADMIN",
        }
    }
}

impl FromStr for UserRole {
    type Err = SecondOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PATIENT" => Ok(UserRole::Patient),
            "DOCTOR" => Ok(UserRole::Doctor),
            "ADMIN" => Ok(UserRole::Admin),
            other => Err(SecondOpError::Validation(format!(
                "Unknown user role: {}",
                other
            ))),
        }
    }
}

/// 用户信息（认证主体）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// 病例状态
///
/// 生命周期：DRAFT → SUBMITTED → PENDING → ASSIGNED → IN_PROGRESS → COMPLETED，
/// CANCELLED 可从任意非终态进入。COMPLETED 和 CANCELLED 为终态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Draft,
    Submitted,
    Pending,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Draft => "DRAFT",
            CaseStatus::Submitted => "SUBMITTED",
            CaseStatus::Pending => "PENDING",
            CaseStatus::Assigned => "ASSIGNED",
            CaseStatus::InProgress => "IN_PROGRESS",
            CaseStatus::Completed => "COMPLETED",
            CaseStatus::Cancelled => "CANCELLED",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Completed | CaseStatus::Cancelled)
    }

    /// 是否为管理员可直接设置的状态
    ///
    /// DRAFT 和 SUBMITTED 只能由病例创建流程产生，不接受状态接口写入。
    pub fn is_settable(&self) -> bool {
        matches!(
            self,
            CaseStatus::Pending
                | CaseStatus::Assigned
                | CaseStatus::InProgress
                | CaseStatus::Completed
                | CaseStatus::Cancelled
        )
    }
}

impl FromStr for CaseStatus {
    type Err = SecondOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(CaseStatus::Draft),
            "SUBMITTED" => Ok(CaseStatus::Submitted),
            "PENDING" => Ok(CaseStatus::Pending),
            "ASSIGNED" => Ok(CaseStatus::Assigned),
            "IN_PROGRESS" => Ok(CaseStatus::InProgress),
            "COMPLETED" => Ok(CaseStatus::Completed),
            "CANCELLED" => Ok(CaseStatus::Cancelled),
            other => Err(SecondOpError::Validation(format!(
                "Unknown case status: {}",
                other
            ))),
        }
    }
}

/// 病例（第二诊疗意见请求）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub title: String,
    pub status: CaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// 影像请求状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageRequestStatus {
    /// 等待外部机构上传
    Pending,
    /// 令牌已被一次成功上传消费
    Used,
}

impl ImageRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageRequestStatus::Pending => "PENDING",
            ImageRequestStatus::Used => "USED",
        }
    }
}

impl FromStr for ImageRequestStatus {
    type Err = SecondOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ImageRequestStatus::Pending),
            "USED" => Ok(ImageRequestStatus::Used),
            other => Err(SecondOpError::Validation(format!(
                "Unknown image request status: {}",
                other
            ))),
        }
    }
}

/// 影像请求（向外部影像机构发出的一次性上传邀请）
///
/// `token_digest` 只保存上传令牌的摘要，且永远不会被序列化进任何响应体。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequest {
    pub id: Uuid,
    pub case_id: Uuid,
    pub patient_id: Uuid,
    pub facility_name: String,
    pub facility_email: String,
    pub facility_phone: Option<String>,
    pub image_type: String,
    pub study_date: Option<chrono::NaiveDate>,
    pub notes: Option<String>,
    #[serde(skip_serializing, default)]
    pub token_digest: String,
    pub status: ImageRequestStatus,
    pub created_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

/// 医学影像（一次成功令牌兑换产生的上传件，创建后不可变）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalImage {
    pub id: Uuid,
    pub request_id: Uuid,
    pub patient_id: Uuid,
    pub case_id: Option<Uuid>,
    pub storage_ref: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub file_size: i64,
    pub checksum: String,
    pub uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_status_roundtrip() {
        for status in [
            CaseStatus::Draft,
            CaseStatus::Submitted,
            CaseStatus::Pending,
            CaseStatus::Assigned,
            CaseStatus::InProgress,
            CaseStatus::Completed,
            CaseStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<CaseStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_case_status_rejects_unknown() {
        assert!("DONE".parse::<CaseStatus>().is_err());
        assert!("in_progress".parse::<CaseStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(CaseStatus::Completed.is_terminal());
        assert!(CaseStatus::Cancelled.is_terminal());
        assert!(!CaseStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_settable_states() {
        assert!(!CaseStatus::Draft.is_settable());
        assert!(!CaseStatus::Submitted.is_settable());
        assert!(CaseStatus::Pending.is_settable());
        assert!(CaseStatus::Cancelled.is_settable());
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&CaseStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }

    #[test]
    fn test_token_digest_never_serialized() {
        let request = ImageRequest {
            id: Uuid::new_v4(),
            case_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            facility_name: "General Hospital".to_string(),
            facility_email: "lab@hospital.example".to_string(),
            facility_phone: None,
            image_type: "MRI".to_string(),
            study_date: None,
            notes: None,
            token_digest: "super-secret-digest".to_string(),
            status: ImageRequestStatus::Pending,
            created_at: Utc::now(),
            consumed_at: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("super-secret-digest"));
        assert!(!json.contains("token_digest"));
    }
}
