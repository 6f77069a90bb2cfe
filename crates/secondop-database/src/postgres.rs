//! PostgreSQL 存储实现

use crate::connection::DatabasePool;
use crate::store::{NewUpload, PlatformStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secondop_core::{
    Case, CaseStatus, ImageRequest, MedicalImage, Result, SecondOpError, User,
};
use uuid::Uuid;

/// PostgreSQL 存储
pub struct PgStore {
    pool: DatabasePool,
}

impl PgStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 创建用户表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                email VARCHAR(255) UNIQUE NOT NULL,
                name VARCHAR(255) NOT NULL,
                role VARCHAR(16) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| SecondOpError::Database(e.to_string()))?;

        // 创建病例表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS cases (
                id UUID PRIMARY KEY,
                patient_id UUID NOT NULL REFERENCES users(id),
                doctor_id UUID REFERENCES users(id),
                title VARCHAR(255) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'DRAFT',
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                completed_at TIMESTAMP WITH TIME ZONE
            )
        "#).execute(pool).await.map_err(|e| SecondOpError::Database(e.to_string()))?;

        // 创建影像请求表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS image_requests (
                id UUID PRIMARY KEY,
                case_id UUID NOT NULL REFERENCES cases(id),
                patient_id UUID NOT NULL REFERENCES users(id),
                facility_name VARCHAR(255) NOT NULL,
                facility_email VARCHAR(255) NOT NULL,
                facility_phone VARCHAR(64),
                image_type VARCHAR(64) NOT NULL,
                study_date DATE,
                notes TEXT,
                token_digest VARCHAR(64) UNIQUE NOT NULL,
                status VARCHAR(10) NOT NULL DEFAULT 'PENDING',
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                consumed_at TIMESTAMP WITH TIME ZONE
            )
        "#).execute(pool).await.map_err(|e| SecondOpError::Database(e.to_string()))?;

        // 创建医学影像表（病例删除不得级联清除影像证据，故不设级联）
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS medical_images (
                id UUID PRIMARY KEY,
                request_id UUID NOT NULL REFERENCES image_requests(id),
                patient_id UUID NOT NULL REFERENCES users(id),
                case_id UUID,
                storage_ref VARCHAR(512) NOT NULL,
                file_name VARCHAR(255) NOT NULL,
                content_type VARCHAR(128),
                file_size BIGINT NOT NULL,
                checksum VARCHAR(64) NOT NULL,
                uploaded_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| SecondOpError::Database(e.to_string()))?;

        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)",
            "CREATE INDEX IF NOT EXISTS idx_cases_patient_id ON cases(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_cases_doctor_id ON cases(doctor_id)",
            "CREATE INDEX IF NOT EXISTS idx_cases_status ON cases(status)",
            "CREATE INDEX IF NOT EXISTS idx_image_requests_case_id ON image_requests(case_id)",
            "CREATE INDEX IF NOT EXISTS idx_image_requests_token_digest ON image_requests(token_digest)",
            "CREATE INDEX IF NOT EXISTS idx_medical_images_request_id ON medical_images(request_id)",
            "CREATE INDEX IF NOT EXISTS idx_medical_images_case_id ON medical_images(case_id)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(|e| SecondOpError::Database(e.to_string()))?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }
}

#[async_trait]
impl PlatformStore for PgStore {
    async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO users (id, email, name, role, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#)
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.created_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| SecondOpError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let result = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| SecondOpError::Database(e.to_string()))?;

        result.map(User::try_from).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let results = sqlx::query_as::<_, DbUser>("SELECT * FROM users ORDER BY created_at")
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| SecondOpError::Database(e.to_string()))?;

        results.into_iter().map(User::try_from).collect()
    }

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> Result<Option<User>> {
        let result = sqlx::query_as::<_, DbUser>(
            "UPDATE users SET is_active = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(is_active)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| SecondOpError::Database(e.to_string()))?;

        result.map(User::try_from).transpose()
    }

    async fn create_case(&self, case: &Case) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO cases (id, patient_id, doctor_id, title, status, created_at, updated_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#)
        .bind(case.id)
        .bind(case.patient_id)
        .bind(case.doctor_id)
        .bind(&case.title)
        .bind(case.status.as_str())
        .bind(case.created_at)
        .bind(case.updated_at)
        .bind(case.completed_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| SecondOpError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_case(&self, id: Uuid) -> Result<Option<Case>> {
        let result = sqlx::query_as::<_, DbCase>("SELECT * FROM cases WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| SecondOpError::Database(e.to_string()))?;

        result.map(Case::try_from).transpose()
    }

    async fn assign_case(&self, case_id: Uuid, doctor_id: Uuid) -> Result<Option<Case>> {
        let result = sqlx::query_as::<_, DbCase>(r#"
            UPDATE cases
            SET doctor_id = $2, status = 'ASSIGNED', updated_at = NOW()
            WHERE id = $1
            RETURNING *
        "#)
        .bind(case_id)
        .bind(doctor_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| SecondOpError::Database(e.to_string()))?;

        result.map(Case::try_from).transpose()
    }

    async fn set_case_status(&self, case_id: Uuid, status: CaseStatus) -> Result<Option<Case>> {
        // completed_at 在同一条语句内条件计算，避免读改写竞态
        let result = sqlx::query_as::<_, DbCase>(r#"
            UPDATE cases
            SET status = $2,
                completed_at = CASE WHEN $2 = 'COMPLETED' THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
        "#)
        .bind(case_id)
        .bind(status.as_str())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| SecondOpError::Database(e.to_string()))?;

        result.map(Case::try_from).transpose()
    }

    async fn create_image_request(&self, request: &ImageRequest) -> Result<()> {
        sqlx::query(r#"
            INSERT INTO image_requests
                (id, case_id, patient_id, facility_name, facility_email, facility_phone,
                 image_type, study_date, notes, token_digest, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#)
        .bind(request.id)
        .bind(request.case_id)
        .bind(request.patient_id)
        .bind(&request.facility_name)
        .bind(&request.facility_email)
        .bind(&request.facility_phone)
        .bind(&request.image_type)
        .bind(request.study_date)
        .bind(&request.notes)
        .bind(&request.token_digest)
        .bind(request.status.as_str())
        .bind(request.created_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| SecondOpError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get_image_request(&self, id: Uuid) -> Result<Option<ImageRequest>> {
        let result =
            sqlx::query_as::<_, DbImageRequest>("SELECT * FROM image_requests WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.pool())
                .await
                .map_err(|e| SecondOpError::Database(e.to_string()))?;

        result.map(ImageRequest::try_from).transpose()
    }

    async fn consume_token_and_store_image(
        &self,
        token_digest: &str,
        upload: NewUpload,
    ) -> Result<Option<MedicalImage>> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| SecondOpError::Database(e.to_string()))?;

        // check-and-set：只有仍为 PENDING 的请求行会被标记消费，
        // 并发兑换同一令牌时恰好一行被更新
        let consumed = sqlx::query_as::<_, DbConsumedRequest>(r#"
            UPDATE image_requests
            SET status = 'USED', consumed_at = NOW()
            WHERE token_digest = $1 AND status = 'PENDING'
            RETURNING id, patient_id, case_id, consumed_at
        "#)
        .bind(token_digest)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| SecondOpError::Database(e.to_string()))?;

        let consumed = match consumed {
            Some(row) => row,
            None => return Ok(None),
        };

        let image = MedicalImage {
            id: Uuid::new_v4(),
            request_id: consumed.id,
            patient_id: consumed.patient_id,
            case_id: upload.case_id.or(Some(consumed.case_id)),
            storage_ref: upload.storage_ref,
            file_name: upload.file_name,
            content_type: upload.content_type,
            file_size: upload.file_size,
            checksum: upload.checksum,
            uploaded_at: consumed.consumed_at.unwrap_or_else(Utc::now),
        };

        sqlx::query(r#"
            INSERT INTO medical_images
                (id, request_id, patient_id, case_id, storage_ref, file_name,
                 content_type, file_size, checksum, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#)
        .bind(image.id)
        .bind(image.request_id)
        .bind(image.patient_id)
        .bind(image.case_id)
        .bind(&image.storage_ref)
        .bind(&image.file_name)
        .bind(&image.content_type)
        .bind(image.file_size)
        .bind(&image.checksum)
        .bind(image.uploaded_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| SecondOpError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| SecondOpError::Database(e.to_string()))?;

        Ok(Some(image))
    }

    async fn list_images_for_case(&self, case_id: Uuid) -> Result<Vec<MedicalImage>> {
        let results = sqlx::query_as::<_, DbMedicalImage>(
            "SELECT * FROM medical_images WHERE case_id = $1 ORDER BY uploaded_at",
        )
        .bind(case_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| SecondOpError::Database(e.to_string()))?;

        results.into_iter().map(MedicalImage::try_from).collect()
    }
}

// ========== 数据库行映射 ==========

#[derive(sqlx::FromRow)]
struct DbUser {
    id: Uuid,
    email: String,
    name: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<DbUser> for User {
    type Error = SecondOpError;

    fn try_from(row: DbUser) -> Result<Self> {
        Ok(User {
            id: row.id,
            email: row.email,
            name: row.name,
            role: row
                .role
                .parse()
                .map_err(|_| SecondOpError::Database(format!("Bad role value: {}", row.role)))?,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DbCase {
    id: Uuid,
    patient_id: Uuid,
    doctor_id: Option<Uuid>,
    title: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbCase> for Case {
    type Error = SecondOpError;

    fn try_from(row: DbCase) -> Result<Self> {
        Ok(Case {
            id: row.id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            title: row.title,
            status: row
                .status
                .parse()
                .map_err(|_| SecondOpError::Database(format!("Bad status value: {}", row.status)))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DbImageRequest {
    id: Uuid,
    case_id: Uuid,
    patient_id: Uuid,
    facility_name: String,
    facility_email: String,
    facility_phone: Option<String>,
    image_type: String,
    study_date: Option<chrono::NaiveDate>,
    notes: Option<String>,
    token_digest: String,
    status: String,
    created_at: DateTime<Utc>,
    consumed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbImageRequest> for ImageRequest {
    type Error = SecondOpError;

    fn try_from(row: DbImageRequest) -> Result<Self> {
        Ok(ImageRequest {
            id: row.id,
            case_id: row.case_id,
            patient_id: row.patient_id,
            facility_name: row.facility_name,
            facility_email: row.facility_email,
            facility_phone: row.facility_phone,
            image_type: row.image_type,
            study_date: row.study_date,
            notes: row.notes,
            token_digest: row.token_digest,
            status: row
                .status
                .parse()
                .map_err(|_| SecondOpError::Database(format!("Bad status value: {}", row.status)))?,
            created_at: row.created_at,
            consumed_at: row.consumed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DbConsumedRequest {
    id: Uuid,
    patient_id: Uuid,
    case_id: Uuid,
    consumed_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct DbMedicalImage {
    id: Uuid,
    request_id: Uuid,
    patient_id: Uuid,
    case_id: Option<Uuid>,
    storage_ref: String,
    file_name: String,
    content_type: Option<String>,
    file_size: i64,
    checksum: String,
    uploaded_at: DateTime<Utc>,
}

impl TryFrom<DbMedicalImage> for MedicalImage {
    type Error = SecondOpError;

    fn try_from(row: DbMedicalImage) -> Result<Self> {
        Ok(MedicalImage {
            id: row.id,
            request_id: row.request_id,
            patient_id: row.patient_id,
            case_id: row.case_id,
            storage_ref: row.storage_ref,
            file_name: row.file_name,
            content_type: row.content_type,
            file_size: row.file_size,
            checksum: row.checksum,
            uploaded_at: row.uploaded_at,
        })
    }
}
