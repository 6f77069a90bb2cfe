//! 影像文件存储管理

use secondop_core::{Result, SecondOpError};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// 存储管理器
pub struct StorageManager {
    base_path: PathBuf,
}

impl StorageManager {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// 存储上传文件，返回相对存储引用
    pub async fn store_file(&self, data: &[u8]) -> Result<String> {
        let storage_ref = format!("images/{}.bin", Uuid::new_v4());
        let full_path = self.base_path.join(&storage_ref);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&full_path, data).await?;
        tracing::debug!("Stored {} bytes at {}", data.len(), storage_ref);
        Ok(storage_ref)
    }

    /// 读取文件
    pub async fn get_file(&self, storage_ref: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve(storage_ref)?;
        let data = tokio::fs::read(full_path).await?;
        Ok(data)
    }

    /// 删除文件（用于兑换失败后的孤儿件清理）
    pub async fn delete_file(&self, storage_ref: &str) -> Result<()> {
        let full_path = self.resolve(storage_ref)?;
        tokio::fs::remove_file(full_path).await?;
        Ok(())
    }

    /// 计算文件内容的 SHA-256 校验和
    pub fn checksum(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    fn resolve(&self, storage_ref: &str) -> Result<PathBuf> {
        // 存储引用必须是纯相对路径，不允许逃逸出根目录
        let rel = Path::new(storage_ref);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(SecondOpError::Storage(format!(
                "Illegal storage ref: {}",
                storage_ref
            )));
        }
        Ok(self.base_path.join(rel))
    }
}
