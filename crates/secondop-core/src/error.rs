//! 错误定义模块

use thiserror::Error;

/// 平台统一错误类型
#[derive(Error, Debug)]
pub enum SecondOpError {
    #[error("未认证: {0}")]
    Unauthenticated(String),

    #[error("无权限: {0}")]
    Forbidden(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("指派目标不是医生: {0}")]
    InvalidAssignee(String),

    // 未知、已消费和格式错误的令牌统一为同一错误，不向调用方泄露区别
    #[error("无效的上传令牌")]
    InvalidToken,

    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 平台统一结果类型
pub type Result<T> = std::result::Result<T, SecondOpError>;
