//! # SecondOp 工作流模块
//!
//! 病例生命周期与安全影像交换的核心逻辑，包括：
//! - 病例状态机：规范状态转换表与终态判定
//! - 病例服务：医生指派与状态管理（管理员操作）
//! - 上传令牌编解码：一次性、不可猜测的外部上传凭证
//! - 影像交换工作流：患者发起请求、外部机构免认证上传

pub mod cases;
pub mod exchange;
pub mod state_machine;
pub mod token;

// 重新导出主要类型
pub use cases::CaseService;
pub use exchange::{FacilityNotifier, ImageExchange, LogOnlyNotifier, NewImageRequest, UploadedFile};
pub use state_machine::CaseStateMachine;
pub use token::IssuedToken;
