//! # SecondOp Core
//!
//! 第二诊疗意见平台的核心模块，提供基础数据结构、错误定义和通用工具。

pub mod error;
pub mod models;
pub mod utils;

pub use error::{Result, SecondOpError};
pub use models::*;
