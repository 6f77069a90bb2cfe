//! # SecondOp Storage
//!
//! 上传影像文件的本地存储管理。

pub mod storage;

pub use storage::StorageManager;
