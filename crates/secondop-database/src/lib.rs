//! # SecondOp Database
//!
//! 持久化层：显式注入的存储接口（`PlatformStore`）、PostgreSQL 实现
//! 以及用于测试和演示模式的内存实现。

pub mod connection;
pub mod memory;
pub mod postgres;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{NewUpload, PlatformStore};
