//! # SecondOp Web
//!
//! HTTP 层：主体解析中间件、授权守卫、请求处理器与路由。

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::{AuthService, CurrentUser};
pub use server::{AppState, WebServer};
