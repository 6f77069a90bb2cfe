//! SecondOp服务器主程序

mod config;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use secondop_core::{Case, CaseStatus, User, UserRole};
use secondop_database::{DatabasePool, MemoryStore, PgStore, PlatformStore};
use secondop_storage::StorageManager;
use secondop_web::{AppState, AuthService, WebServer};
use secondop_workflow::{CaseService, ImageExchange, LogOnlyNotifier};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// SecondOp服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "secondop-server")]
#[command(about = "医疗第二诊疗意见平台服务器")]
struct Args {
    /// 服务器端口（覆盖配置文件）
    #[arg(short, long)]
    port: Option<u16>,

    /// 数据库连接字符串（覆盖配置文件）
    #[arg(short, long)]
    database_url: Option<String>,

    /// 上传文件存储目录（覆盖配置文件）
    #[arg(short, long)]
    storage_dir: Option<String>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 演示模式：使用内存存储并预置演示账号
    #[arg(long)]
    demo: bool,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(args.log_level.as_str())
        .init();

    info!("启动SecondOp服务器...");

    let mut app_config = config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        app_config.server.port = port;
    }
    if let Some(database_url) = args.database_url {
        app_config.database.url = Some(database_url);
    }
    if let Some(storage_dir) = args.storage_dir {
        app_config.storage.root_path = storage_dir;
    }

    info!("SecondOp服务器配置:");
    info!("  监听地址: {}:{}", app_config.server.host, app_config.server.port);
    info!("  存储目录: {}", app_config.storage.root_path);

    // 选择存储实现
    let store: Arc<dyn PlatformStore> = if args.demo || app_config.database.url.is_none() {
        info!("  存储后端: in-memory (demo mode)");
        Arc::new(MemoryStore::new())
    } else {
        let url = app_config.database.url.as_deref().unwrap_or_default();
        let pool = DatabasePool::new(url, app_config.database.max_connections).await?;
        let pg_store = PgStore::new(pool);
        pg_store.create_tables().await?;
        info!("  存储后端: postgresql");
        Arc::new(pg_store)
    };

    let auth = Arc::new(AuthService::new(store.clone()));

    if args.demo || app_config.database.url.is_none() {
        seed_demo_data(store.as_ref(), &auth).await?;
    }

    let state = AppState {
        auth,
        cases: Arc::new(CaseService::new(store.clone())),
        exchange: Arc::new(ImageExchange::new(
            store.clone(),
            Arc::new(StorageManager::new(app_config.storage.root_path.clone())),
            Arc::new(LogOnlyNotifier),
        )),
        store,
    };

    let addr: SocketAddr = format!("{}:{}", app_config.server.host, app_config.server.port)
        .parse()?;
    WebServer::new(addr, state).run().await?;

    Ok(())
}

/// 预置演示账号与示例病例，并为每个账号开启会话
async fn seed_demo_data(store: &dyn PlatformStore, auth: &AuthService) -> Result<()> {
    let roles = [
        ("admin@secondop.local", "System Administrator", UserRole::Admin),
        ("doctor@secondop.local", "Dr. Reviewer", UserRole::Doctor),
        ("patient@secondop.local", "Demo Patient", UserRole::Patient),
    ];

    let mut patient_id = None;
    for (email, name, role) in roles {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            role,
            is_active: true,
            created_at: Utc::now(),
        };
        store.create_user(&user).await?;
        if role == UserRole::Patient {
            patient_id = Some(user.id);
        }

        let session = auth.open_session(user.id).await;
        // 会话令牌仅在演示模式打印，供本地调用使用
        info!("Demo session for {} ({}): {}", email, role.as_str(), session);
    }

    if let Some(patient_id) = patient_id {
        let case = Case {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id: None,
            title: "Demo case: second opinion on MRI findings".to_string(),
            status: CaseStatus::Submitted,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        };
        store.create_case(&case).await?;
        info!("Demo case created: {}", case.id);
    }

    Ok(())
}
