//! Catalog Server - 商品目录服务
//!
//! # 架构概述
//!
//! - **数据库** (`db`): 嵌入式 redb 存储 (同步 API)
//! - **导入** (`loader`): 启动时从 JSON 批量导入商品
//! - **服务** (`services`): 阻塞线程池 + 熔断器保护的商品服务
//! - **HTTP API** (`api`): RESTful API 接口
//!
//! # 模块结构
//!
//! ```text
//! catalog-server/src/
//! ├── core/          # 配置、状态、错误、服务器
//! ├── db/            # redb 存储层
//! ├── loader/        # JSON 批量导入
//! ├── services/      # 线程池、熔断器、商品服务
//! ├── api/           # HTTP 路由和处理器
//! └── utils/         # 日志、校验
//! ```

pub mod api;
pub mod core;
pub mod db;
pub mod loader;
pub mod services;
pub mod utils;

// Re-export 公共类型
pub use crate::core::{Config, Server, ServerState};
pub use db::{CatalogStorage, CatalogStore};
pub use loader::{CatalogLoader, LoadOutcome, LoadReport};
pub use services::{Guarded, ProductService};
pub use utils::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{cleanup_old_logs, init_logger_with_file};

/// 设置环境 (dotenv, 配置, 日志)
pub fn setup_environment() -> anyhow::Result<Config> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    let log_dir = config.log_dir();
    init_logger_with_file(
        &config.log_level,
        config.is_production(),
        Some(&log_dir.to_string_lossy()),
    )?;

    Ok(config)
}

pub fn print_banner() {
    println!(
        r#"
   ______      __        __
  / ____/___ _/ /_____ _/ /___  ____ _
 / /   / __ `/ __/ __ `/ / __ \/ __ `/
/ /___/ /_/ / /_/ /_/ / / /_/ / /_/ /
\____/\__,_/\__/\__,_/_/\____/\__, /
                             /____/
    "#
    );
}
