use std::path::PathBuf;
use std::sync::Arc;

use crate::core::{Config, Result};
use crate::db::{CatalogStorage, CatalogStore};
use crate::loader::{CatalogLoader, LoadOutcome};
use crate::services::{BlockingExecutor, CircuitBreakerRegistry, ProductService};

/// 服务器状态 - 持有所有服务的共享引用
///
/// ServerState 是 Clone 的，所有字段都是引用计数的，克隆成本极低。
///
/// # 示例
///
/// ```ignore
/// let state = ServerState::initialize(&config)?;
/// let product = state.products.get_by_id(1).await;
/// ```
#[derive(Clone)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    /// 嵌入式数据库 (redb)
    pub store: Arc<dyn CatalogStore>,
    /// 阻塞存储线程池
    pub executor: BlockingExecutor,
    /// 熔断器注册表
    pub breakers: Arc<CircuitBreakerRegistry>,
    /// 商品服务
    pub products: ProductService,
}

impl ServerState {
    /// 创建服务器状态 (手动构造，测试可注入任意 store)
    pub fn new(config: Config, store: Arc<dyn CatalogStore>) -> Self {
        let executor = BlockingExecutor::new(config.worker_pool_size, config.worker_queue_capacity);
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker.clone()));
        let products = ProductService::new(store.clone(), executor.clone(), &breakers);
        Self {
            config,
            store,
            executor,
            breakers,
            products,
        }
    }

    /// 初始化服务器状态
    ///
    /// 按顺序初始化：
    /// 1. 工作目录
    /// 2. 数据库 (work_dir/catalog.redb)
    pub fn initialize(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.work_dir)?;
        let db_path = config.database_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let storage = CatalogStorage::open(&db_path)?;
        tracing::info!(path = %db_path.display(), "Database opened");

        Ok(Self::new(config.clone(), Arc::new(storage)))
    }

    /// 启动导入 (仅在商品表为空时执行)
    ///
    /// 在阻塞线程池上运行；任何失败只记录日志，不影响启动
    pub async fn load_catalog(&self) -> Option<LoadOutcome> {
        let loader = CatalogLoader::new(self.store.clone());
        let feed_path = self.feed_path();

        let result =
            tokio::task::spawn_blocking(move || loader.run(&feed_path)).await;
        match result {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Error while saving products in database!");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "Catalog load task failed");
                None
            }
        }
    }

    /// 导入文件路径
    pub fn feed_path(&self) -> PathBuf {
        PathBuf::from(&self.config.feed_path)
    }
}
