use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::UploadConfig;
use crate::features::process::{BackgroundRemover, Compositor};

/// 聚合的应用共享状态
///
/// 全部为只读协作者，请求之间没有共享可变状态。
#[derive(Clone)]
pub struct AppState {
    /// 合成流水线（注入配置后的单例）
    pub compositor: Arc<Compositor>,
    /// 注入的背景移除能力
    pub remover: Arc<dyn BackgroundRemover>,
    /// 控制并发抠图的信号量（抠图是唯一的重负载；
    /// 非并发安全的抠图实现靠它串行化）
    pub removal_semaphore: Arc<Semaphore>,
    /// 上传限制
    pub upload: UploadConfig,
}
