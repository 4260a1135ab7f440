/// 健康检查
pub mod health;
/// 图像合成端点（校验 → 抠图 → 合成）
pub mod process;
