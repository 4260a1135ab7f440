use axum::body::Bytes;

/// 单个上传文件（请求作用域内的临时实体）
///
/// 角色按出现顺序约定：第一个为内容图，第二个为风格图。
#[derive(Debug, Clone)]
pub struct RawUpload {
    /// 客户端声明的文件名
    pub filename: String,
    /// 客户端声明的 MIME 类型
    pub content_type: Option<String>,
    /// 原始字节
    pub bytes: Bytes,
}

impl RawUpload {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
