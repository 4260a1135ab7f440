use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 应用统一错误类型
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum AppError {
    /// 上传校验错误（客户端问题）
    #[error("上传校验失败: {0}")]
    Validation(#[from] ValidationError),

    /// 合成流水线错误
    #[error("图像处理失败: {0}")]
    Pipeline(#[from] PipelineError),

    /// multipart 请求体解析错误
    #[error("multipart 解析失败: {0}")]
    Multipart(String),

    /// 请求体整体超过大小上限
    #[error("请求体过大: {0}")]
    BodyTooLarge(String),

    /// 内部服务器错误
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 上传校验错误类型
///
/// 按固定顺序短路检查：数量 → 文件名 → 声明类型 → 单文件大小。
#[derive(Error, Debug, PartialEq, Eq, utoipa::ToSchema)]
pub enum ValidationError {
    /// 请求中没有 files 字段
    #[error("请求中没有上传文件（需要 files 字段）")]
    NoFiles,

    /// 上传数量不是 2
    #[error("必须上传恰好 2 张图片（实际收到 {0} 张）")]
    WrongCount(usize),

    /// 文件名为空
    #[error("上传文件缺少文件名")]
    EmptyFilename,

    /// 声明的 MIME 类型不是 image/*
    #[error("文件类型不受支持: {0}（需要 image/*）")]
    WrongType(String),

    /// 单文件超过大小上限
    #[error("文件过大: {actual} 字节（上限 {limit} 字节）")]
    TooLarge { limit: u64, actual: u64 },
}

/// 合成流水线错误类型
///
/// 由 Compositor 抛出；HTTP 边界是唯一做状态码映射的位置。
#[derive(Error, Debug, utoipa::ToSchema)]
pub enum PipelineError {
    /// 图片字节不可解码
    #[error("图片解码失败: {0}")]
    Decode(String),

    /// 背景移除能力失败（或返回尺寸不符的结果）
    #[error("背景移除失败: {0}")]
    Removal(String),

    /// 输出编码失败
    #[error("JPEG 编码失败: {0}")]
    Encode(String),
}

/// 错误响应体（`{"error": "...", "details": "..."}`）。
///
/// 协议固定为扁平 JSON：`error` 为稳定的人类可读信息，
/// `details` 为可选的底层原因，调用方不应依赖其解析。
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// 错误信息
    #[schema(example = "必须上传恰好 2 张图片（实际收到 1 张）")]
    pub error: String,
    /// 可选：底层原因
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(ValidationError::TooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            // 解码失败归为客户端输入问题（策略决定见 DESIGN.md）
            AppError::Pipeline(PipelineError::Decode(_)) => StatusCode::BAD_REQUEST,
            AppError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            AppError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            AppError::Pipeline(PipelineError::Removal(cause)) => Some(cause.clone()),
            AppError::Pipeline(PipelineError::Encode(cause)) => Some(cause.clone()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 4xx 是客户端问题，不按服务器故障记日志。
        if status.is_server_error() {
            tracing::error!("请求处理失败 ({}): {}", status, self);
        } else {
            tracing::warn!("请求被拒绝 ({}): {}", status, self);
        }

        let body = ErrorBody {
            error: self.to_string(),
            details: self.details(),
        };

        let mut res = Json(body).into_response();
        *res.status_mut() = status;
        res
    }
}
