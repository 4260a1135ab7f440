use std::time::Instant;

use axum::{
    Router,
    extract::{Multipart, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::post,
};

use crate::error::{AppError, ErrorBody};
use crate::state::AppState;

use super::types::RawUpload;
use super::validator;

/// multipart 中承载图片的字段名（与上线的六个变体一致）
const FILES_FIELD: &str = "files";

/// multipart 读取错误的归类：整体大小超限走 413，其余按格式错误走 400。
fn map_multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::BodyTooLarge(e.to_string())
    } else {
        AppError::Multipart(e.to_string())
    }
}

#[utoipa::path(
    post,
    path = "/process",
    summary = "抠图并合成两张上传图片",
    description = "multipart 的 files 字段上传恰好两张图片：第一张为内容图（抠除背景后置于上层），第二张为风格图（拉伸为内容图尺寸后作为底图）。返回压平后的 JPEG。",
    responses(
        (status = 200, description = "JPEG bytes of the composite"),
        (status = 400, description = "上传校验失败或图片不可解码", body = ErrorBody),
        (status = 413, description = "上传超过大小上限", body = ErrorBody),
        (status = 500, description = "抠图或编码失败", body = ErrorBody)
    ),
    tag = "Process"
)]
pub async fn process_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let t_total = Instant::now();

    // 收集 files 字段的全部 part；其他字段忽略。
    let mut uploads: Vec<RawUpload> = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(map_multipart_error)? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(map_multipart_error)?;
        uploads.push(RawUpload {
            filename,
            content_type,
            bytes,
        });
    }

    // 昂贵的流水线跑之前先做快速预检。
    validator::validate(&uploads, state.upload.max_file_bytes)?;
    tracing::info!(
        "开始合成: content={} ({} 字节), style={} ({} 字节)",
        uploads[0].filename,
        uploads[0].len(),
        uploads[1].filename,
        uploads[1].len()
    );

    let mut parts = uploads.into_iter();
    let (Some(content), Some(style)) = (parts.next(), parts.next()) else {
        return Err(AppError::Internal("上传数量校验后不一致".to_string()));
    };

    // 抠图是唯一的重负载，许可数有限；许可同时保护非并发安全的实现。
    let t_wait = Instant::now();
    let _permit = state
        .removal_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| AppError::Internal(format!("获取抠图信号量失败: {e}")))?;
    let wait_ms = t_wait.elapsed().as_millis() as i64;

    // 解码/抠图/缩放/编码都是阻塞的像素操作，必须移出 tokio worker。
    let compositor = state.compositor.clone();
    let remover = state.remover.clone();
    let t_pipeline = Instant::now();
    let jpeg = tokio::task::spawn_blocking(move || {
        compositor.composite(remover.as_ref(), &content.bytes, &style.bytes)
    })
    .await
    .map_err(|e| AppError::Internal(format!("合成任务执行失败: {e}")))??;
    let pipeline_ms = t_pipeline.elapsed().as_millis() as i64;

    let total_ms = t_total.elapsed().as_millis() as i64;
    tracing::info!(
        target: "process_performance",
        wait_ms,
        pipeline_ms,
        total_ms,
        output_bytes = jpeg.len(),
        "合成完成"
    );

    let mut headers = axum::http::HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    Ok((StatusCode::OK, headers, jpeg))
}

/// 合成路由
pub fn create_process_router() -> Router<AppState> {
    Router::new().route("/process", post(process_images))
}
