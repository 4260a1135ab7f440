use std::io::Cursor;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode, header},
};
use image::{ImageFormat, Rgb, Rgba, RgbaImage};
use tokio::sync::Semaphore;
use tower::ServiceExt;

use matte_backend::config::UploadConfig;
use matte_backend::features::process::remover::RemovalFailure;
use matte_backend::features::process::{BackgroundRemover, Compositor, create_process_router};
use matte_backend::state::AppState;

const BOUNDARY: &str = "x-matte-test-boundary";

/// 返回固定 alpha 掩膜的测试桩（确定性端到端测试）
struct FixedAlphaRemover(u8);

impl BackgroundRemover for FixedAlphaRemover {
    fn name(&self) -> &'static str {
        "fixed-alpha"
    }
    fn remove_background(&self, image: &RgbaImage) -> Result<RgbaImage, RemovalFailure> {
        let mut out = image.clone();
        for p in out.pixels_mut() {
            p[3] = self.0;
        }
        Ok(out)
    }
}

/// 总是失败的测试桩
struct FailingRemover;

impl BackgroundRemover for FailingRemover {
    fn name(&self) -> &'static str {
        "failing"
    }
    fn remove_background(&self, _image: &RgbaImage) -> Result<RgbaImage, RemovalFailure> {
        Err(RemovalFailure::Remote("model exploded".to_string()))
    }
}

fn test_app(remover: Arc<dyn BackgroundRemover>, max_file_bytes: u64) -> Router {
    test_app_with_body_limit(remover, max_file_bytes, 32 * 1024 * 1024)
}

fn test_app_with_body_limit(
    remover: Arc<dyn BackgroundRemover>,
    max_file_bytes: u64,
    max_request_bytes: usize,
) -> Router {
    let state = AppState {
        compositor: Arc::new(Compositor::new(1024, 90)),
        remover,
        removal_semaphore: Arc::new(Semaphore::new(2)),
        upload: UploadConfig {
            max_file_bytes,
            ..UploadConfig::default()
        },
    };
    create_process_router()
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_request_bytes))
}

fn jpeg_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, Rgb(color));
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .expect("encode jpeg fixture");
    buf.into_inner()
}

fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode png fixture");
    buf.into_inner()
}

/// 手工拼 multipart 请求体：(字段名, 文件名, MIME, 字节) 列表
fn multipart_body(parts: &[(&str, &str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, content_type, bytes) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n")
                .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn process_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/process")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("build request")
}

async fn body_bytes(res: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec()
}

#[tokio::test]
async fn composite_of_red_content_and_blue_style_is_scaled_red_jpeg() {
    let app = test_app(Arc::new(FixedAlphaRemover(255)), 0);

    let content = jpeg_bytes(2000, 1000, [255, 0, 0]);
    let style = png_bytes(500, 500, [0, 0, 255, 255]);
    let body = multipart_body(&[
        ("files", "content.jpg", "image/jpeg", &content),
        ("files", "style.png", "image/png", &style),
    ]);

    let res = app.oneshot(process_request(body)).await.expect("call app");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()
            .get(header::CONTENT_TYPE)
            .expect("missing content-type"),
        "image/jpeg"
    );

    let jpeg = body_bytes(res).await;
    let decoded = image::load_from_memory(&jpeg).expect("decode response").to_rgb8();
    // 内容图 2000x1000 被封顶到 1024x512，风格图被拉伸对齐。
    assert_eq!(decoded.dimensions(), (1024, 512));
    // 全图 alpha=255，风格图应完全不可见。
    let p = decoded.get_pixel(512, 256);
    assert!(p[0] > 200, "red channel should dominate: {p:?}");
    assert!(p[2] < 60, "blue channel should be invisible: {p:?}");
}

#[tokio::test]
async fn single_upload_is_rejected_with_count_error() {
    let app = test_app(Arc::new(FixedAlphaRemover(255)), 0);

    let content = jpeg_bytes(32, 32, [255, 0, 0]);
    let body = multipart_body(&[("files", "content.jpg", "image/jpeg", &content)]);

    let res = app.oneshot(process_request(body)).await.expect("call app");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let json: serde_json::Value =
        serde_json::from_slice(&body_bytes(res).await).expect("json error body");
    let message = json["error"].as_str().expect("error message");
    assert!(message.contains('2'), "should mention count: {message}");
}

#[tokio::test]
async fn empty_filename_is_rejected() {
    let app = test_app(Arc::new(FixedAlphaRemover(255)), 0);

    let content = jpeg_bytes(32, 32, [255, 0, 0]);
    let style = png_bytes(32, 32, [0, 0, 255, 255]);
    let body = multipart_body(&[
        ("files", "content.jpg", "image/jpeg", &content),
        ("files", "", "image/png", &style),
    ]);

    let res = app.oneshot(process_request(body)).await.expect("call app");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let json: serde_json::Value =
        serde_json::from_slice(&body_bytes(res).await).expect("json error body");
    assert!(
        json["error"].as_str().expect("error message").contains("文件名"),
        "should mention filename: {json}"
    );
}

#[tokio::test]
async fn non_image_declared_type_is_rejected() {
    let app = test_app(Arc::new(FixedAlphaRemover(255)), 0);

    let content = jpeg_bytes(32, 32, [255, 0, 0]);
    let body = multipart_body(&[
        ("files", "content.jpg", "image/jpeg", &content),
        ("files", "style.txt", "text/plain", b"hello"),
    ]);

    let res = app.oneshot(process_request(body)).await.expect("call app");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_files_field_is_rejected() {
    let app = test_app(Arc::new(FixedAlphaRemover(255)), 0);

    let content = jpeg_bytes(32, 32, [255, 0, 0]);
    // 字段名不是 files，等价于没有上传。
    let body = multipart_body(&[("attachment", "content.jpg", "image/jpeg", &content)]);

    let res = app.oneshot(process_request(body)).await.expect("call app");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversize_file_is_rejected_with_413() {
    let app = test_app(Arc::new(FixedAlphaRemover(255)), 1024);

    let content = jpeg_bytes(256, 256, [255, 0, 0]);
    let style = png_bytes(256, 256, [0, 0, 255, 255]);
    let body = multipart_body(&[
        ("files", "content.jpg", "image/jpeg", &content),
        ("files", "style.png", "image/png", &style),
    ]);

    let res = app.oneshot(process_request(body)).await.expect("call app");
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn oversize_request_body_is_rejected_with_413() {
    // 整体请求体上限 1 KiB，上传约 8 KiB 的 multipart 体。
    let app = test_app_with_body_limit(Arc::new(FixedAlphaRemover(255)), 0, 1024);

    let content = jpeg_bytes(256, 256, [255, 0, 0]);
    let style = png_bytes(256, 256, [0, 0, 255, 255]);
    let body = multipart_body(&[
        ("files", "content.jpg", "image/jpeg", &content),
        ("files", "style.png", "image/png", &style),
    ]);
    assert!(body.len() > 1024, "fixture must exceed the body limit");

    let res = app.oneshot(process_request(body)).await.expect("call app");
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let json: serde_json::Value =
        serde_json::from_slice(&body_bytes(res).await).expect("json error body");
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn undecodable_image_bytes_are_rejected_with_400() {
    let app = test_app(Arc::new(FixedAlphaRemover(255)), 0);

    let style = png_bytes(32, 32, [0, 0, 255, 255]);
    let body = multipart_body(&[
        ("files", "content.jpg", "image/jpeg", b"definitely not a jpeg"),
        ("files", "style.png", "image/png", &style),
    ]);

    let res = app.oneshot(process_request(body)).await.expect("call app");
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn remover_failure_returns_500_with_json_error_and_no_jpeg() {
    let app = test_app(Arc::new(FailingRemover), 0);

    let content = jpeg_bytes(32, 32, [255, 0, 0]);
    let style = png_bytes(32, 32, [0, 0, 255, 255]);
    let body = multipart_body(&[
        ("files", "content.jpg", "image/jpeg", &content),
        ("files", "style.png", "image/png", &style),
    ]);

    let res = app.oneshot(process_request(body)).await.expect("call app");
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let content_type = res
        .headers()
        .get(header::CONTENT_TYPE)
        .expect("missing content-type")
        .to_str()
        .expect("content-type str")
        .to_string();
    assert!(
        content_type.starts_with("application/json"),
        "error must not be image bytes: {content_type}"
    );

    let json: serde_json::Value =
        serde_json::from_slice(&body_bytes(res).await).expect("json error body");
    assert!(json["error"].as_str().is_some());
    assert!(
        json["details"]
            .as_str()
            .expect("details field")
            .contains("model exploded")
    );
}
