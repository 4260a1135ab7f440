use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, RgbaImage};
use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::config::{RemoverConfig, RemoverKind};

/// 背景移除能力（注入式依赖）
///
/// 契约：输入 RGBA 图像，返回**同尺寸**的 RGBA 图像，背景像素的
/// alpha 被压向 0，前景像素保持不透明。实现可替换（本地启发式、
/// 远程服务、测试桩），流水线不检查抠图质量，只检查返回尺寸。
///
/// 实现必须可被多个请求并发调用；不满足的实现由调用侧的信号量
/// 串行化（见 `AppState::removal_semaphore`）。
pub trait BackgroundRemover: Send + Sync {
    /// 实现名称（日志用）
    fn name(&self) -> &'static str;

    /// 移除背景，返回带透明度的同尺寸图像
    fn remove_background(&self, image: &RgbaImage) -> Result<RgbaImage, RemovalFailure>;
}

/// 抠图能力失败类型
#[derive(Debug, Error)]
pub enum RemovalFailure {
    /// 远程服务请求失败
    #[error("远程抠图服务请求失败: {0}")]
    Remote(String),

    /// 远程服务返回的掩膜图不可解码
    #[error("抠图结果不可解码: {0}")]
    MatteDecode(String),
}

/// 按配置构建抠图实现
pub fn build_remover(
    cfg: &RemoverConfig,
) -> Result<Arc<dyn BackgroundRemover>, config::ConfigError> {
    match cfg.kind {
        RemoverKind::BorderKey => Ok(Arc::new(BorderKeyRemover::new(cfg.tolerance))),
        RemoverKind::Remote => {
            let endpoint = cfg.endpoint.clone().ok_or_else(|| {
                config::ConfigError::Message(
                    "remover.kind = \"remote\" 需要配置 remover.endpoint".to_string(),
                )
            })?;
            Ok(Arc::new(RemoteRemover::new(
                endpoint,
                Duration::from_secs(cfg.timeout_secs),
            )))
        }
    }
}

/// 本地边缘取色抠图
///
/// 取图像四边像素的平均色作为背景色估计，对与其色距在容差内的像素
/// 把 alpha 压向 0，容差到两倍容差之间线性过渡。只是让服务可以在
/// 没有外部模型的情况下独立跑通；产线请换 `RemoteRemover`。
pub struct BorderKeyRemover {
    tolerance: u8,
}

impl BorderKeyRemover {
    pub fn new(tolerance: u8) -> Self {
        Self {
            tolerance: tolerance.max(1),
        }
    }

    /// 四边像素平均色（RGB）
    fn estimate_background(image: &RgbaImage) -> [f32; 3] {
        let (w, h) = image.dimensions();
        let mut sum = [0f64; 3];
        let mut count = 0f64;
        for x in 0..w {
            for y in [0, h.saturating_sub(1)] {
                let p = image.get_pixel(x, y);
                sum[0] += f64::from(p[0]);
                sum[1] += f64::from(p[1]);
                sum[2] += f64::from(p[2]);
                count += 1.0;
            }
        }
        for y in 0..h {
            for x in [0, w.saturating_sub(1)] {
                let p = image.get_pixel(x, y);
                sum[0] += f64::from(p[0]);
                sum[1] += f64::from(p[1]);
                sum[2] += f64::from(p[2]);
                count += 1.0;
            }
        }
        [
            (sum[0] / count) as f32,
            (sum[1] / count) as f32,
            (sum[2] / count) as f32,
        ]
    }
}

impl BackgroundRemover for BorderKeyRemover {
    fn name(&self) -> &'static str {
        "border-key"
    }

    fn remove_background(&self, image: &RgbaImage) -> Result<RgbaImage, RemovalFailure> {
        let background = Self::estimate_background(image);
        let tol = f32::from(self.tolerance);

        let mut out = image.clone();
        for pixel in out.pixels_mut() {
            let dr = f32::from(pixel[0]) - background[0];
            let dg = f32::from(pixel[1]) - background[1];
            let db = f32::from(pixel[2]) - background[2];
            let dist = (dr * dr + dg * dg + db * db).sqrt();

            // tol 以内视为背景，2*tol 以外保持原 alpha，中间线性过渡。
            let keep = ((dist - tol) / tol).clamp(0.0, 1.0);
            pixel[3] = (f32::from(pixel[3]) * keep).round() as u8;
        }
        Ok(out)
    }
}

/// 远程抠图服务
///
/// 把输入图编码为 PNG 转发给外部分割服务，期望返回带 alpha 的 PNG。
/// trait 为同步接口且只在 `spawn_blocking` 线程内被调用，因此使用
/// `reqwest::blocking`；客户端惰性构建，避免在异步上下文中创建。
pub struct RemoteRemover {
    endpoint: String,
    timeout: Duration,
    client: OnceCell<reqwest::blocking::Client>,
}

impl RemoteRemover {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        Self {
            endpoint,
            timeout,
            client: OnceCell::new(),
        }
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, RemovalFailure> {
        self.client.get_or_try_init(|| {
            reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| RemovalFailure::Remote(e.to_string()))
        })
    }
}

impl BackgroundRemover for RemoteRemover {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn remove_background(&self, image: &RgbaImage) -> Result<RgbaImage, RemovalFailure> {
        let mut payload = Cursor::new(Vec::new());
        image
            .write_to(&mut payload, ImageFormat::Png)
            .map_err(|e| RemovalFailure::Remote(format!("输入编码失败: {e}")))?;

        let response = self
            .client()?
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(payload.into_inner())
            .send()
            .map_err(|e| RemovalFailure::Remote(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemovalFailure::Remote(format!(
                "服务返回 {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .map_err(|e| RemovalFailure::Remote(e.to_string()))?;
        let matte = image::load_from_memory(&body)
            .map_err(|e| RemovalFailure::MatteDecode(e.to_string()))?;
        Ok(matte.to_rgba8())
    }
}
