use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage, imageops};

use crate::config::PipelineConfig;
use crate::error::PipelineError;

use super::remover::BackgroundRemover;

/// 图像合成流水线
///
/// 确定性管线：解码 → RGBA 归一化 → 有界缩略图 → 背景移除 →
/// 风格图拉伸对齐 → over 合成 → 压平为 RGB → JPEG 编码。
/// 无任何文件系统或网络副作用；给定相同输入与确定性的抠图实现，
/// 输出字节逐字节一致。
pub struct Compositor {
    /// 内容图边长上限；超出则按比例缩小，绝不放大
    max_dimension: u32,
    /// 输出 JPEG 质量
    jpeg_quality: u8,
}

impl Compositor {
    pub fn new(max_dimension: u32, jpeg_quality: u8) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(cfg.max_dimension, cfg.jpeg_quality)
    }

    /// 把内容图与风格图合成为一张不透明 JPEG。
    ///
    /// 图层顺序固定：内容图在上、风格图在下，交换会改变语义。
    /// 风格图按内容图尺寸逐轴拉伸（不保持宽高比，产品决定）。
    pub fn composite(
        &self,
        remover: &dyn BackgroundRemover,
        content_bytes: &[u8],
        style_bytes: &[u8],
    ) -> Result<Vec<u8>, PipelineError> {
        // 1-2. 解码内容图并归一化到 RGBA，超限时做有界缩略图。
        let content = self.decode_rgba(content_bytes, "内容图")?;
        let content = self.thumbnail_capped(content);
        let (width, height) = content.dimensions();
        tracing::debug!(width, height, "内容图归一化完成");

        // 3. 背景移除：黑盒能力，只校验返回尺寸。
        let cut = remover
            .remove_background(&content)
            .map_err(|e| PipelineError::Removal(e.to_string()))?;
        if cut.dimensions() != (width, height) {
            let (cw, ch) = cut.dimensions();
            return Err(PipelineError::Removal(format!(
                "抠图返回尺寸 {cw}x{ch}，与输入 {width}x{height} 不符"
            )));
        }

        // 4-5. 解码风格图并拉伸到内容图尺寸。
        let style = self.decode_rgba(style_bytes, "风格图")?;
        let mut canvas =
            imageops::resize(&style, width, height, imageops::FilterType::Triangle);

        // 6-7. over 合成（内容在上）后压平为 RGB。
        imageops::overlay(&mut canvas, &cut, 0, 0);
        let flattened = DynamicImage::ImageRgba8(canvas).to_rgb8();

        // 8. JPEG 编码。
        let mut out = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut out, self.jpeg_quality);
        flattened
            .write_with_encoder(encoder)
            .map_err(|e| PipelineError::Encode(e.to_string()))?;
        Ok(out.into_inner())
    }

    fn decode_rgba(&self, bytes: &[u8], role: &str) -> Result<RgbaImage, PipelineError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| PipelineError::Decode(format!("{role}: {e}")))?;
        Ok(decoded.to_rgba8())
    }

    /// 任一边超过上限时等比缩小到包围盒内；不放大。
    fn thumbnail_capped(&self, image: RgbaImage) -> RgbaImage {
        let (w, h) = image.dimensions();
        if w.max(h) <= self.max_dimension {
            return image;
        }
        DynamicImage::ImageRgba8(image)
            .thumbnail(self.max_dimension, self.max_dimension)
            .to_rgba8()
    }
}
