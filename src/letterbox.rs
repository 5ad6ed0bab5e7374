// 该文件是 Kuijian（盔检）项目的一部分。
// src/letterbox.rs - 信箱式缩放变换
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Kuijian Group

//! # 信箱式缩放变换
//!
//! 把任意尺寸的源图像按统一比例缩放进固定尺寸的模型输入缓冲区，
//! 比例不变，剩余区域用中性灰填充；同时提供从模型坐标系回到
//! 源图像像素坐标系的逆变换。

use image::RgbImage;

use crate::error::PipelineError;

/// 填充用的中性灰
const PAD_COLOR: [u8; 3] = [114, 114, 114];

const RGB_CHANNELS: usize = 3;

/// 单帧的信箱变换参数。
///
/// 每帧重新计算，与同一帧的逆变换配套使用，不跨帧保留
/// （源分辨率可能逐帧变化）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxParams {
  /// 统一缩放比例，恒为正
  pub scale: f64,
  /// 水平方向单侧填充（像素）
  pub pad_x: u32,
  /// 垂直方向单侧填充（像素）
  pub pad_y: u32,
  /// 模型输入宽度
  pub model_w: u32,
  /// 模型输入高度
  pub model_h: u32,
}

impl LetterboxParams {
  /// 把归一化模型坐标框 `[x1, y1, x2, y2]`（取值 0..1）映射回源图像像素坐标。
  ///
  /// 每个坐标先乘以对应的模型边长，再减去填充偏移，最后除以缩放比例，
  /// 截断取整。
  pub fn inverse(&self, norm_box: [f32; 4]) -> [i32; 4] {
    let x1 = (norm_box[0] as f64 * self.model_w as f64 - self.pad_x as f64) / self.scale;
    let y1 = (norm_box[1] as f64 * self.model_h as f64 - self.pad_y as f64) / self.scale;
    let x2 = (norm_box[2] as f64 * self.model_w as f64 - self.pad_x as f64) / self.scale;
    let y2 = (norm_box[3] as f64 * self.model_h as f64 - self.pad_y as f64) / self.scale;
    [x1 as i32, y1 as i32, x2 as i32, y2 as i32]
  }

  /// 把源图像像素框映射到归一化模型坐标（正向，测试与标注工具使用）。
  pub fn forward_box(&self, src_box: [i32; 4]) -> [f32; 4] {
    let map_x = |x: i32| ((x as f64 * self.scale + self.pad_x as f64) / self.model_w as f64) as f32;
    let map_y = |y: i32| ((y as f64 * self.scale + self.pad_y as f64) / self.model_h as f64) as f32;
    [
      map_x(src_box[0]),
      map_y(src_box[1]),
      map_x(src_box[2]),
      map_y(src_box[3]),
    ]
  }
}

/// 把源图像信箱式写入预分配的 NHWC u8 缓冲区。
///
/// `dst` 长度必须是 `model_w * model_h * 3`。缓冲区整体先填充中性灰，
/// 再用双线性采样把缩放后的图像写到居中位置，奇数像素余量落在尾侧。
/// 整个过程不做任何堆分配，这是推理热路径的硬性要求。
pub fn forward_into(
  src: &RgbImage,
  dst: &mut [u8],
  model_w: u32,
  model_h: u32,
) -> Result<LetterboxParams, PipelineError> {
  let (src_w, src_h) = (src.width(), src.height());
  if src_w == 0 || src_h == 0 {
    return Err(PipelineError::InvalidFrame(format!(
      "源图像尺寸退化: {}x{}",
      src_w, src_h
    )));
  }
  debug_assert_eq!(dst.len(), (model_w * model_h) as usize * RGB_CHANNELS);

  let scale = f64::min(
    model_w as f64 / src_w as f64,
    model_h as f64 / src_h as f64,
  );
  if !(scale.is_finite() && scale > 0.0) {
    return Err(PipelineError::InvalidFrame(format!(
      "缩放比例退化: {}",
      scale
    )));
  }

  let new_w = ((src_w as f64 * scale).round() as u32).clamp(1, model_w);
  let new_h = ((src_h as f64 * scale).round() as u32).clamp(1, model_h);
  let pad_x = (model_w - new_w) / 2;
  let pad_y = (model_h - new_h) / 2;

  for b in dst.iter_mut() {
    *b = PAD_COLOR[0];
  }

  let src_data = src.as_raw();
  let src_stride = src_w as usize * RGB_CHANNELS;
  let dst_stride = model_w as usize * RGB_CHANNELS;

  // 双线性采样，目标像素中心映射回源坐标
  let x_ratio = src_w as f64 / new_w as f64;
  let y_ratio = src_h as f64 / new_h as f64;
  for dy in 0..new_h {
    let sy = ((dy as f64 + 0.5) * y_ratio - 0.5).max(0.0);
    let y0 = (sy as u32).min(src_h - 1);
    let y1 = (y0 + 1).min(src_h - 1);
    let fy = sy - y0 as f64;
    let row = (dy + pad_y) as usize * dst_stride;
    for dx in 0..new_w {
      let sx = ((dx as f64 + 0.5) * x_ratio - 0.5).max(0.0);
      let x0 = (sx as u32).min(src_w - 1);
      let x1 = (x0 + 1).min(src_w - 1);
      let fx = sx - x0 as f64;

      let p00 = (y0 as usize * src_stride) + x0 as usize * RGB_CHANNELS;
      let p01 = (y0 as usize * src_stride) + x1 as usize * RGB_CHANNELS;
      let p10 = (y1 as usize * src_stride) + x0 as usize * RGB_CHANNELS;
      let p11 = (y1 as usize * src_stride) + x1 as usize * RGB_CHANNELS;
      let out = row + (dx + pad_x) as usize * RGB_CHANNELS;

      for c in 0..RGB_CHANNELS {
        let top = src_data[p00 + c] as f64 * (1.0 - fx) + src_data[p01 + c] as f64 * fx;
        let bottom = src_data[p10 + c] as f64 * (1.0 - fx) + src_data[p11 + c] as f64 * fx;
        dst[out + c] = (top * (1.0 - fy) + bottom * fy).round() as u8;
      }
    }
  }

  Ok(LetterboxParams {
    scale,
    pad_x,
    pad_y,
    model_w,
    model_h,
  })
}

/// 分配式便捷包装，返回填充后的图像与变换参数。
pub fn forward(
  src: &RgbImage,
  model_w: u32,
  model_h: u32,
) -> Result<(RgbImage, LetterboxParams), PipelineError> {
  let mut dst = vec![0u8; (model_w * model_h) as usize * RGB_CHANNELS];
  let params = forward_into(src, &mut dst, model_w, model_h)?;
  let image = RgbImage::from_raw(model_w, model_h, dst)
    .ok_or_else(|| PipelineError::InvalidFrame("缓冲区长度与目标尺寸不一致".to_string()))?;
  Ok((image, params))
}
