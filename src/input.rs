// 该文件是 Kuijian（盔检）项目的一部分。
// src/input.rs - 帧来源
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

mod image_source;
mod v4l2_source;

use anyhow::Result;
use image::RgbImage;

pub use image_source::ImageSource;
pub use v4l2_source::V4l2Source;

use crate::config::CameraSettings;

/// 帧数据
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

/// 帧来源类型
pub enum FrameSourceType {
  /// 图片文件 / 图片目录
  Image,
  /// V4L2 摄像头
  V4l2,
}

/// 帧来源 trait。
///
/// 迭代器返回 `None` 表示流结束，是与一次性读取失败（`Some(Err)`）
/// 截然不同的终止条件，二者不可混用。
pub trait FrameSource: Iterator<Item = Result<Frame>> {
  /// 来源类型
  fn source_type(&self) -> FrameSourceType;

  /// 帧宽度
  fn width(&self) -> u32;

  /// 帧高度
  fn height(&self) -> u32;

  /// 帧率（如果适用）
  fn fps(&self) -> Option<f64>;
}

/// 从来源描述串创建帧来源。
///
/// - `/dev/videoN` 或 `v4l2://...`：V4L2 摄像头
/// - 其余视为图片文件或图片目录
pub fn create_frame_source(source: &str, camera: &CameraSettings) -> Result<Box<dyn FrameSource>> {
  if source.starts_with("/dev/video") || source.starts_with("v4l2://") {
    let device_path = source.trim_start_matches("v4l2://");
    return Ok(Box::new(V4l2Source::new(device_path, camera)?));
  }

  Ok(Box::new(ImageSource::new(source)?))
}
