// 该文件是 Kuijian（盔检）项目的一部分。
// src/input/image_source.rs - 图片输入源
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

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::ImageReader;

use super::{Frame, FrameSource, FrameSourceType};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// 图片输入源：单张图片或按文件名排序的图片目录。
///
/// 把测试图片目录当作离线视频回放，每张图片一帧。
pub struct ImageSource {
  /// 待读取的文件，倒序存放，pop 即下一帧
  pending: Vec<PathBuf>,
  frame_index: u64,
  width: u32,
  height: u32,
}

impl ImageSource {
  pub fn new(path: &str) -> Result<Self> {
    let path = Path::new(path);
    let mut files = if path.is_dir() {
      let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("无法读取图片目录: {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
          p.extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
        })
        .collect();
      files.sort();
      files
    } else {
      vec![path.to_path_buf()]
    };

    if files.is_empty() {
      anyhow::bail!("图片目录为空: {}", path.display());
    }

    // 预读第一张确定帧尺寸
    let first = ImageReader::open(&files[0])
      .with_context(|| format!("无法打开图片文件: {}", files[0].display()))?
      .decode()
      .with_context(|| format!("无法解码图片文件: {}", files[0].display()))?;

    files.reverse();
    Ok(Self {
      pending: files,
      frame_index: 0,
      width: first.width(),
      height: first.height(),
    })
  }
}

impl Iterator for ImageSource {
  type Item = Result<Frame>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.pending.pop()?;

    let result = ImageReader::open(&path)
      .with_context(|| format!("无法打开图片文件: {}", path.display()))
      .and_then(|reader| {
        reader
          .decode()
          .with_context(|| format!("无法解码图片文件: {}", path.display()))
      })
      .map(|img| {
        let frame = Frame {
          image: img.to_rgb8(),
          index: self.frame_index,
          timestamp_ms: 0,
        };
        self.frame_index += 1;
        frame
      });

    Some(result)
  }
}

impl FrameSource for ImageSource {
  fn source_type(&self) -> FrameSourceType {
    FrameSourceType::Image
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn directory_yields_frames_in_name_order_then_ends() {
    let dir = tempfile::tempdir().unwrap();
    for (name, level) in [("b.png", 20u8), ("a.png", 10u8)] {
      RgbImage::from_pixel(8, 6, Rgb([level, level, level]))
        .save(dir.path().join(name))
        .unwrap();
    }

    let mut source = ImageSource::new(dir.path().to_str().unwrap()).unwrap();
    assert_eq!((source.width(), source.height()), (8, 6));

    let first = source.next().unwrap().unwrap();
    assert_eq!(first.image.get_pixel(0, 0)[0], 10);
    assert_eq!(first.index, 0);
    let second = source.next().unwrap().unwrap();
    assert_eq!(second.image.get_pixel(0, 0)[0], 20);
    // 流结束是 None，不是错误
    assert!(source.next().is_none());
  }

  #[test]
  fn missing_file_is_an_error() {
    assert!(ImageSource::new("/nonexistent/frame.png").is_err());
  }
}
