// 该文件是 Kuijian（盔检）项目的一部分。
// src/input/v4l2_source.rs - V4L2 摄像头输入源
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

use std::pin::Pin;
use std::time::Instant;

use anyhow::{Context, Result};
use image::RgbImage;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use super::{Frame, FrameSource, FrameSourceType};
use crate::config::CameraSettings;

/// V4L2 摄像头输入源。
///
/// 优先协商 MJPG（逐帧 JPEG 解码），协商不到时回退 YUYV 软转换。
/// 由于 v4l 库的 Stream 需要引用 Device，我们使用 Pin<Box> 来保证
/// Device 的内存地址稳定，从而可以安全地创建引用它的 Stream。
pub struct V4l2Source {
  /// V4L2 设备（使用 Pin<Box> 固定内存位置）
  device: Pin<Box<Device>>,
  /// 捕获流（生命周期与 device 关联）
  stream: Option<Stream<'static>>,
  fourcc: FourCC,
  frame_index: u64,
  width: u32,
  height: u32,
  fps: u32,
  start_time: Instant,
}

impl V4l2Source {
  pub fn new(device_path: &str, camera: &CameraSettings) -> Result<Self> {
    let device = Box::pin(
      Device::with_path(device_path)
        .with_context(|| format!("无法打开摄像头设备: {}", device_path))?,
    );

    // 按配置协商格式，驱动可能调整分辨率与像素格式
    let mut format = device.format()?;
    format.width = camera.width;
    format.height = camera.height;
    format.fourcc = FourCC::new(b"MJPG");
    let mut format = device.set_format(&format)?;
    if format.fourcc != FourCC::new(b"MJPG") {
      format.fourcc = FourCC::new(b"YUYV");
      format = device.set_format(&format)?;
    }
    if format.fourcc != FourCC::new(b"MJPG") && format.fourcc != FourCC::new(b"YUYV") {
      anyhow::bail!("摄像头不支持 MJPG/YUYV 像素格式: {}", format.fourcc);
    }

    let width = format.width;
    let height = format.height;
    let fourcc = format.fourcc;

    let mut source = Self {
      device,
      stream: None,
      fourcc,
      frame_index: 0,
      width,
      height,
      fps: camera.fps,
      start_time: Instant::now(),
    };

    // SAFETY: device 被 Pin<Box> 固定，不会移动，所以引用始终有效
    // Stream 的生命周期通过 source 的 Drop 来管理：
    // stream (Option::take) 先于 device 析构
    let device_ref: &Device = &source.device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, 4).context("无法创建捕获流")?
    };

    source.stream = Some(stream);
    Ok(source)
  }

  /// 将 YUYV 格式转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);

    for chunk in yuyv.chunks(4) {
      if chunk.len() < 4 {
        break;
      }

      let y0 = chunk[0] as f32;
      let u = chunk[1] as f32 - 128.0;
      let y1 = chunk[2] as f32;
      let v = chunk[3] as f32 - 128.0;

      for y in [y0, y1] {
        let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
        let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
        let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
        rgb.extend_from_slice(&[r, g, b]);
      }
    }

    rgb
  }

  fn decode_buffer(&self, buffer: &[u8]) -> Result<RgbImage> {
    if self.fourcc == FourCC::new(b"MJPG") {
      let img = image::load_from_memory_with_format(buffer, image::ImageFormat::Jpeg)
        .context("MJPG 帧解码失败")?;
      return Ok(img.to_rgb8());
    }

    let rgb_data = Self::yuyv_to_rgb(buffer, self.width, self.height);
    RgbImage::from_raw(self.width, self.height, rgb_data)
      .context("无法从 YUYV 数据创建 RGB 图像")
  }
}

impl Drop for V4l2Source {
  fn drop(&mut self) {
    // 确保 stream 在 device 之前被 drop
    self.stream.take();
  }
}

impl Iterator for V4l2Source {
  type Item = Result<Frame>;

  fn next(&mut self) -> Option<Self::Item> {
    let stream = self.stream.as_mut()?;

    let result = match stream.next() {
      Ok((buffer, _meta)) => buffer.to_vec(),
      Err(e) => return Some(Err(anyhow::anyhow!("无法捕获帧: {}", e))),
    };

    let frame = self.decode_buffer(&result).map(|image| {
      let frame = Frame {
        image,
        index: self.frame_index,
        timestamp_ms: self.start_time.elapsed().as_millis() as u64,
      };
      self.frame_index += 1;
      frame
    });

    Some(frame)
  }
}

impl FrameSource for V4l2Source {
  fn source_type(&self) -> FrameSourceType {
    FrameSourceType::V4l2
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    Some(self.fps as f64)
  }
}
