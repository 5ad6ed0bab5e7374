// 该文件是 Kuijian（盔检）项目的一部分。
// src/draw.rs - 检测结果叠加绘制
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::catalog::ClassCatalog;
use crate::decode::DetectionMap;

/// 叠加绘制工具：边界框用类别颜色，标签为 `{label} {score:.2}`
pub struct Overlay {
  /// 字体
  font: FontArc,
  /// 字体大小
  font_scale: PxScale,
}

impl Default for Overlay {
  fn default() -> Self {
    Self::new()
  }
}

impl Overlay {
  pub fn new() -> Self {
    // 使用内置的默认字体数据
    let font_data = include_bytes!("../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data).expect("无法加载内置字体");

    Self {
      font,
      font_scale: PxScale::from(16.0),
    }
  }

  /// 在图像上绘制一帧的全部检测结果
  pub fn draw_detections(&self, image: &mut RgbImage, detections: &DetectionMap, catalog: &ClassCatalog) {
    for (&class_index, items) in detections {
      let Some(class) = catalog.get(class_index) else {
        continue;
      };
      let color = Rgb(class.color);

      for det in items {
        let [x1, y1, x2, y2] = det.bbox;
        let width = (x2 - x1).max(0) as u32;
        let height = (y2 - y1).max(0) as u32;
        if width == 0 || height == 0 {
          continue;
        }

        let rect = Rect::at(x1, y1).of_size(width, height);
        draw_hollow_rect_mut(image, rect, color);

        // 第二个边框增加可见度
        if width > 2 && height > 2 {
          let inner = Rect::at(x1 + 1, y1 + 1).of_size(width - 2, height - 2);
          draw_hollow_rect_mut(image, inner, color);
        }

        let label = format!("{} {:.2}", class.label, det.score);
        let text_y = (y1 - 20).max(0);
        draw_text_mut(image, color, x1, text_y, self.font_scale, &self.font, &label);
      }
    }
  }
}
