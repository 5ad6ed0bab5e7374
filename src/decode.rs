// 该文件是 Kuijian（盔检）项目的一部分。
// src/decode.rs - 检测结果解码
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

//! # 检测结果解码
//!
//! 原始输出按类别分组：每个类别先是一个记录数，后接该类的
//! `(y1, x1, y2, x2, score)` 归一化记录。解码只做坐标换算与裁剪，
//! 不做任何置信度过滤——丢弃记录会改变防抖器依赖的计数。

use std::collections::BTreeMap;

use crate::catalog::ClassCatalog;
use crate::error::PipelineError;
use crate::letterbox::LetterboxParams;

/// 单条检测结果，源图像像素坐标系
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub class_index: usize,
  /// `[x1, y1, x2, y2]`，已裁剪到源图像范围内
  pub bbox: [i32; 4],
  pub score: f32,
}

/// 按类别索引组织的一帧检测结果
pub type DetectionMap = BTreeMap<usize, Vec<Detection>>;

/// 一帧检测结果的总数
pub fn total_detections(map: &DetectionMap) -> usize {
  map.values().map(Vec::len).sum()
}

/// 解码一帧原始输出。
///
/// `classes` 是设备输出覆盖的类别数；超出目录范围说明模型与类别
/// 目录不匹配，报 `DecodeError` 而不是悄悄丢弃。
pub fn decode(
  raw: &[f32],
  classes: usize,
  catalog: &ClassCatalog,
  params: &LetterboxParams,
  src_w: u32,
  src_h: u32,
) -> Result<DetectionMap, PipelineError> {
  if classes > catalog.len() {
    return Err(PipelineError::DecodeError(format!(
      "模型输出 {} 个类别，类别目录只有 {} 个",
      classes,
      catalog.len()
    )));
  }

  let mut map = DetectionMap::new();
  let mut pos = 0usize;

  for class_index in 0..classes {
    let Some(&count) = raw.get(pos) else {
      return Err(PipelineError::DecodeError(format!(
        "输出在类别 {} 的组头处截断",
        class_index
      )));
    };
    pos += 1;

    if !count.is_finite() || count < 0.0 {
      return Err(PipelineError::DecodeError(format!(
        "类别 {} 的记录数无效: {}",
        class_index, count
      )));
    }
    let count = count as usize;

    let entry = map.entry(class_index).or_default();
    for _ in 0..count {
      let Some(record) = raw.get(pos..pos + 5) else {
        return Err(PipelineError::DecodeError(format!(
          "类别 {} 的记录在偏移 {} 处截断",
          class_index, pos
        )));
      };
      pos += 5;

      // 记录序为 (y1, x1, y2, x2, score)，逆变换按 (x1, y1, x2, y2)
      let src_box = params.inverse([record[1], record[0], record[3], record[2]]);
      let bbox = clip_box(src_box, src_w, src_h);
      entry.push(Detection {
        class_index,
        bbox,
        score: record[4],
      });
    }
  }

  Ok(map)
}

/// 裁剪到 `[0, src_w)` / `[0, src_h)`，抵消取整造成的出界
fn clip_box(b: [i32; 4], src_w: u32, src_h: u32) -> [i32; 4] {
  let max_x = src_w as i32 - 1;
  let max_y = src_h as i32 - 1;
  [
    b[0].clamp(0, max_x),
    b[1].clamp(0, max_y),
    b[2].clamp(0, max_x),
    b[3].clamp(0, max_y),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::letterbox;
  use image::RgbImage;

  fn params_for(src_w: u32, src_h: u32) -> LetterboxParams {
    let src = RgbImage::new(src_w, src_h);
    letterbox::forward(&src, 640, 640).unwrap().1
  }

  #[test]
  fn every_record_is_kept_regardless_of_score() {
    let catalog = ClassCatalog::from_labels(&["helmet", "no_helmet"]);
    let params = params_for(640, 640);
    // 类别 0: 两条（其中一条低分）；类别 1: 一条
    let raw = [
      2.0, //
      0.1, 0.1, 0.2, 0.2, 0.9, //
      0.3, 0.3, 0.4, 0.4, 0.01, //
      1.0, //
      0.5, 0.5, 0.6, 0.6, 0.5,
    ];
    let map = decode(&raw, 2, &catalog, &params, 640, 640).unwrap();
    assert_eq!(total_detections(&map), 3);
    assert_eq!(map[&0].len(), 2);
    assert_eq!(map[&1].len(), 1);
  }

  #[test]
  fn empty_classes_still_present_in_map() {
    let catalog = ClassCatalog::from_labels(&["helmet", "no_helmet"]);
    let params = params_for(640, 640);
    let raw = [0.0, 0.0];
    let map = decode(&raw, 2, &catalog, &params, 640, 640).unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(total_detections(&map), 0);
  }

  #[test]
  fn scenario_1920x1080_decodes_to_source_coordinates() {
    let catalog = ClassCatalog::from_labels(&["ok", "violation"]);
    let params = params_for(1920, 1080);
    let raw = [
      0.0, // 类别 ok 无记录
      1.0, 0.5, 0.5, 0.6, 0.6, 0.9,
    ];
    let map = decode(&raw, 2, &catalog, &params, 1920, 1080).unwrap();
    let det = map[&1][0];
    assert_eq!(det.bbox, [960, 540, 1152, 732]);
    assert_eq!(det.score, 0.9);
  }

  #[test]
  fn boxes_are_clipped_to_source_bounds() {
    let catalog = ClassCatalog::from_labels(&["one"]);
    let params = params_for(1920, 1080);
    // y 坐标落进上侧填充区，逆变换为负值，应被裁剪到 0
    let raw = [1.0, 0.0, 0.0, 1.0, 1.0, 0.8];
    let map = decode(&raw, 1, &catalog, &params, 1920, 1080).unwrap();
    let det = map[&0][0];
    assert_eq!(det.bbox[0], 0);
    assert_eq!(det.bbox[1], 0);
    assert_eq!(det.bbox[2], 1919);
    assert_eq!(det.bbox[3], 1079);
  }

  #[test]
  fn out_of_range_class_is_decode_error() {
    let catalog = ClassCatalog::from_labels(&["only_one"]);
    let params = params_for(640, 640);
    let raw = [0.0, 0.0];
    match decode(&raw, 2, &catalog, &params, 640, 640) {
      Err(PipelineError::DecodeError(_)) => {}
      other => panic!("期望 DecodeError，实际: {:?}", other.map(|_| ())),
    }
  }

  #[test]
  fn truncated_output_is_decode_error() {
    let catalog = ClassCatalog::from_labels(&["one"]);
    let params = params_for(640, 640);
    let raw = [2.0, 0.1, 0.1, 0.2, 0.2, 0.9]; // 组头声明 2 条，只有 1 条
    assert!(matches!(
      decode(&raw, 1, &catalog, &params, 640, 640),
      Err(PipelineError::DecodeError(_))
    ));
  }

  #[test]
  fn negative_count_is_decode_error() {
    let catalog = ClassCatalog::from_labels(&["one"]);
    let params = params_for(640, 640);
    let raw = [-1.0];
    assert!(matches!(
      decode(&raw, 1, &catalog, &params, 640, 640),
      Err(PipelineError::DecodeError(_))
    ));
  }
}
