// 该文件是 Kuijian（盔检）项目的一部分。
// src/catalog.rs - 类别目录
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

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// 类别描述文件结构，`labels/*.toml` 中的有序 `[[class]]` 列表
#[derive(Debug, Deserialize)]
struct CatalogFile {
  class: Vec<ClassEntry>,
}

#[derive(Debug, Deserialize)]
struct ClassEntry {
  label: String,
  color: Option<[u8; 3]>,
}

/// 单个类别：标签与绘制颜色
#[derive(Debug, Clone)]
pub struct ClassInfo {
  pub label: String,
  pub color: [u8; 3],
}

/// 有序类别目录。
///
/// 在列表中的位置即类别索引，进程生命周期内固定不变；
/// 解码出的类别索引必须落在 `[0, len)` 内。
#[derive(Debug, Clone)]
pub struct ClassCatalog {
  classes: Vec<ClassInfo>,
}

impl ClassCatalog {
  /// 从 TOML 描述文件加载目录，启动时调用一次。
  pub fn load(path: &Path) -> Result<Self> {
    let text = std::fs::read_to_string(path)
      .with_context(|| format!("无法读取类别描述文件: {}", path.display()))?;
    let file: CatalogFile = toml::from_str(&text)
      .with_context(|| format!("无法解析类别描述文件: {}", path.display()))?;
    if file.class.is_empty() {
      bail!("类别描述文件为空: {}", path.display());
    }

    let classes = file
      .class
      .into_iter()
      .enumerate()
      .map(|(idx, entry)| ClassInfo {
        label: entry.label,
        color: entry.color.unwrap_or_else(|| palette_color(idx)),
      })
      .collect();
    Ok(Self { classes })
  }

  /// 仅凭标签列表构造目录，颜色取自生成的调色盘（测试与桩设备使用）。
  pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
    let classes = labels
      .iter()
      .enumerate()
      .map(|(idx, label)| ClassInfo {
        label: label.as_ref().to_string(),
        color: palette_color(idx),
      })
      .collect();
    Self { classes }
  }

  pub fn len(&self) -> usize {
    self.classes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.classes.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&ClassInfo> {
    self.classes.get(index)
  }

  /// 按标签查找类别索引（告警主类别在启动时解析一次）。
  pub fn index_of(&self, label: &str) -> Option<usize> {
    self.classes.iter().position(|c| c.label == label)
  }

  pub fn iter(&self) -> impl Iterator<Item = &ClassInfo> {
    self.classes.iter()
  }
}

/// 按色相环生成类别颜色，未显式配置颜色的类别使用
fn palette_color(index: usize) -> [u8; 3] {
  let hue = (index as f32 * 47.0) % 360.0;
  hsv_to_rgb(hue, 0.8, 0.9)
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  [
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ]
}
