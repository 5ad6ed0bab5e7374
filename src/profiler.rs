// 该文件是 Kuijian（盔检）项目的一部分。
// src/profiler.rs - 帧循环性能统计
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

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::info;

/// "Total" 桶记录整帧耗时
const TOTAL_BUCKET: &str = "Total";

/// 帧循环性能统计。
///
/// 按命名阶段累计耗时，满一个统计窗口（帧数）后输出各阶段均值与
/// 实际帧率并清零。关闭时所有调用都是零开销空操作，不取时间戳。
pub struct Profiler {
  enabled: bool,
  target_frames: u64,
  acc_times: BTreeMap<&'static str, Duration>,
  frame_count: u64,
  frame_start: Option<Instant>,
}

impl Profiler {
  pub fn new(enabled: bool, target_frames: u64) -> Self {
    Self {
      enabled,
      target_frames: target_frames.max(1),
      acc_times: BTreeMap::new(),
      frame_count: 0,
      frame_start: None,
    }
  }

  pub fn disabled() -> Self {
    Self::new(false, 1)
  }

  /// 帧开始，记录整帧计时起点
  pub fn start_frame(&mut self) {
    if !self.enabled {
      return;
    }
    self.frame_start = Some(Instant::now());
  }

  /// 帧结束：累计 Total 桶；满窗口时输出统计并清零
  pub fn end_frame(&mut self) {
    if !self.enabled {
      return;
    }
    if let Some(start) = self.frame_start.take() {
      *self.acc_times.entry(TOTAL_BUCKET).or_default() += start.elapsed();
    }
    self.frame_count += 1;

    if self.frame_count >= self.target_frames {
      self.report();
      self.acc_times.clear();
      self.frame_count = 0;
    }
  }

  /// 作用域计时：守卫析构时把耗时累计进命名桶
  pub fn measure(&mut self, name: &'static str) -> StageTimer<'_> {
    if !self.enabled {
      return StageTimer { inner: None };
    }
    StageTimer {
      inner: Some(StageTimerInner {
        profiler: self,
        name,
        start: Instant::now(),
      }),
    }
  }

  pub fn frame_count(&self) -> u64 {
    self.frame_count
  }

  pub fn bucket_total(&self, name: &'static str) -> Option<Duration> {
    self.acc_times.get(name).copied()
  }

  fn report(&self) {
    let frames = self.frame_count.max(1);
    let avg_total = self
      .acc_times
      .get(TOTAL_BUCKET)
      .map(|t| t.as_secs_f64() / frames as f64)
      .unwrap_or(0.0);
    let fps = if avg_total > 0.0 { 1.0 / avg_total } else { 0.0 };

    let stages: Vec<String> = self
      .acc_times
      .iter()
      .map(|(name, total)| {
        format!(
          "{}: {:.1}ms",
          name,
          total.as_secs_f64() * 1000.0 / frames as f64
        )
      })
      .collect();

    info!(
      "[{} 帧统计] 实际帧率: {:.1} | {}",
      self.frame_count,
      fps,
      stages.join(" | ")
    );
  }
}

struct StageTimerInner<'a> {
  profiler: &'a mut Profiler,
  name: &'static str,
  start: Instant,
}

/// `Profiler::measure` 返回的作用域守卫
pub struct StageTimer<'a> {
  inner: Option<StageTimerInner<'a>>,
}

impl Drop for StageTimer<'_> {
  fn drop(&mut self) {
    if let Some(inner) = self.inner.take() {
      *inner.profiler.acc_times.entry(inner.name).or_default() += inner.start.elapsed();
    }
  }
}
