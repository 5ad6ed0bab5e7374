// 该文件是 Kuijian（盔检）项目的一部分。
// src/debounce.rs - 事件防抖
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

/// 一帧观察的防抖结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceDecision {
  /// 新事件，发出告警并开启抑制窗口
  Emit,
  /// 检出持续但窗口未结束，不发出
  Suppressed,
  /// 无检出（窗口计数在内部递减）
  Idle,
}

/// 事件防抖状态机。
///
/// 单一计数器，单一写者（编排循环）。窗口以帧数计，不随持续检出
/// 延长或重置；检出消失满一个窗口后立刻允许下一次告警。告警发送
/// 失败不回滚窗口，收集端故障时不会形成告警风暴。
#[derive(Debug)]
pub struct Debouncer {
  suppress_window: u32,
  suppress_remaining: u32,
}

impl Debouncer {
  /// `suppress_window` 为抑制窗口的帧数（配置秒数 × 帧率）
  pub fn new(suppress_window: u32) -> Self {
    Self {
      suppress_window,
      suppress_remaining: 0,
    }
  }

  /// 每帧调用一次，输入该帧所有类别的检出总数。
  pub fn observe(&mut self, total_detections: usize) -> DebounceDecision {
    if total_detections > 0 {
      if self.suppress_remaining == 0 {
        self.suppress_remaining = self.suppress_window;
        return DebounceDecision::Emit;
      }
      return DebounceDecision::Suppressed;
    }

    if self.suppress_remaining > 0 {
      self.suppress_remaining -= 1;
    }
    DebounceDecision::Idle
  }

  pub fn suppress_remaining(&self) -> u32 {
    self.suppress_remaining
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn run(window: u32, counts: &[usize]) -> Vec<usize> {
    let mut debouncer = Debouncer::new(window);
    counts
      .iter()
      .enumerate()
      .filter(|&(_, &n)| debouncer.observe(n) == DebounceDecision::Emit)
      .map(|(i, _)| i)
      .collect()
  }

  #[test]
  fn continuous_detection_emits_once_per_window() {
    // 窗口内持续检出只发一次；窗口不被持续检出延长，
    // 因此窗口计满后的下一次检出立即发出
    let emitted = run(3, &[5, 5, 5, 5, 0, 0, 0, 5]);
    assert_eq!(emitted, vec![0, 7]);
  }

  #[test]
  fn short_gap_does_not_reopen_window() {
    // 间隔 2 帧零检出（小于窗口 3）不会打开新窗口
    let emitted = run(3, &[0, 2, 2, 0, 0, 5, 0, 0, 0, 1]);
    assert_eq!(emitted.len(), 2);
    assert_eq!(emitted[0], 1);
    assert_eq!(emitted[1], 9);
  }

  #[test]
  fn window_reopens_after_exactly_window_zero_frames() {
    let mut debouncer = Debouncer::new(2);
    assert_eq!(debouncer.observe(1), DebounceDecision::Emit);
    assert_eq!(debouncer.observe(0), DebounceDecision::Idle);
    assert_eq!(debouncer.observe(0), DebounceDecision::Idle);
    // 恰好 2 个零检出帧之后窗口关闭
    assert_eq!(debouncer.suppress_remaining(), 0);
    assert_eq!(debouncer.observe(3), DebounceDecision::Emit);
  }

  #[test]
  fn suppressed_frames_do_not_extend_window() {
    let mut debouncer = Debouncer::new(2);
    assert_eq!(debouncer.observe(1), DebounceDecision::Emit);
    assert_eq!(debouncer.observe(1), DebounceDecision::Suppressed);
    assert_eq!(debouncer.suppress_remaining(), 2);
    assert_eq!(debouncer.observe(0), DebounceDecision::Idle);
    assert_eq!(debouncer.observe(0), DebounceDecision::Idle);
    assert_eq!(debouncer.observe(2), DebounceDecision::Emit);
  }

  // 不依赖状态机实现的对照：逐帧模拟计数器语义
  fn reference_emissions(window: u32, counts: &[usize]) -> Vec<usize> {
    let mut remaining = 0u32;
    let mut emitted = Vec::new();
    for (i, &n) in counts.iter().enumerate() {
      if n > 0 {
        if remaining == 0 {
          remaining = window;
          emitted.push(i);
        }
      } else if remaining > 0 {
        remaining -= 1;
      }
    }
    emitted
  }

  #[test]
  fn emissions_match_reference_over_generated_sequences() {
    // 线性同余生成器，序列可复现
    let mut seed = 0x2545_f491u64;
    let mut next = move || {
      seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
      (seed >> 33) as usize
    };

    for window in [1u32, 2, 3, 5, 30] {
      for _ in 0..40 {
        let counts: Vec<usize> = (0..64).map(|_| next() % 4).collect();
        assert_eq!(
          run(window, &counts),
          reference_emissions(window, &counts),
          "窗口 {} 序列 {:?}",
          window,
          counts
        );
      }
    }
  }

  #[test]
  fn idle_below_zero_is_a_noop() {
    let mut debouncer = Debouncer::new(3);
    for _ in 0..10 {
      assert_eq!(debouncer.observe(0), DebounceDecision::Idle);
    }
    assert_eq!(debouncer.suppress_remaining(), 0);
  }
}
