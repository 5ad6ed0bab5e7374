// 该文件是 Kuijian（盔检）项目的一部分。
// src/task.rs - 检测循环编排
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

//! # 检测循环编排
//!
//! 单线程同步循环：读帧 → 信箱变换 + 推理 → 解码 → 防抖（告警）→
//! 叠加绘制 → 推流。可变状态（防抖计数、性能统计）集中在
//! `Pipeline` 里由循环单写。推理超时跳过当前帧继续；解码错误说明
//! 模型与类别目录不匹配，中止循环。任何退出路径都先关会话再关推流。

use std::sync::mpsc::Receiver;

use anyhow::Result;
use tracing::{info, warn};

use crate::alert::AlertSender;
use crate::catalog::ClassCatalog;
use crate::debounce::{DebounceDecision, Debouncer};
use crate::decode::{self, DetectionMap};
use crate::device::Device;
use crate::draw::Overlay;
use crate::error::PipelineError;
use crate::input::Frame;
use crate::profiler::Profiler;
use crate::session::Session;
use crate::sink::FrameSink;

/// 循环结束时的汇总
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopSummary {
  pub frames: u64,
  pub detections: u64,
  pub alerts: u64,
  pub timeouts: u64,
}

/// 检测管线：编排循环持有的全部可变状态
pub struct Pipeline<D: Device> {
  pub session: Session<D>,
  pub catalog: ClassCatalog,
  pub overlay: Overlay,
  pub debouncer: Debouncer,
  pub profiler: Profiler,
  pub sender: Option<AlertSender>,
  /// 告警载荷主类别的目录索引
  pub primary_class: usize,
}

impl<D: Device> Pipeline<D> {
  /// 运行检测循环直到流结束、达到帧数上限或收到停止信号。
  ///
  /// 无论循环如何退出，先关闭推理会话、再关闭推流输出。
  pub fn run(
    mut self,
    frames: impl Iterator<Item = Result<Frame>>,
    sink: &mut dyn FrameSink,
    stop: Receiver<()>,
    max_frames: Option<u64>,
  ) -> Result<LoopSummary> {
    let result = self.frame_loop(frames, sink, stop, max_frames);

    if let Err(e) = self.session.close() {
      warn!("关闭推理会话失败: {}", e);
    }
    if let Err(e) = sink.close() {
      warn!("关闭推流输出失败: {}", e);
    }

    result
  }

  fn frame_loop(
    &mut self,
    frames: impl Iterator<Item = Result<Frame>>,
    sink: &mut dyn FrameSink,
    stop: Receiver<()>,
    max_frames: Option<u64>,
  ) -> Result<LoopSummary> {
    let mut summary = LoopSummary::default();

    for frame in frames {
      if stop.try_recv().is_ok() {
        info!("收到停止信号，退出检测循环");
        break;
      }
      if max_frames.map(|n| summary.frames >= n).unwrap_or(false) {
        info!("达到帧数上限 {}，退出检测循环", summary.frames);
        break;
      }

      self.profiler.start_frame();

      let mut frame = match frame {
        Ok(frame) => frame,
        Err(e) => {
          // 一次性读取失败不等于流结束，跳过该帧
          warn!("读取帧失败，跳过: {}", e);
          continue;
        }
      };
      let (src_w, src_h) = (frame.image.width(), frame.image.height());

      let detections = {
        let _t = self.profiler.measure("Infer");
        match self.session.infer(&frame.image) {
          Ok(outcome) => decode::decode(
            outcome.raw,
            outcome.classes,
            &self.catalog,
            &outcome.params,
            src_w,
            src_h,
          )?,
          Err(PipelineError::InferenceTimeout(ms)) => {
            // 超时帧没有检测结果，会话保持可用
            summary.timeouts += 1;
            warn!("第 {} 帧推理超时（{} 毫秒），跳过检测", frame.index, ms);
            DetectionMap::new()
          }
          Err(e) if e.is_recoverable() => {
            warn!("第 {} 帧推理失败，跳过: {}", frame.index, e);
            DetectionMap::new()
          }
          Err(e) => return Err(e.into()),
        }
      };

      let total = decode::total_detections(&detections);
      summary.detections += total as u64;

      // 防抖决策在绘制之前，告警快照是未标注的原始帧
      if self.debouncer.observe(total) == DebounceDecision::Emit {
        summary.alerts += 1;
        let primary = detections
          .get(&self.primary_class)
          .map_or(0, Vec::len);
        info!(
          "检出事件: 共 {} 个目标，主类别 {} 个，进入抑制窗口",
          total, primary
        );
        if let Some(sender) = &self.sender {
          let _t = self.profiler.measure("Alert");
          sender.send_event(&frame.image, total, primary);
        }
      }

      {
        let _t = self.profiler.measure("Draw");
        self
          .overlay
          .draw_detections(&mut frame.image, &detections, &self.catalog);
      }

      {
        let _t = self.profiler.measure("Send");
        if let Err(e) = sink.write_frame(&frame.image) {
          warn!("{}", e);
        }
      }

      summary.frames += 1;
      self.profiler.end_frame();
    }

    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::device::{ScriptedBox, StubDevice};
  use crate::sink::NullSink;
  use image::RgbImage;
  use std::sync::mpsc;

  fn frames(n: u64) -> impl Iterator<Item = Result<Frame>> {
    (0..n).map(|index| {
      Ok(Frame {
        image: RgbImage::new(320, 240),
        index,
        timestamp_ms: index * 33,
      })
    })
  }

  fn pipeline(device: StubDevice, window: u32) -> Pipeline<StubDevice> {
    Pipeline {
      session: Session::open(device, 1000).unwrap(),
      catalog: ClassCatalog::from_labels(&["helmet", "no_helmet"]),
      overlay: Overlay::new(),
      debouncer: Debouncer::new(window),
      profiler: Profiler::disabled(),
      sender: None,
      primary_class: 1,
    }
  }

  #[test]
  fn continuous_detection_yields_single_alert_per_window() {
    let device = StubDevice::new(2).with_script(vec![ScriptedBox {
      class_index: 1,
      bbox: [0.2, 0.2, 0.4, 0.4],
      score: 0.9,
    }]);
    let (_tx, rx) = mpsc::channel();
    let mut sink = NullSink::new();

    let summary = pipeline(device, 100)
      .run(frames(10), &mut sink, rx, None)
      .unwrap();

    assert_eq!(summary.frames, 10);
    assert_eq!(summary.detections, 10);
    // 持续检出在窗口内只告警一次
    assert_eq!(summary.alerts, 1);
    assert_eq!(sink.frames_written(), 10);
  }

  #[test]
  fn max_frames_caps_the_loop() {
    let device = StubDevice::new(2);
    let (_tx, rx) = mpsc::channel();
    let mut sink = NullSink::new();

    let summary = pipeline(device, 10)
      .run(frames(100), &mut sink, rx, Some(7))
      .unwrap();
    assert_eq!(summary.frames, 7);
  }

  #[test]
  fn stop_signal_ends_the_loop() {
    let device = StubDevice::new(2);
    let (tx, rx) = mpsc::channel();
    tx.send(()).unwrap();
    let mut sink = NullSink::new();

    let summary = pipeline(device, 10)
      .run(frames(100), &mut sink, rx, None)
      .unwrap();
    assert_eq!(summary.frames, 0);
  }

  #[test]
  fn timeouts_skip_detections_but_keep_looping() {
    // 会话超时小于桩设备的模拟时延，每帧都超时
    let device = StubDevice::new(2)
      .with_script(vec![ScriptedBox {
        class_index: 1,
        bbox: [0.2, 0.2, 0.4, 0.4],
        score: 0.9,
      }])
      .with_latency(std::time::Duration::from_millis(50));
    let pipeline = Pipeline {
      session: Session::open(device, 10).unwrap(),
      catalog: ClassCatalog::from_labels(&["helmet", "no_helmet"]),
      overlay: Overlay::new(),
      debouncer: Debouncer::new(10),
      profiler: Profiler::disabled(),
      sender: None,
      primary_class: 1,
    };

    let (_tx, rx) = mpsc::channel();
    let mut sink = NullSink::new();
    let summary = pipeline.run(frames(5), &mut sink, rx, None).unwrap();

    assert_eq!(summary.frames, 5);
    assert_eq!(summary.timeouts, 5);
    assert_eq!(summary.detections, 0);
    assert_eq!(summary.alerts, 0);
  }

  #[test]
  fn catalog_mismatch_aborts_the_loop() {
    // 模型输出 3 个类别，目录只有 2 个
    let device = StubDevice::new(3);
    let (_tx, rx) = mpsc::channel();
    let mut sink = NullSink::new();

    let result = pipeline(device, 10).run(frames(3), &mut sink, rx, None);
    assert!(result.is_err());
  }
}
