// 该文件是 Kuijian（盔检）项目的一部分。
// src/device/stub.rs - 回放桩设备
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
use std::time::Duration;

use tracing::info;

use crate::device::{Device, InferJob, InputShape, JobError};
use crate::error::PipelineError;

const STUB_SHAPE: InputShape = InputShape {
  height: 640,
  width: 640,
  channels: 3,
};

/// 桩设备每帧回放的一条检测记录
#[derive(Debug, Clone, Copy)]
pub struct ScriptedBox {
  pub class_index: usize,
  /// 归一化 (y1, x1, y2, x2)
  pub bbox: [f32; 4],
  pub score: f32,
}

/// 回放桩设备。
///
/// 不占用任何硬件，每帧按脚本输出同一组检测记录，
/// 输出布局与真实设备一致（按类别分组，组头为记录数）。
/// 用于干跑、集成测试与无加速器的开发机。
pub struct StubDevice {
  shape: InputShape,
  num_classes: usize,
  script: Vec<ScriptedBox>,
  /// 模拟的单帧推理耗时，超过会话超时即触发 `InferenceTimeout`
  latency: Duration,
  released: bool,
}

impl StubDevice {
  pub fn new(num_classes: usize) -> Self {
    Self {
      shape: STUB_SHAPE,
      num_classes,
      script: Vec::new(),
      latency: Duration::ZERO,
      released: false,
    }
  }

  /// 从回放脚本文件构造。每行一条记录：
  /// `类别索引 y1 x1 y2 x2 置信度`，`#` 开头为注释。
  pub fn open(script_path: &Path, num_classes: usize) -> Result<Self, PipelineError> {
    let text = std::fs::read_to_string(script_path).map_err(|e| {
      PipelineError::ModelLoadError(format!("无法读取回放脚本 {}: {}", script_path.display(), e))
    })?;

    let mut script = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }
      let fields: Vec<&str> = line.split_whitespace().collect();
      if fields.len() != 6 {
        return Err(PipelineError::ModelLoadError(format!(
          "回放脚本第 {} 行应有 6 个字段，实际 {} 个",
          lineno + 1,
          fields.len()
        )));
      }
      let parse_f32 = |s: &str| {
        s.parse::<f32>().map_err(|_| {
          PipelineError::ModelLoadError(format!("回放脚本第 {} 行数值无效: {}", lineno + 1, s))
        })
      };
      let class_index = fields[0].parse::<usize>().map_err(|_| {
        PipelineError::ModelLoadError(format!(
          "回放脚本第 {} 行类别索引无效: {}",
          lineno + 1,
          fields[0]
        ))
      })?;
      script.push(ScriptedBox {
        class_index,
        bbox: [
          parse_f32(fields[1])?,
          parse_f32(fields[2])?,
          parse_f32(fields[3])?,
          parse_f32(fields[4])?,
        ],
        score: parse_f32(fields[5])?,
      });
    }

    info!(
      "回放桩设备已就绪: {} 条记录, {} 个类别",
      script.len(),
      num_classes
    );
    Ok(Self::new(num_classes).with_script(script))
  }

  pub fn with_script(mut self, script: Vec<ScriptedBox>) -> Self {
    self.script = script;
    self
  }

  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }

  pub fn with_shape(mut self, shape: InputShape) -> Self {
    self.shape = shape;
    self
  }

  /// 按设备输出布局编码脚本：每个类别一个组，组头为记录数，
  /// 后接该类的 `(y1, x1, y2, x2, score)` 记录。
  fn encode_output(&self) -> Vec<f32> {
    let mut out = Vec::with_capacity(self.output_len());
    for class in 0..self.num_classes {
      let records: Vec<&ScriptedBox> = self
        .script
        .iter()
        .filter(|b| b.class_index == class)
        .collect();
      out.push(records.len() as f32);
      for b in records {
        out.extend_from_slice(&b.bbox);
        out.push(b.score);
      }
    }
    out
  }
}

struct StubJob {
  output: Vec<f32>,
  latency: Duration,
}

impl InferJob for StubJob {
  fn wait(self: Box<Self>, timeout: Duration, out: &mut [f32]) -> Result<(), JobError> {
    if self.latency > timeout {
      return Err(JobError::TimedOut);
    }
    if self.output.len() != out.len() {
      return Err(JobError::Device(format!(
        "输出长度不一致: {} != {}",
        self.output.len(),
        out.len()
      )));
    }
    out.copy_from_slice(&self.output);
    Ok(())
  }
}

impl Device for StubDevice {
  fn name(&self) -> &'static str {
    "stub"
  }

  fn input_shape(&self) -> InputShape {
    self.shape
  }

  fn output_len(&self) -> usize {
    self.num_classes + self.script.len() * 5
  }

  fn num_classes(&self) -> usize {
    self.num_classes
  }

  fn submit(&mut self, input: &[u8]) -> Result<Box<dyn InferJob>, PipelineError> {
    if self.released {
      return Err(PipelineError::DeviceUnavailable(
        "桩设备已释放".to_string(),
      ));
    }
    debug_assert_eq!(input.len(), self.shape.byte_len());
    Ok(Box::new(StubJob {
      output: self.encode_output(),
      latency: self.latency,
    }))
  }

  fn release(&mut self) {
    self.released = true;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encodes_grouped_by_class() {
    let device = StubDevice::new(2).with_script(vec![
      ScriptedBox {
        class_index: 1,
        bbox: [0.1, 0.2, 0.3, 0.4],
        score: 0.9,
      },
      ScriptedBox {
        class_index: 1,
        bbox: [0.5, 0.5, 0.6, 0.6],
        score: 0.8,
      },
    ]);
    let out = device.encode_output();
    // 类别 0: 组头 0；类别 1: 组头 2 + 两条记录
    assert_eq!(out[0], 0.0);
    assert_eq!(out[1], 2.0);
    assert_eq!(out.len(), 2 + 10);
    assert_eq!(out[2..6], [0.1, 0.2, 0.3, 0.4]);
    assert_eq!(out[6], 0.9);
  }

  #[test]
  fn open_rejects_malformed_script() {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "1 0.1 0.2 0.3\n").unwrap();
    match StubDevice::open(file.path(), 2) {
      Err(PipelineError::ModelLoadError(_)) => {}
      other => panic!("期望 ModelLoadError，实际: {:?}", other.map(|_| ())),
    }
  }

  #[test]
  fn open_missing_script_is_model_load_error() {
    match StubDevice::open(Path::new("/nonexistent/replay.txt"), 2) {
      Err(PipelineError::ModelLoadError(_)) => {}
      other => panic!("期望 ModelLoadError，实际: {:?}", other.map(|_| ())),
    }
  }
}
