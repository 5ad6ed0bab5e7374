// 该文件是 Kuijian（盔检）项目的一部分。
// src/session.rs - 推理会话
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

//! # 推理会话
//!
//! 状态机 `Ready → (Running)* → Closed`。打开时查询模型固定形状并
//! 一次性分配输入/输出缓冲区；每帧把源图像信箱式写入输入缓冲区
//! （原地写入，不做逐帧分配），提交异步作业并限时等待。超时后当
//! 前帧不产生检测结果，会话保持 `Ready` 可继续下一帧。

use std::time::Duration;

use image::RgbImage;
use tracing::{debug, info};

use crate::device::{Device, JobError};
use crate::error::PipelineError;
use crate::letterbox::{self, LetterboxParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
  Ready,
  Closed,
}

/// 一次成功推理的结果视图。
///
/// `raw` 指向会话内部的输出缓冲区，仅在下一次 `infer` 之前有效，
/// 调用方必须在下一帧前完成解码。
pub struct InferOutcome<'a> {
  /// 原始输出缓冲（按类别分组的记录流）
  pub raw: &'a [f32],
  /// 模型输出覆盖的类别数
  pub classes: usize,
  /// 本帧的信箱变换参数，供解码器逆变换使用
  pub params: LetterboxParams,
}

/// 推理会话，持有设备句柄与固定缓冲区
pub struct Session<D: Device> {
  device: D,
  timeout: Duration,
  timeout_ms: u64,
  input: Box<[u8]>,
  output: Box<[f32]>,
  state: SessionState,
}

impl<D: Device> Session<D> {
  /// 打开会话：校验模型形状，分配固定缓冲区，进入 `Ready`。
  ///
  /// 设备占用失败与模型无效的错误由设备构造函数给出，
  /// 这里只拒绝形状不可用的模型。
  pub fn open(device: D, timeout_ms: u64) -> Result<Self, PipelineError> {
    let shape = device.input_shape();
    if shape.height == 0 || shape.width == 0 || shape.channels == 0 {
      return Err(PipelineError::ModelLoadError(format!(
        "模型输入形状不可用: {:?}",
        shape
      )));
    }
    if device.output_len() == 0 || device.num_classes() == 0 {
      return Err(PipelineError::ModelLoadError(format!(
        "模型输出不可用: 长度 {}, 类别数 {}",
        device.output_len(),
        device.num_classes()
      )));
    }

    let input = vec![0u8; shape.byte_len()].into_boxed_slice();
    let output = vec![0f32; device.output_len()].into_boxed_slice();
    info!(
      "推理会话就绪: 设备 {}, 输入 {}x{}x{}, 输出 {} 个值, 超时 {} 毫秒",
      device.name(),
      shape.height,
      shape.width,
      shape.channels,
      output.len(),
      timeout_ms
    );

    Ok(Self {
      device,
      timeout: Duration::from_millis(timeout_ms),
      timeout_ms,
      input,
      output,
      state: SessionState::Ready,
    })
  }

  /// 对一帧图像执行推理。
  ///
  /// 超时返回 `InferenceTimeout`，此时输出缓冲里的陈旧数据不会被
  /// 当作本帧结果返回；会话保持 `Ready`，下一帧可以重试。
  pub fn infer(&mut self, image: &RgbImage) -> Result<InferOutcome<'_>, PipelineError> {
    if self.state == SessionState::Closed {
      return Err(PipelineError::SessionClosed);
    }

    let shape = self.device.input_shape();
    let params = letterbox::forward_into(image, &mut self.input, shape.width, shape.height)?;

    debug!("提交推理作业");
    let job = self.device.submit(&self.input)?;
    match job.wait(self.timeout, &mut self.output) {
      Ok(()) => Ok(InferOutcome {
        raw: &self.output,
        classes: self.device.num_classes(),
        params,
      }),
      Err(JobError::TimedOut) => Err(PipelineError::InferenceTimeout(self.timeout_ms)),
      Err(JobError::Device(msg)) => Err(PipelineError::DeviceUnavailable(msg)),
    }
  }

  /// 关闭会话并释放设备，之后任何调用返回 `SessionClosed`。
  pub fn close(&mut self) -> Result<(), PipelineError> {
    if self.state == SessionState::Closed {
      return Err(PipelineError::SessionClosed);
    }
    self.device.release();
    self.state = SessionState::Closed;
    info!("推理会话已关闭");
    Ok(())
  }

  pub fn is_closed(&self) -> bool {
    self.state == SessionState::Closed
  }
}

impl<D: Device> Drop for Session<D> {
  fn drop(&mut self) {
    if self.state != SessionState::Closed {
      self.device.release();
      self.state = SessionState::Closed;
    }
  }
}
