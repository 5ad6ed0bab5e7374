// 该文件是 Kuijian（盔检）项目的一部分。
// src/device.rs - 加速器设备抽象
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

//! # 加速器设备抽象
//!
//! 推理会话通过 `Device` 特征与具体加速器解耦：提交是异步的，
//! 等待由作业句柄承担并带超时。真实 NPU 绑定、回放桩设备与
//! 工作线程包装都实现同一特征，会话状态机因此可以脱离硬件测试。

use std::time::Duration;

use thiserror::Error;

use crate::error::PipelineError;

mod stub;
mod worker;

pub use stub::{ScriptedBox, StubDevice};
pub use worker::{BlockingInfer, WorkerDevice};

/// 模型输入张量形状，(H, W, C)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
  pub height: u32,
  pub width: u32,
  pub channels: u32,
}

impl InputShape {
  pub fn byte_len(&self) -> usize {
    self.height as usize * self.width as usize * self.channels as usize
  }
}

/// 作业等待阶段的错误
#[derive(Error, Debug)]
pub enum JobError {
  #[error("作业等待超时")]
  TimedOut,
  #[error("设备错误: {0}")]
  Device(String),
}

/// 一次已提交的推理作业。
///
/// `wait` 在限定时间内阻塞，成功时把结果写入 `out`；
/// 超时后作业被丢弃，设备本身保持可用。
pub trait InferJob {
  fn wait(self: Box<Self>, timeout: Duration, out: &mut [f32]) -> Result<(), JobError>;
}

/// 加速器设备。
///
/// 打开设备由各实现的构造函数承担（占用失败报
/// `DeviceUnavailable`，模型无效报 `ModelLoadError`）；
/// 特征本身只覆盖形状查询与作业提交。
pub trait Device {
  /// 设备标识，日志使用
  fn name(&self) -> &'static str;

  /// 模型固定输入形状
  fn input_shape(&self) -> InputShape;

  /// 输出缓冲区的 f32 数量
  fn output_len(&self) -> usize;

  /// 模型输出覆盖的类别数
  fn num_classes(&self) -> usize;

  /// 提交一帧 NHWC u8 输入，返回作业句柄
  fn submit(&mut self, input: &[u8]) -> Result<Box<dyn InferJob>, PipelineError>;

  /// 释放设备资源，之后不再提交作业
  fn release(&mut self) {}
}
