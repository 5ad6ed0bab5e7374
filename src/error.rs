// 该文件是 Kuijian（盔检）项目的一部分。
// src/error.rs - 管线错误类型
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

use thiserror::Error;

/// 检测管线的错误分类。
///
/// 启动类错误（设备、模型）是致命的；逐帧错误中只有 `DecodeError`
/// 会中止循环（模型与类别目录不匹配），其余错误跳过当前帧继续运行。
#[derive(Error, Debug)]
pub enum PipelineError {
  /// 输入帧尺寸退化（宽或高为 0）
  #[error("无效帧: {0}")]
  InvalidFrame(String),

  /// 无法占用加速器设备
  #[error("加速器设备不可用: {0}")]
  DeviceUnavailable(String),

  /// 模型文件无效或形状不可用
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),

  /// 推理在限定时间内未完成，当前帧不产生检测结果
  #[error("推理超时（{0} 毫秒）")]
  InferenceTimeout(u64),

  /// 会话关闭后仍被调用，属于编程错误
  #[error("推理会话已关闭")]
  SessionClosed,

  /// 输出缓冲无法按类别目录解释
  #[error("检测结果解码错误: {0}")]
  DecodeError(String),

  /// 事件上报失败，仅记录日志，不向循环传播
  #[error("事件上报失败: {0}")]
  TransmitError(String),

  /// 推流写入失败，仅记录日志，循环继续
  #[error("推流写入失败: {0}")]
  SinkWriteError(String),
}

impl PipelineError {
  /// 逐帧阶段里可以跳过当前帧继续运行的错误。
  pub fn is_recoverable(&self) -> bool {
    matches!(
      self,
      PipelineError::InvalidFrame(_)
        | PipelineError::InferenceTimeout(_)
        | PipelineError::TransmitError(_)
        | PipelineError::SinkWriteError(_)
    )
  }
}
