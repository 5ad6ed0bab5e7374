// 该文件是 Kuijian（盔检）项目的一部分。
// src/device/worker.rs - 工作线程设备包装
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

use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{info, warn};

use crate::device::{Device, InferJob, InputShape, JobError};
use crate::error::PipelineError;

/// 阻塞式推理调用：输入 NHWC u8 帧，把结果写进输出缓冲
pub type BlockingInfer = Box<dyn FnMut(&[u8], &mut [f32]) -> Result<(), String> + Send>;

enum WorkerMsg {
  Job {
    input: Vec<u8>,
    reply: mpsc::Sender<Result<Vec<f32>, String>>,
  },
  Shutdown,
}

/// 把同步的推理调用包装成提交 / 限时等待的异步作业形态。
///
/// 真实加速器驱动的阻塞调用放进专用工作线程，`submit` 立即返回
/// 作业句柄，`wait` 用 `recv_timeout` 限时等待。等待超时后结果
/// 被丢弃在通道里，工作线程与后续帧不受影响。
pub struct WorkerDevice {
  shape: InputShape,
  num_classes: usize,
  output_len: usize,
  job_tx: Option<mpsc::Sender<WorkerMsg>>,
  handle: Option<JoinHandle<()>>,
}

impl WorkerDevice {
  /// 启动工作线程并占用底层设备。
  pub fn spawn(
    shape: InputShape,
    num_classes: usize,
    output_len: usize,
    mut infer: BlockingInfer,
  ) -> Result<Self, PipelineError> {
    if shape.byte_len() == 0 || output_len == 0 {
      return Err(PipelineError::ModelLoadError(format!(
        "模型形状不可用: {:?}, 输出长度 {}",
        shape, output_len
      )));
    }

    let (job_tx, job_rx) = mpsc::channel::<WorkerMsg>();
    let handle = std::thread::Builder::new()
      .name("kuijian-npu".to_string())
      .spawn(move || {
        while let Ok(msg) = job_rx.recv() {
          match msg {
            WorkerMsg::Job { input, reply } => {
              let mut output = vec![0f32; output_len];
              let result = infer(&input, &mut output).map(|_| output);
              // 等待方可能已超时离开，发送失败时丢弃结果即可
              let _ = reply.send(result);
            }
            WorkerMsg::Shutdown => break,
          }
        }
      })
      .map_err(|e| PipelineError::DeviceUnavailable(format!("无法启动推理线程: {}", e)))?;

    info!("推理工作线程已启动, 输入形状 {:?}", shape);
    Ok(Self {
      shape,
      num_classes,
      output_len,
      job_tx: Some(job_tx),
      handle: Some(handle),
    })
  }
}

struct WorkerJob {
  reply_rx: mpsc::Receiver<Result<Vec<f32>, String>>,
}

impl InferJob for WorkerJob {
  fn wait(self: Box<Self>, timeout: Duration, out: &mut [f32]) -> Result<(), JobError> {
    match self.reply_rx.recv_timeout(timeout) {
      Ok(Ok(output)) => {
        if output.len() != out.len() {
          return Err(JobError::Device(format!(
            "输出长度不一致: {} != {}",
            output.len(),
            out.len()
          )));
        }
        out.copy_from_slice(&output);
        Ok(())
      }
      Ok(Err(msg)) => Err(JobError::Device(msg)),
      Err(mpsc::RecvTimeoutError::Timeout) => Err(JobError::TimedOut),
      Err(mpsc::RecvTimeoutError::Disconnected) => {
        Err(JobError::Device("推理线程已退出".to_string()))
      }
    }
  }
}

impl Device for WorkerDevice {
  fn name(&self) -> &'static str {
    "worker"
  }

  fn input_shape(&self) -> InputShape {
    self.shape
  }

  fn output_len(&self) -> usize {
    self.output_len
  }

  fn num_classes(&self) -> usize {
    self.num_classes
  }

  fn submit(&mut self, input: &[u8]) -> Result<Box<dyn InferJob>, PipelineError> {
    let Some(job_tx) = self.job_tx.as_ref() else {
      return Err(PipelineError::DeviceUnavailable(
        "工作线程已释放".to_string(),
      ));
    };

    let (reply_tx, reply_rx) = mpsc::channel();
    job_tx
      .send(WorkerMsg::Job {
        input: input.to_vec(),
        reply: reply_tx,
      })
      .map_err(|_| PipelineError::DeviceUnavailable("推理线程已退出".to_string()))?;
    Ok(Box::new(WorkerJob { reply_rx }))
  }

  fn release(&mut self) {
    if let Some(job_tx) = self.job_tx.take() {
      let _ = job_tx.send(WorkerMsg::Shutdown);
    }
    if let Some(handle) = self.handle.take() {
      if handle.join().is_err() {
        warn!("推理工作线程异常退出");
      }
    }
  }
}

impl Drop for WorkerDevice {
  fn drop(&mut self) {
    self.release();
  }
}
