// 该文件是 Kuijian（盔检）项目的一部分。
// src/sink.rs - 推流输出
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

//! # 推流输出
//!
//! 把标注后的帧以 BGR24 裸字节喂给外部 HLS 编码进程（ffmpeg 子进程，
//! 每帧写一次 stdin）。写入是尽力而为的：管道满或进程退出时立刻
//! 失败返回，绝不拖住检测循环。生命周期为循环前打开、循环后关闭。

use std::io::Write;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::{info, warn};

use crate::error::PipelineError;

/// 帧输出槽
pub trait FrameSink {
  /// 写入一帧，失败属于可恢复错误，调用方记录日志后继续
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), PipelineError>;

  /// 关闭输出，循环结束后调用一次
  fn close(&mut self) -> Result<(), PipelineError>;
}

/// 丢弃所有帧的空输出（离线回放 / 测试）
#[derive(Default)]
pub struct NullSink {
  frames: u64,
}

impl NullSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn frames_written(&self) -> u64 {
    self.frames
  }
}

impl FrameSink for NullSink {
  fn write_frame(&mut self, _image: &RgbImage) -> Result<(), PipelineError> {
    self.frames += 1;
    Ok(())
  }

  fn close(&mut self) -> Result<(), PipelineError> {
    Ok(())
  }
}

/// HLS 推流输出：ffmpeg 子进程，stdin 收 BGR24 裸帧
pub struct HlsSink {
  child: Option<Child>,
  stdin: Option<ChildStdin>,
  /// RGB → BGR 转换的复用缓冲，避免逐帧分配
  bgr: Vec<u8>,
  width: u32,
  height: u32,
}

impl HlsSink {
  /// 启动编码进程。输出目录里的陈旧切片会先被清理。
  pub fn open(output_path: &str, width: u32, height: u32, fps: u32) -> Result<Self> {
    cleanup_stale_segments(output_path)?;

    let keyint = format!("keyint={}:min-keyint={}:scenecut=0", fps, fps);
    let child = Command::new("ffmpeg")
      .args(["-loglevel", "error", "-nostats"])
      .args(["-f", "rawvideo", "-pix_fmt", "bgr24"])
      .args(["-s", &format!("{}x{}", width, height)])
      .args(["-r", &fps.to_string()])
      .args(["-i", "pipe:0"])
      .args(["-f", "hls", "-c:v", "libx264", "-pix_fmt", "yuv420p"])
      .args(["-preset", "ultrafast", "-tune", "zerolatency"])
      .args(["-x264opts", &keyint])
      .args(["-an", "-hls_time", "1", "-hls_list_size", "5"])
      .args(["-hls_flags", "delete_segments"])
      .arg(output_path)
      .stdin(Stdio::piped())
      .spawn()
      .context("无法启动 ffmpeg 编码进程")?;

    let mut child = child;
    let stdin = child.stdin.take().context("无法获取编码进程的 stdin")?;
    info!("HLS 编码进程已启动: {} ({}x{}@{})", output_path, width, height, fps);

    Ok(Self {
      child: Some(child),
      stdin: Some(stdin),
      bgr: vec![0u8; (width * height * 3) as usize],
      width,
      height,
    })
  }
}

impl FrameSink for HlsSink {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), PipelineError> {
    let Some(stdin) = self.stdin.as_mut() else {
      return Err(PipelineError::SinkWriteError("编码进程已关闭".to_string()));
    };
    if image.width() != self.width || image.height() != self.height {
      return Err(PipelineError::SinkWriteError(format!(
        "帧尺寸 {}x{} 与推流尺寸 {}x{} 不一致",
        image.width(),
        image.height(),
        self.width,
        self.height
      )));
    }

    // 采集侧约定 BGR 字节序，这里做一次通道交换
    for (src, dst) in image.as_raw().chunks_exact(3).zip(self.bgr.chunks_exact_mut(3)) {
      dst[0] = src[2];
      dst[1] = src[1];
      dst[2] = src[0];
    }

    stdin
      .write_all(&self.bgr)
      .map_err(|e| PipelineError::SinkWriteError(e.to_string()))
  }

  fn close(&mut self) -> Result<(), PipelineError> {
    // 先关 stdin 让编码进程收到 EOF，再等待其退出
    self.stdin.take();
    if let Some(mut child) = self.child.take() {
      match child.wait() {
        Ok(status) if !status.success() => {
          warn!("编码进程非正常退出: {}", status);
        }
        Ok(_) => {}
        Err(e) => return Err(PipelineError::SinkWriteError(e.to_string())),
      }
    }
    Ok(())
  }
}

impl Drop for HlsSink {
  fn drop(&mut self) {
    let _ = self.close();
  }
}

/// 清理输出目录里上一次运行留下的 `*.ts` / `*.m3u8` 切片
fn cleanup_stale_segments(output_path: &str) -> Result<()> {
  let dir = match Path::new(output_path).parent() {
    Some(dir) if !dir.as_os_str().is_empty() => dir,
    _ => return Ok(()),
  };
  if !dir.exists() {
    std::fs::create_dir_all(dir)
      .with_context(|| format!("无法创建推流输出目录: {}", dir.display()))?;
    return Ok(());
  }

  for entry in std::fs::read_dir(dir)? {
    let path = entry?.path();
    let stale = path
      .extension()
      .and_then(|e| e.to_str())
      .map(|e| e == "ts" || e == "m3u8")
      .unwrap_or(false);
    if stale && std::fs::remove_file(&path).is_err() {
      warn!("无法清理陈旧切片: {}", path.display());
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn null_sink_counts_frames() {
    let mut sink = NullSink::new();
    let frame = RgbImage::new(4, 4);
    sink.write_frame(&frame).unwrap();
    sink.write_frame(&frame).unwrap();
    sink.close().unwrap();
    assert_eq!(sink.frames_written(), 2);
  }

  #[test]
  fn stale_segments_are_removed_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let ts = dir.path().join("old0.ts");
    let m3u8 = dir.path().join("stream.m3u8");
    let keep = dir.path().join("notes.txt");
    for p in [&ts, &m3u8, &keep] {
      std::fs::write(p, b"x").unwrap();
    }

    let output = dir.path().join("stream.m3u8");
    cleanup_stale_segments(output.to_str().unwrap()).unwrap();
    assert!(!ts.exists());
    assert!(!m3u8.exists());
    assert!(keep.exists());
  }

  #[test]
  fn missing_output_dir_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("hls").join("stream.m3u8");
    cleanup_stale_segments(output.to_str().unwrap()).unwrap();
    assert!(output.parent().unwrap().is_dir());
  }
}
