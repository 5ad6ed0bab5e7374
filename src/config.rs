// 该文件是 Kuijian（盔检）项目的一部分。
// src/config.rs - 运行配置
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

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

const DEFAULT_DEVICE_ID: &str = "camera01";
const DEFAULT_CAMERA_SOURCE: &str = "/dev/video0";
const DEFAULT_CAMERA_WIDTH: u32 = 1280;
const DEFAULT_CAMERA_HEIGHT: u32 = 720;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_TIMEOUT_MS: u64 = 1000;
const DEFAULT_PRIMARY_LABEL: &str = "no_helmet";
const DEFAULT_CLASSES_PATH: &str = "labels/helmet.toml";
const DEFAULT_STREAM_OUTPUT: &str = "hls/stream.m3u8";
const DEFAULT_SUPPRESS_SECONDS: u32 = 2;
const DEFAULT_LOG_SECONDS: u32 = 5;

/// 配置文件结构，所有字段可省略
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
  settings: Option<SettingsSection>,
  camera: Option<CameraSection>,
  model: Option<ModelSection>,
  stream: Option<StreamSection>,
  server: Option<ServerSection>,
  log: Option<LogSection>,
}

#[derive(Debug, Deserialize, Default)]
struct SettingsSection {
  device_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraSection {
  source: Option<String>,
  width: Option<u32>,
  height: Option<u32>,
  fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelSection {
  path: Option<PathBuf>,
  classes_path: Option<PathBuf>,
  timeout_ms: Option<u64>,
  primary_label: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamSection {
  enable: Option<bool>,
  output_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerSection {
  url: Option<String>,
  token: Option<String>,
  send: Option<bool>,
  suppress_seconds: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct LogSection {
  enable: Option<bool>,
  seconds: Option<u32>,
}

/// 解析并校验后的运行配置
#[derive(Debug, Clone)]
pub struct AppConfig {
  pub device_id: String,
  pub camera: CameraSettings,
  pub model: ModelSettings,
  pub stream: StreamSettings,
  pub server: ServerSettings,
  pub log: LogSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
  pub source: String,
  pub width: u32,
  pub height: u32,
  pub fps: u32,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
  pub path: PathBuf,
  pub classes_path: PathBuf,
  pub timeout_ms: u64,
  /// 告警载荷里单独统计的主类别标签，不与任何固定类别索引绑定
  pub primary_label: String,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
  pub enable: bool,
  pub output_path: String,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
  pub url: String,
  pub token: String,
  pub send: bool,
  pub suppress_seconds: u32,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
  pub enable: bool,
  pub seconds: u32,
}

impl AppConfig {
  /// 读取配置文件（缺省路径 `config/config.toml`，文件不存在时使用全部默认值）。
  pub fn load(path: &Path) -> Result<Self> {
    let file_cfg = if path.exists() {
      let text = std::fs::read_to_string(path)
        .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
      toml::from_str(&text).with_context(|| format!("无法解析配置文件: {}", path.display()))?
    } else {
      ConfigFile::default()
    };

    let cfg = Self::from_file(file_cfg);
    cfg.validate()?;
    Ok(cfg)
  }

  fn from_file(file: ConfigFile) -> Self {
    let settings = file.settings.unwrap_or_default();
    let camera = file.camera.unwrap_or_default();
    let model = file.model.unwrap_or_default();
    let stream = file.stream.unwrap_or_default();
    let server = file.server.unwrap_or_default();
    let log = file.log.unwrap_or_default();

    Self {
      device_id: settings
        .device_id
        .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string()),
      camera: CameraSettings {
        source: camera
          .source
          .unwrap_or_else(|| DEFAULT_CAMERA_SOURCE.to_string()),
        width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
        height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
        fps: camera.fps.unwrap_or(DEFAULT_CAMERA_FPS),
      },
      model: ModelSettings {
        path: model.path.unwrap_or_else(|| PathBuf::from("model/helmet.hef")),
        classes_path: model
          .classes_path
          .unwrap_or_else(|| PathBuf::from(DEFAULT_CLASSES_PATH)),
        timeout_ms: model.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        primary_label: model
          .primary_label
          .unwrap_or_else(|| DEFAULT_PRIMARY_LABEL.to_string()),
      },
      stream: StreamSettings {
        enable: stream.enable.unwrap_or(true),
        output_path: stream
          .output_path
          .unwrap_or_else(|| DEFAULT_STREAM_OUTPUT.to_string()),
      },
      server: ServerSettings {
        url: server.url.unwrap_or_default(),
        token: server.token.unwrap_or_default(),
        send: server.send.unwrap_or(false),
        suppress_seconds: server.suppress_seconds.unwrap_or(DEFAULT_SUPPRESS_SECONDS),
      },
      log: LogSettings {
        enable: log.enable.unwrap_or(true),
        seconds: log.seconds.unwrap_or(DEFAULT_LOG_SECONDS),
      },
    }
  }

  fn validate(&self) -> Result<()> {
    if self.camera.width == 0 || self.camera.height == 0 {
      bail!(
        "摄像头分辨率无效: {}x{}",
        self.camera.width,
        self.camera.height
      );
    }
    if self.camera.fps == 0 {
      bail!("摄像头帧率不能为 0");
    }
    if self.model.timeout_ms == 0 {
      bail!("推理超时不能为 0 毫秒");
    }
    if self.server.send && self.server.url.is_empty() {
      bail!("启用事件上报时必须配置 [server] url");
    }
    if self.log.enable && self.log.seconds == 0 {
      bail!("启用性能日志时 [log] seconds 不能为 0");
    }
    Ok(())
  }

  /// 抑制窗口对应的帧数（配置秒数 × 帧率，向上取整到至少 1 帧）
  pub fn suppress_window_frames(&self) -> u32 {
    (self.server.suppress_seconds * self.camera.fps).max(1)
  }

  /// 性能日志窗口对应的帧数
  pub fn log_window_frames(&self) -> u64 {
    (self.log.seconds as u64 * self.camera.fps as u64).max(1)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn missing_file_yields_defaults() {
    let cfg = AppConfig::load(Path::new("/nonexistent/kuijian.toml")).unwrap();
    assert_eq!(cfg.device_id, "camera01");
    assert_eq!(cfg.camera.fps, 30);
    assert!(!cfg.server.send);
    assert_eq!(cfg.suppress_window_frames(), 60);
    assert_eq!(cfg.log_window_frames(), 150);
  }

  #[test]
  fn file_values_override_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"
[settings]
device_id = "site-7"

[camera]
fps = 25

[server]
url = "http://collector.local/event"
send = true
suppress_seconds = 3
"#
    )
    .unwrap();
    let cfg = AppConfig::load(file.path()).unwrap();
    assert_eq!(cfg.device_id, "site-7");
    assert_eq!(cfg.suppress_window_frames(), 75);
    assert!(cfg.server.send);
  }

  #[test]
  fn send_without_url_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[server]\nsend = true\n").unwrap();
    assert!(AppConfig::load(file.path()).is_err());
  }

  #[test]
  fn zero_fps_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[camera]\nfps = 0\n").unwrap();
    assert!(AppConfig::load(file.path()).is_err());
  }
}
