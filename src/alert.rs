// 该文件是 Kuijian（盔检）项目的一部分。
// src/alert.rs - 告警上报
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

use std::io::Cursor;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::RgbImage;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::PipelineError;

/// 收集端超时，远端不可达时不能拖慢帧循环
const SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// 上报载荷，字段名与收集端接口保持一致
#[derive(Debug, Serialize)]
struct AlertPayload {
  #[serde(rename = "deviceId")]
  device_id: String,
  #[serde(rename = "totalDetections")]
  total_detections: usize,
  /// 主类别（默认 no_helmet）的检出数，接口沿用历史字段名
  #[serde(rename = "noHelmetCount")]
  no_helmet_count: usize,
  /// `data:image/jpeg;base64,...` 形式的帧快照
  image: String,
}

/// 告警发送器。
///
/// 发射后不管：传输失败只记录日志，不重试也不回滚防抖窗口。
pub struct AlertSender {
  agent: ureq::Agent,
  url: String,
  token: String,
  device_id: String,
}

impl AlertSender {
  pub fn new(url: &str, token: &str, device_id: &str) -> Self {
    let agent = ureq::AgentBuilder::new().timeout(SEND_TIMEOUT).build();
    Self {
      agent,
      url: url.to_string(),
      token: token.to_string(),
      device_id: device_id.to_string(),
    }
  }

  /// 发送一次事件告警，结果只体现在日志里。
  pub fn send_event(&self, frame: &RgbImage, total: usize, primary_count: usize) {
    let body = match self.build_payload(frame, total, primary_count) {
      Ok(body) => body,
      Err(e) => {
        warn!("{}", e);
        return;
      }
    };

    match self.post(&body) {
      Ok(status) => info!("事件上报完成 (status: {})", status),
      Err(e) => warn!("{}", e),
    }
  }

  fn post(&self, body: &str) -> Result<u16, PipelineError> {
    let mut request = self
      .agent
      .post(&self.url)
      .set("Content-Type", "application/json");
    if !self.token.is_empty() {
      request = request.set("Authorization", &self.token);
    }

    match request.send_string(body) {
      Ok(resp) => Ok(resp.status()),
      Err(ureq::Error::Status(code, _)) => Err(PipelineError::TransmitError(format!(
        "收集端返回 {}",
        code
      ))),
      Err(e) => Err(PipelineError::TransmitError(e.to_string())),
    }
  }

  fn build_payload(
    &self,
    frame: &RgbImage,
    total: usize,
    primary_count: usize,
  ) -> Result<String, PipelineError> {
    let image = encode_jpeg_data_uri(frame)?;
    let payload = AlertPayload {
      device_id: self.device_id.clone(),
      total_detections: total,
      no_helmet_count: primary_count,
      image,
    };
    serde_json::to_string(&payload).map_err(|e| PipelineError::TransmitError(e.to_string()))
  }
}

/// 把帧编码成 `data:image/jpeg;base64,...` 字符串
fn encode_jpeg_data_uri(frame: &RgbImage) -> Result<String, PipelineError> {
  let mut buffer = Cursor::new(Vec::new());
  frame
    .write_to(&mut buffer, image::ImageFormat::Jpeg)
    .map_err(|e| PipelineError::TransmitError(format!("JPEG 编码失败: {}", e)))?;
  Ok(format!(
    "data:image/jpeg;base64,{}",
    STANDARD.encode(buffer.into_inner())
  ))
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn payload_carries_counts_and_data_uri() {
    let sender = AlertSender::new("http://collector.local/event", "token", "camera01");
    let frame = RgbImage::from_pixel(32, 24, Rgb([200, 10, 10]));
    let body = sender.build_payload(&frame, 3, 2).unwrap();

    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["deviceId"], "camera01");
    assert_eq!(value["totalDetections"], 3);
    assert_eq!(value["noHelmetCount"], 2);
    let image = value["image"].as_str().unwrap();
    assert!(image.starts_with("data:image/jpeg;base64,"));
    // base64 体非空且可解码
    let encoded = image.trim_start_matches("data:image/jpeg;base64,");
    assert!(!STANDARD.decode(encoded).unwrap().is_empty());
  }

  #[test]
  fn unreachable_collector_is_transmit_error() {
    let sender = AlertSender::new("http://127.0.0.1:9/never", "", "camera01");
    match sender.post("{}") {
      Err(PipelineError::TransmitError(_)) => {}
      other => panic!("期望 TransmitError，实际: {:?}", other.ok()),
    }
  }
}
