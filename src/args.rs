// 该文件是 Kuijian（盔检）项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Kuijian Group

use clap::Parser;

/// Kuijian 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 配置文件路径
  #[arg(long, default_value = "config/config.toml", value_name = "FILE")]
  pub config: String,

  /// 输入来源（覆盖配置文件中的摄像头来源）
  /// 支持格式:
  /// - 图片: *.jpg, *.jpeg, *.png, *.bmp, *.webp，或图片目录
  /// - V4L2: /dev/video0 或 v4l2:///dev/video0
  #[arg(long, value_name = "SOURCE")]
  pub input: Option<String>,

  /// 推理设备类型（目前支持 stub 回放设备）
  #[arg(long, default_value = "stub", value_name = "DEVICE")]
  pub device: String,

  /// 关闭告警上报（即使配置文件开启）
  #[arg(long)]
  pub no_send: bool,

  /// 最大处理帧数（0 表示无限制）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_frames: u64,
}
