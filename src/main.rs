// 该文件是 Kuijian（盔检）项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Kuijian Group

mod args;

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use kuijian::alert::AlertSender;
use kuijian::catalog::ClassCatalog;
use kuijian::config::AppConfig;
use kuijian::debounce::Debouncer;
use kuijian::device::StubDevice;
use kuijian::draw::Overlay;
use kuijian::input::{FrameSourceType, create_frame_source};
use kuijian::profiler::Profiler;
use kuijian::session::Session;
use kuijian::sink::{FrameSink, HlsSink, NullSink};
use kuijian::task::Pipeline;

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let config = AppConfig::load(Path::new(&args.config))?;

  info!("Kuijian 安全帽检测");
  info!("设备编号: {}", config.device_id);
  info!("模型文件路径: {}", config.model.path.display());
  info!("类别目录: {}", config.model.classes_path.display());

  // 类别目录与主类别
  let catalog = ClassCatalog::load(&config.model.classes_path)?;
  let primary_class = catalog
    .index_of(&config.model.primary_label)
    .with_context(|| {
      format!("类别目录中找不到主类别 \"{}\"", config.model.primary_label)
    })?;
  info!(
    "已加载 {} 个类别，主类别 \"{}\" (索引 {})",
    catalog.len(),
    config.model.primary_label,
    primary_class
  );

  // 推理设备与会话
  let device = match args.device.as_str() {
    "stub" => StubDevice::open(&config.model.path, catalog.len())?,
    other => bail!("不支持的推理设备类型: {}", other),
  };
  let session = Session::open(device, config.model.timeout_ms)?;
  info!("推理会话已就绪，超时 {} 毫秒", config.model.timeout_ms);

  // 输入源
  let source = args.input.as_deref().unwrap_or(&config.camera.source);
  let frames = create_frame_source(source, &config.camera)?;
  // 来源报不出帧率时（图片回放）按配置值推流
  let fps = frames.fps().map(|f| f as u32).unwrap_or(config.camera.fps);
  info!(
    "输入源已打开: {} ({}x{} @ {} fps, {})",
    source,
    frames.width(),
    frames.height(),
    fps,
    match frames.source_type() {
      FrameSourceType::Image => "图片",
      FrameSourceType::V4l2 => "V4L2 摄像头",
    }
  );

  // 推流输出
  let mut sink: Box<dyn FrameSink> = if config.stream.enable {
    let hls = HlsSink::open(
      &config.stream.output_path,
      frames.width(),
      frames.height(),
      fps,
    )?;
    info!("HLS 推流已开启: {}", config.stream.output_path);
    Box::new(hls)
  } else {
    Box::new(NullSink::new())
  };

  // 告警上报
  let sender = if config.server.send && !args.no_send {
    info!("告警上报已开启: {}", config.server.url);
    Some(AlertSender::new(
      &config.server.url,
      &config.server.token,
      &config.device_id,
    ))
  } else {
    info!("告警上报已关闭");
    None
  };

  // 中断信号
  let (tx, rx) = std::sync::mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .expect("Error setting Ctrl-C handler");

  let pipeline = Pipeline {
    session,
    catalog,
    overlay: Overlay::new(),
    debouncer: Debouncer::new(config.suppress_window_frames()),
    profiler: Profiler::new(config.log.enable, config.log_window_frames()),
    sender,
    primary_class,
  };

  let max_frames = (args.max_frames > 0).then_some(args.max_frames);
  let summary = pipeline.run(frames, sink.as_mut(), rx, max_frames)?;

  info!(
    "处理完成: 共 {} 帧，检出 {} 个目标，告警 {} 次，超时 {} 次",
    summary.frames, summary.detections, summary.alerts, summary.timeouts
  );

  Ok(())
}
