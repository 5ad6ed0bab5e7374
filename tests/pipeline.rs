// 该文件是 Kuijian（盔检）项目的一部分。
// tests/pipeline.rs - 端到端集成测试
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
use std::sync::mpsc;

use anyhow::Result;
use image::RgbImage;

use kuijian::catalog::ClassCatalog;
use kuijian::config::AppConfig;
use kuijian::debounce::Debouncer;
use kuijian::device::{Device, InputShape, StubDevice, WorkerDevice};
use kuijian::draw::Overlay;
use kuijian::input::Frame;
use kuijian::profiler::Profiler;
use kuijian::session::Session;
use kuijian::sink::NullSink;
use kuijian::task::Pipeline;

fn frames(n: u64, width: u32, height: u32) -> impl Iterator<Item = Result<Frame>> {
  (0..n).map(move |index| {
    Ok(Frame {
      image: RgbImage::new(width, height),
      index,
      timestamp_ms: index * 33,
    })
  })
}

fn pipeline<D: Device>(session: Session<D>, catalog: ClassCatalog, window: u32) -> Pipeline<D> {
  let primary_class = catalog.index_of("no_helmet").unwrap();
  Pipeline {
    session,
    catalog,
    overlay: Overlay::new(),
    debouncer: Debouncer::new(window),
    profiler: Profiler::new(true, 4),
    sender: None,
    primary_class,
  }
}

// 仓库自带的回放脚本 + 类别目录跑通整条管线
#[test]
fn shipped_script_and_catalog_run_end_to_end() {
  let catalog = ClassCatalog::load(Path::new("labels/helmet.toml")).unwrap();
  assert_eq!(catalog.len(), 2);
  assert_eq!(catalog.index_of("no_helmet"), Some(1));

  let device = StubDevice::open(Path::new("model/demo.txt"), catalog.len()).unwrap();
  let session = Session::open(device, 1000).unwrap();

  let (_tx, rx) = mpsc::channel();
  let mut sink = NullSink::new();
  let summary = pipeline(session, catalog, 100)
    .run(frames(8, 1280, 720), &mut sink, rx, None)
    .unwrap();

  // 脚本每帧回放 2 条记录，持续检出在窗口内只告警一次
  assert_eq!(summary.frames, 8);
  assert_eq!(summary.detections, 16);
  assert_eq!(summary.alerts, 1);
  assert_eq!(summary.timeouts, 0);
  assert_eq!(sink.frames_written(), 8);
}

// 工作线程设备产出真实布局的输出，经解码后进入告警路径
#[test]
fn worker_device_feeds_the_loop() {
  let shape = InputShape {
    height: 64,
    width: 64,
    channels: 3,
  };
  // 2 个类别：helmet 组空，no_helmet 组一条记录
  let output_len = 2 + 5;
  let device = WorkerDevice::spawn(
    shape,
    2,
    output_len,
    Box::new(|_input: &[u8], out: &mut [f32]| {
      out.copy_from_slice(&[0.0, 1.0, 0.1, 0.2, 0.5, 0.6, 0.9]);
      Ok(())
    }),
  )
  .unwrap();

  let session = Session::open(device, 1000).unwrap();
  let catalog = ClassCatalog::from_labels(&["helmet", "no_helmet"]);

  let (_tx, rx) = mpsc::channel();
  let mut sink = NullSink::new();
  let summary = pipeline(session, catalog, 2)
    .run(frames(6, 320, 240), &mut sink, rx, None)
    .unwrap();

  assert_eq!(summary.frames, 6);
  assert_eq!(summary.detections, 6);
  // 窗口为 2 帧：第 1 帧告警，之后持续检出保持抑制
  assert_eq!(summary.alerts, 1);
}

// 仓库自带的配置示例可以完整解析
#[test]
fn shipped_config_parses() {
  let cfg = AppConfig::load(Path::new("config/config.toml")).unwrap();
  assert_eq!(cfg.device_id, "camera01");
  assert_eq!(cfg.model.primary_label, "no_helmet");
  assert_eq!(cfg.camera.fps, 30);
  assert_eq!(cfg.suppress_window_frames(), 60);
  assert_eq!(cfg.log_window_frames(), 150);
  assert!(!cfg.server.send);
}
