// 该文件是 Huojing （火警） 项目的一部分。
// src/task.rs - 采集循环
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use std::{fmt, thread};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  alert::{AlertOutcome, Notify},
  detector::FireDetector,
  frame::Frame,
  input::{InputError, InputSource, InputSourceType},
  model::{FrameModel, ModelError},
  output::Render,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum AcquisitionError {
  #[error("摄像头读取失败: {0}")]
  Source(#[source] InputError),
  #[error("摄像头意外结束")]
  UnexpectedEnd,
  #[error("检测失败: {0}")]
  Model(#[from] ModelError),
  #[error("输出失败: {0}")]
  Output(#[source] BoxError),
}

/// 会话状态：`Idle → Running → (Exhausted | Stopped)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Idle,
  Running,
  /// 输入源没有更多帧
  Exhausted,
  /// 收到停止信号
  Stopped,
  /// 采集、推理或输出出错
  Failed,
}

impl fmt::Display for SessionState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      SessionState::Idle => "idle",
      SessionState::Running => "running",
      SessionState::Exhausted => "exhausted",
      SessionState::Stopped => "stopped",
      SessionState::Failed => "failed",
    };
    write!(f, "{}", s)
  }
}

/// 协作式停止信号，在每次循环开始时检查
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn stop(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_stopped(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }

  /// 安装 Ctrl-C 处理：触发停止信号，30 秒后仍未退出则强制结束进程。
  pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
    let signal = self.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      signal.stop();
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
  pub state: SessionState,
  pub frames: u64,
  pub detections: usize,
  pub alerts_sent: usize,
}

impl SessionReport {
  fn new() -> Self {
    SessionReport {
      state: SessionState::Running,
      frames: 0,
      detections: 0,
      alerts_sent: 0,
    }
  }
}

/// 单帧处理：检测 → 告警 → 输出
pub struct Pipeline<'a, M, N, O> {
  detector: &'a FireDetector<M>,
  notifier: &'a N,
  output: &'a O,
}

impl<'a, M, N, O> Pipeline<'a, M, N, O>
where
  M: FrameModel,
  N: Notify,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(detector: &'a FireDetector<M>, notifier: &'a N, output: &'a O) -> Self {
    Pipeline {
      detector,
      notifier,
      output,
    }
  }

  fn process(&self, frame: &Frame, report: &mut SessionReport) -> Result<(), AcquisitionError> {
    let now = Instant::now();
    let result = self.detector.detect(&frame.image)?;
    debug!("第 {} 帧推理耗时: {:.2?}", frame.index, now.elapsed());

    report.frames += 1;
    report.detections += result.count;

    if result.has_detections() {
      match self.notifier.notify(&result) {
        AlertOutcome::Sent => report.alerts_sent += 1,
        AlertOutcome::Failed(reason) => warn!("告警邮件未发送: {}", reason),
        AlertOutcome::CoolingDown | AlertOutcome::Skipped => {}
      }
    }

    self
      .output
      .render_result(frame, &result)
      .map_err(|e| AcquisitionError::Output(Box::new(e)))
  }
}

pub trait Task {
  /// 驱动输入源直到结束，返回结束时的状态
  fn run_task<I, M, N, O>(
    &self,
    input: &mut I,
    pipeline: &Pipeline<'_, M, N, O>,
    report: &mut SessionReport,
  ) -> Result<SessionState, AcquisitionError>
  where
    I: InputSource + ?Sized,
    M: FrameModel,
    N: Notify,
    O: Render,
    O::Error: std::error::Error + Send + Sync + 'static;
}

/// 单张图片：只处理一帧
pub struct OneShotTask;

impl Task for OneShotTask {
  fn run_task<I, M, N, O>(
    &self,
    input: &mut I,
    pipeline: &Pipeline<'_, M, N, O>,
    report: &mut SessionReport,
  ) -> Result<SessionState, AcquisitionError>
  where
    I: InputSource + ?Sized,
    M: FrameModel,
    N: Notify,
    O: Render,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    match input.next() {
      Some(Ok(frame)) => pipeline.process(&frame, report)?,
      Some(Err(e)) => warn!("图片解码失败: {}", e),
      None => warn!("没有输入帧"),
    }
    Ok(SessionState::Exhausted)
  }
}

/// 视频文件：逐帧解码直到没有更多帧，解码失败视为结束
pub struct VideoTask;

impl Task for VideoTask {
  fn run_task<I, M, N, O>(
    &self,
    input: &mut I,
    pipeline: &Pipeline<'_, M, N, O>,
    report: &mut SessionReport,
  ) -> Result<SessionState, AcquisitionError>
  where
    I: InputSource + ?Sized,
    M: FrameModel,
    N: Notify,
    O: Render,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    for frame in input {
      match frame {
        Ok(frame) => pipeline.process(&frame, report)?,
        Err(e) => {
          warn!("视频帧解码失败，结束处理: {}", e);
          break;
        }
      }
    }
    Ok(SessionState::Exhausted)
  }
}

/// 摄像头：持续处理直到停止信号被触发
#[derive(Debug, Clone, Default)]
pub struct ContinuousTask {
  stop: StopSignal,
  frame_limit: Option<u64>,
}

impl ContinuousTask {
  pub fn new(stop: StopSignal) -> Self {
    ContinuousTask {
      stop,
      frame_limit: None,
    }
  }

  /// 处理指定帧数后触发停止信号
  pub fn with_frame_limit(mut self, frame_limit: Option<u64>) -> Self {
    self.frame_limit = frame_limit.filter(|&n| n > 0);
    self
  }
}

impl Task for ContinuousTask {
  fn run_task<I, M, N, O>(
    &self,
    input: &mut I,
    pipeline: &Pipeline<'_, M, N, O>,
    report: &mut SessionReport,
  ) -> Result<SessionState, AcquisitionError>
  where
    I: InputSource + ?Sized,
    M: FrameModel,
    N: Notify,
    O: Render,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    loop {
      if self.stop.is_stopped() {
        info!("停止信号已触发，退出任务循环");
        return Ok(SessionState::Stopped);
      }

      let frame = match input.next() {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => return Err(AcquisitionError::Source(e)),
        None => return Err(AcquisitionError::UnexpectedEnd),
      };
      pipeline.process(&frame, report)?;

      if self.frame_limit.is_some_and(|n| report.frames >= n) {
        info!("达到指定帧数 {}，停止采集", report.frames);
        self.stop.stop();
      }
    }
  }
}

/// 一次采集会话
pub struct Session<'a, M, N, O> {
  pipeline: Pipeline<'a, M, N, O>,
  stop: StopSignal,
  frame_limit: Option<u64>,
  state: SessionState,
}

impl<'a, M, N, O> Session<'a, M, N, O>
where
  M: FrameModel,
  N: Notify,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(detector: &'a FireDetector<M>, notifier: &'a N, output: &'a O) -> Self {
    Session {
      pipeline: Pipeline::new(detector, notifier, output),
      stop: StopSignal::new(),
      frame_limit: None,
      state: SessionState::Idle,
    }
  }

  pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
    self.stop = stop;
    self
  }

  pub fn with_frame_limit(mut self, frame_limit: Option<u64>) -> Self {
    self.frame_limit = frame_limit;
    self
  }

  pub fn state(&self) -> SessionState {
    self.state
  }

  pub fn stop_signal(&self) -> &StopSignal {
    &self.stop
  }

  /// 按输入源类型选择任务并运行到结束。出错时状态记为 `Failed`。
  pub fn run<I: InputSource + ?Sized>(
    &mut self,
    input: &mut I,
  ) -> Result<SessionReport, AcquisitionError> {
    let source_type = input.source_type();
    info!("开始任务 ({})...", source_type);
    self.state = SessionState::Running;
    let mut report = SessionReport::new();

    let outcome = match source_type {
      InputSourceType::Image => OneShotTask.run_task(input, &self.pipeline, &mut report),
      InputSourceType::Video => VideoTask.run_task(input, &self.pipeline, &mut report),
      InputSourceType::Camera => ContinuousTask::new(self.stop.clone())
        .with_frame_limit(self.frame_limit)
        .run_task(input, &self.pipeline, &mut report),
    };

    match outcome {
      Ok(state) => {
        self.state = state;
        report.state = state;
        info!(
          "任务完成 ({}): {} 帧, {} 处火情, {} 封告警邮件",
          state, report.frames, report.detections, report.alerts_sent
        );
        Ok(report)
      }
      Err(e) => {
        self.state = SessionState::Failed;
        Err(e)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use image::RgbImage;

  use super::*;
  use crate::{
    detector::DetectionResult,
    model::{DetectItem, DetectResult, Model},
    output::{LogOutput, draw::Draw},
  };

  /// 左上角像素为红色时报告一处火情
  struct RedCornerModel;

  impl Model for RedCornerModel {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = ModelError;

    fn infer(&self, input: &RgbImage) -> Result<DetectResult, ModelError> {
      if input.get_pixel(0, 0)[0] > 200 {
        Ok(DetectResult::from(vec![DetectItem {
          class_id: 0,
          label: "fire".to_string(),
          score: 0.9,
          bbox: [0.0, 0.0, 0.5, 0.5],
        }]))
      } else {
        Ok(DetectResult::default())
      }
    }
  }

  struct CountingNotifier(std::cell::Cell<usize>);

  impl Notify for CountingNotifier {
    fn notify(&self, detection: &DetectionResult) -> AlertOutcome {
      assert!(detection.has_detections());
      self.0.set(self.0.get() + 1);
      AlertOutcome::Sent
    }
  }

  struct ScriptedCamera {
    frames: Vec<Result<Frame, InputError>>,
  }

  impl Iterator for ScriptedCamera {
    type Item = Result<Frame, InputError>;

    fn next(&mut self) -> Option<Self::Item> {
      if self.frames.is_empty() {
        None
      } else {
        Some(self.frames.remove(0))
      }
    }
  }

  impl InputSource for ScriptedCamera {
    fn source_type(&self) -> InputSourceType {
      InputSourceType::Camera
    }
  }

  fn red() -> Frame {
    Frame::from(RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 0])))
  }

  fn dark() -> Frame {
    Frame::from(RgbImage::new(4, 4))
  }

  #[test]
  fn notifier_only_called_for_detections() {
    let detector = FireDetector::new(RedCornerModel, Draw::default());
    let notifier = CountingNotifier(Default::default());
    let mut session = Session::new(&detector, &notifier, &LogOutput).with_frame_limit(Some(3));
    let mut camera = ScriptedCamera {
      frames: vec![Ok(red()), Ok(dark()), Ok(red()), Ok(red())],
    };

    assert_eq!(session.state(), SessionState::Idle);
    let report = session.run(&mut camera).expect("run");
    assert_eq!(report.state, SessionState::Stopped);
    assert!(session.stop_signal().is_stopped());
    assert_eq!(report.frames, 3);
    assert_eq!(report.detections, 2);
    assert_eq!(notifier.0.get(), 2);
    assert_eq!(camera.frames.len(), 1);
  }

  #[test]
  fn camera_read_failure_is_an_error() {
    let detector = FireDetector::new(RedCornerModel, Draw::default());
    let notifier = CountingNotifier(Default::default());
    let mut session = Session::new(&detector, &notifier, &LogOutput);
    let mut camera = ScriptedCamera {
      frames: vec![
        Ok(dark()),
        Err(InputError::Unsupported("unplugged".to_string())),
      ],
    };

    assert!(matches!(
      session.run(&mut camera),
      Err(AcquisitionError::Source(_))
    ));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(!session.stop_signal().is_stopped());
  }

  #[test]
  fn camera_running_dry_is_an_error() {
    let detector = FireDetector::new(RedCornerModel, Draw::default());
    let notifier = CountingNotifier(Default::default());
    let mut session = Session::new(&detector, &notifier, &LogOutput);
    let mut camera = ScriptedCamera { frames: vec![] };

    assert!(matches!(
      session.run(&mut camera),
      Err(AcquisitionError::UnexpectedEnd)
    ));
    assert_eq!(session.state(), SessionState::Failed);
  }

  #[test]
  fn pre_tripped_signal_processes_nothing() {
    let detector = FireDetector::new(RedCornerModel, Draw::default());
    let notifier = CountingNotifier(Default::default());
    let stop = StopSignal::new();
    stop.stop();
    let mut session = Session::new(&detector, &notifier, &LogOutput).with_stop_signal(stop);
    let mut camera = ScriptedCamera {
      frames: vec![Ok(red())],
    };

    let report = session.run(&mut camera).expect("run");
    assert_eq!(report.state, SessionState::Stopped);
    assert_eq!(report.frames, 0);
  }
}
