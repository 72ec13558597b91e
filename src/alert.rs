// 该文件是 Huojing （火警） 项目的一部分。
// src/alert.rs - 火情告警分发
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

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};
use tracing::{error, info, warn};

use crate::detector::DetectionResult;

mod email;
mod sound;

pub use self::email::{EmailDeliveryError, SmtpMailer, UnconfiguredMailer};
pub use self::sound::{AlarmError, SilentAlarm, open_alarm};
#[cfg(feature = "audio_alarm")]
pub use self::sound::RodioAlarm;

/// 固定内容的告警邮件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
  pub from: String,
  pub to: String,
  pub subject: String,
  pub body: String,
}

pub trait Mailer {
  fn send(&self, message: &AlertMessage) -> Result<(), EmailDeliveryError>;
}

pub trait Alarm {
  fn play(&self) -> Result<(), AlarmError>;
}

pub trait Clock {
  fn now(&self) -> DateTime<Local>;
}

impl<T: Mailer + ?Sized> Mailer for Box<T> {
  fn send(&self, message: &AlertMessage) -> Result<(), EmailDeliveryError> {
    (**self).send(message)
  }
}

impl<T: Alarm + ?Sized> Alarm for Box<T> {
  fn play(&self) -> Result<(), AlarmError> {
    (**self).play()
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Local> {
    Local::now()
  }
}

/// 告警状态：最近一次成功发送邮件的时间
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertState {
  last_sent_at: Option<DateTime<Local>>,
}

impl AlertState {
  pub fn last_sent_at(&self) -> Option<DateTime<Local>> {
    self.last_sent_at
  }

  fn cooldown_elapsed(&self, now: DateTime<Local>, cooldown: TimeDelta) -> bool {
    match self.last_sent_at {
      None => true,
      Some(last) => now - last >= cooldown,
    }
  }
}

/// 单次通知的结果，仅用于界面提示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
  /// 没有检测到火情，什么也没做
  Skipped,
  /// 邮件已发送
  Sent,
  /// 冷却期内，未发送邮件
  CoolingDown,
  /// 邮件发送失败
  Failed(String),
}

/// 检测结果的接收方
pub trait Notify {
  fn notify(&self, detection: &DetectionResult) -> AlertOutcome;
}

/// 告警分发器：报警音每次都播放，邮件受冷却时间限制。
///
/// 状态由互斥锁保护，检查、发送、记录时间在同一把锁内完成，
/// 因此同一冷却窗口内最多发出一封邮件。
pub struct AlertDispatcher<M, A, C = SystemClock> {
  mailer: M,
  alarm: A,
  clock: C,
  message: AlertMessage,
  cooldown: TimeDelta,
  state: Mutex<AlertState>,
}

impl<M: Mailer, A: Alarm> AlertDispatcher<M, A, SystemClock> {
  pub fn new(mailer: M, alarm: A, message: AlertMessage, cooldown: Duration) -> Self {
    Self::with_clock(mailer, alarm, SystemClock, message, cooldown)
  }
}

impl<M: Mailer, A: Alarm, C: Clock> AlertDispatcher<M, A, C> {
  pub fn with_clock(mailer: M, alarm: A, clock: C, message: AlertMessage, cooldown: Duration) -> Self {
    Self {
      mailer,
      alarm,
      clock,
      message,
      cooldown: TimeDelta::from_std(cooldown).unwrap_or(TimeDelta::MAX),
      state: Mutex::new(AlertState::default()),
    }
  }

  pub fn mailer(&self) -> &M {
    &self.mailer
  }

  pub fn alarm(&self) -> &A {
    &self.alarm
  }

  pub fn clock(&self) -> &C {
    &self.clock
  }

  pub fn last_sent_at(&self) -> Option<DateTime<Local>> {
    self.lock_state().last_sent_at()
  }

  fn lock_state(&self) -> MutexGuard<'_, AlertState> {
    self
      .state
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn play_alarm(&self) {
    if let Err(e) = self.alarm.play() {
      warn!("报警音播放失败: {}", e);
    }
  }

  fn send_email(&self) -> AlertOutcome {
    let mut state = self.lock_state();
    let now = self.clock.now();

    if !state.cooldown_elapsed(now, self.cooldown) {
      info!("Email already sent within the last {} seconds.", self.cooldown.num_seconds());
      return AlertOutcome::CoolingDown;
    }

    match self.mailer.send(&self.message) {
      Ok(()) => {
        state.last_sent_at = Some(now);
        info!("Email sent successfully to {}", self.message.to);
        AlertOutcome::Sent
      }
      Err(e) => {
        error!("Failed to send email: {}", e);
        AlertOutcome::Failed(e.to_string())
      }
    }
  }
}

impl<M: Mailer, A: Alarm, C: Clock> Notify for AlertDispatcher<M, A, C> {
  fn notify(&self, detection: &DetectionResult) -> AlertOutcome {
    if !detection.has_detections() {
      return AlertOutcome::Skipped;
    }

    self.play_alarm();
    self.send_email()
  }
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;

  use image::RgbImage;

  use super::*;

  #[derive(Default)]
  struct CountingMailer {
    sent: Cell<usize>,
  }

  impl Mailer for CountingMailer {
    fn send(&self, _message: &AlertMessage) -> Result<(), EmailDeliveryError> {
      self.sent.set(self.sent.get() + 1);
      Ok(())
    }
  }

  struct FixedClock(DateTime<Local>);

  impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
      self.0
    }
  }

  fn detection(count: usize) -> DetectionResult {
    DetectionResult {
      annotated_frame: RgbImage::new(1, 1),
      count,
      items: Box::new([]),
    }
  }

  fn message() -> AlertMessage {
    AlertMessage {
      from: "sender@example.com".to_string(),
      to: "oncall@example.com".to_string(),
      subject: "Fire Alert".to_string(),
      body: "fire".to_string(),
    }
  }

  #[test]
  fn cooldown_boundary_is_inclusive() {
    let start = Local::now();
    let cooldown = TimeDelta::minutes(3);
    let state = AlertState {
      last_sent_at: Some(start),
    };

    assert!(AlertState::default().cooldown_elapsed(start, cooldown));
    assert!(!state.cooldown_elapsed(start + TimeDelta::seconds(179), cooldown));
    assert!(state.cooldown_elapsed(start + cooldown, cooldown));
  }

  #[test]
  fn zero_count_skips_everything() {
    let dispatcher = AlertDispatcher::with_clock(
      CountingMailer::default(),
      SilentAlarm,
      FixedClock(Local::now()),
      message(),
      Duration::from_secs(180),
    );

    assert_eq!(dispatcher.notify(&detection(0)), AlertOutcome::Skipped);
    assert_eq!(dispatcher.mailer().sent.get(), 0);
    assert!(dispatcher.last_sent_at().is_none());
  }

  #[test]
  fn same_instant_sends_once() {
    let now = Local::now();
    let dispatcher = AlertDispatcher::with_clock(
      CountingMailer::default(),
      SilentAlarm,
      FixedClock(now),
      message(),
      Duration::from_secs(180),
    );

    assert_eq!(dispatcher.notify(&detection(2)), AlertOutcome::Sent);
    assert_eq!(dispatcher.notify(&detection(1)), AlertOutcome::CoolingDown);
    assert_eq!(dispatcher.mailer().sent.get(), 1);
    assert_eq!(dispatcher.last_sent_at(), Some(now));
  }
}
