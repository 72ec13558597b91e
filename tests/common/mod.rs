// 该文件是 Huojing （火警） 项目的一部分。
// tests/common/mod.rs - 集成测试共用的替身实现
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

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};
use image::RgbImage;

use huojing::{
  alert::{Alarm, AlarmError, AlertMessage, Clock, EmailDeliveryError, Mailer},
  model::{DetectItem, DetectResult, Model, ModelError},
};

pub const COOLDOWN: Duration = Duration::from_secs(180);

/// 平均红色分量超过阈值且明显高于绿蓝时报告一处火情
pub struct RedFrameModel;

impl Model for RedFrameModel {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &RgbImage) -> Result<DetectResult, ModelError> {
    let pixels = (input.width() * input.height()).max(1) as u64;
    let mut sums = [0u64; 3];
    for px in input.pixels() {
      for (sum, value) in sums.iter_mut().zip(px.0) {
        *sum += value as u64;
      }
    }
    let [r, g, b] = sums.map(|s| s / pixels);
    if r > 150 && r > g + 50 && r > b + 50 {
      Ok(DetectResult::from(vec![DetectItem {
        class_id: 0,
        label: "fire".to_string(),
        score: r as f32 / 255.0,
        bbox: [0.25, 0.25, 0.75, 0.75],
      }]))
    } else {
      Ok(DetectResult::default())
    }
  }
}

#[derive(Default)]
pub struct FakeMailer {
  sent: Mutex<Vec<AlertMessage>>,
  attempts: AtomicUsize,
  failing: AtomicBool,
}

impl FakeMailer {
  pub fn failing() -> Self {
    let mailer = Self::default();
    mailer.set_failing(true);
    mailer
  }

  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  pub fn sent(&self) -> Vec<AlertMessage> {
    self.sent.lock().expect("sent lock").clone()
  }

  pub fn attempts(&self) -> usize {
    self.attempts.load(Ordering::SeqCst)
  }
}

impl Mailer for FakeMailer {
  fn send(&self, message: &AlertMessage) -> Result<(), EmailDeliveryError> {
    self.attempts.fetch_add(1, Ordering::SeqCst);
    if self.failing.load(Ordering::SeqCst) {
      return Err(EmailDeliveryError::NotConfigured);
    }
    self.sent.lock().expect("sent lock").push(message.clone());
    Ok(())
  }
}

#[derive(Default)]
pub struct FakeAlarm {
  plays: AtomicUsize,
}

impl FakeAlarm {
  pub fn plays(&self) -> usize {
    self.plays.load(Ordering::SeqCst)
  }
}

impl Alarm for FakeAlarm {
  fn play(&self) -> Result<(), AlarmError> {
    self.plays.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

/// 手动推进的时钟
pub struct ManualClock {
  now: Mutex<DateTime<Local>>,
}

impl ManualClock {
  pub fn new() -> Self {
    ManualClock {
      now: Mutex::new(Local::now()),
    }
  }

  pub fn advance(&self, seconds: i64) {
    let mut now = self.now.lock().expect("clock lock");
    *now += TimeDelta::seconds(seconds);
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Local> {
    *self.now.lock().expect("clock lock")
  }
}

pub fn alert_message() -> AlertMessage {
  AlertMessage {
    from: "sender@example.com".to_string(),
    to: "oncall@example.com".to_string(),
    subject: "Fire Alert".to_string(),
    body: "A fire has been detected. Please respond immediately!".to_string(),
  }
}

pub fn red_image() -> RgbImage {
  RgbImage::from_pixel(32, 24, image::Rgb([230, 40, 20]))
}

pub fn dark_image() -> RgbImage {
  RgbImage::from_pixel(32, 24, image::Rgb([20, 20, 30]))
}
