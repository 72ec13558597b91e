// 该文件是 Huojing （火警） 项目的一部分。
// tests/alert_dispatcher.rs - 告警分发集成测试
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

mod common;

use std::sync::Arc;
use std::thread;

use image::RgbImage;

use huojing::{
  alert::{AlertDispatcher, AlertOutcome, Notify},
  detector::DetectionResult,
};

use common::{COOLDOWN, FakeAlarm, FakeMailer, ManualClock, alert_message};

type Dispatcher = AlertDispatcher<FakeMailer, FakeAlarm, ManualClock>;

fn dispatcher() -> Dispatcher {
  AlertDispatcher::with_clock(
    FakeMailer::default(),
    FakeAlarm::default(),
    ManualClock::new(),
    alert_message(),
    COOLDOWN,
  )
}

fn detection(count: usize) -> DetectionResult {
  DetectionResult {
    annotated_frame: RgbImage::new(2, 2),
    count,
    items: Box::new([]),
  }
}

#[test]
fn nothing_happens_without_detections() {
  let dispatcher = dispatcher();
  for _ in 0..5 {
    assert_eq!(dispatcher.notify(&detection(0)), AlertOutcome::Skipped);
  }
  assert_eq!(dispatcher.alarm().plays(), 0);
  assert_eq!(dispatcher.mailer().attempts(), 0);
  assert!(dispatcher.last_sent_at().is_none());
}

#[test]
fn alarm_every_time_email_once_per_window() {
  let dispatcher = dispatcher();

  assert_eq!(dispatcher.notify(&detection(1)), AlertOutcome::Sent);
  dispatcher.clock().advance(10);
  assert_eq!(dispatcher.notify(&detection(3)), AlertOutcome::CoolingDown);
  dispatcher.clock().advance(60);
  assert_eq!(dispatcher.notify(&detection(1)), AlertOutcome::CoolingDown);

  assert_eq!(dispatcher.alarm().plays(), 3);
  let sent = dispatcher.mailer().sent();
  assert_eq!(sent.len(), 1);
  assert_eq!(sent[0], alert_message());
}

#[test]
fn cooldown_boundary() {
  let dispatcher = dispatcher();
  assert_eq!(dispatcher.notify(&detection(1)), AlertOutcome::Sent);
  let first = dispatcher.last_sent_at().expect("first send recorded");

  dispatcher.clock().advance(179);
  assert_eq!(dispatcher.notify(&detection(1)), AlertOutcome::CoolingDown);
  assert_eq!(dispatcher.last_sent_at(), Some(first));

  // 恰好 180 秒时允许再次发送
  dispatcher.clock().advance(1);
  assert_eq!(dispatcher.notify(&detection(1)), AlertOutcome::Sent);
  assert_eq!(dispatcher.mailer().sent().len(), 2);
  assert!(dispatcher.last_sent_at() > Some(first));
}

#[test]
fn failed_send_does_not_start_the_window() {
  let dispatcher = AlertDispatcher::with_clock(
    FakeMailer::failing(),
    FakeAlarm::default(),
    ManualClock::new(),
    alert_message(),
    COOLDOWN,
  );

  assert!(matches!(
    dispatcher.notify(&detection(1)),
    AlertOutcome::Failed(_)
  ));
  assert!(dispatcher.last_sent_at().is_none());
  assert_eq!(dispatcher.alarm().plays(), 1);

  // 发送恢复后下一次检测立即重试
  dispatcher.mailer().set_failing(false);
  dispatcher.clock().advance(5);
  assert_eq!(dispatcher.notify(&detection(1)), AlertOutcome::Sent);
  assert_eq!(dispatcher.mailer().attempts(), 2);
}

#[test]
fn shared_dispatcher_sends_at_most_one_email_per_window() {
  let dispatcher = Arc::new(dispatcher());

  thread::scope(|scope| {
    for _ in 0..8 {
      let dispatcher = Arc::clone(&dispatcher);
      scope.spawn(move || {
        for _ in 0..4 {
          dispatcher.notify(&detection(1));
        }
      });
    }
  });

  assert_eq!(dispatcher.alarm().plays(), 32);
  assert_eq!(dispatcher.mailer().sent().len(), 1);
}
