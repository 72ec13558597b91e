// 该文件是 Huojing （火警） 项目的一部分。
// src/output/directory_record.rs - 按日期目录保存检测记录
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

//! `folder:///dir` 输出
//!
//! 图像保存到 `dir/YYYY/MM/DD/HH-MM-SS-XXXX.png`。
//!
//! - 默认只保存检测到火情的帧，带 `always` 参数时保存每一帧
//! - 带 `record` 参数时额外写入同名 `.json`，记录检测框与置信度

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Local};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme, detector::DetectionResult, frame::Frame, model::DetectItem,
  output::Render, url_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("URI 缺少目录路径: {0}")]
  MissingPath(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct FrameRecord<'a> {
  frame_index: u64,
  timestamp_ms: u64,
  recorded_at: DateTime<Local>,
  count: usize,
  items: &'a [DetectItem],
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: Mutex<u16>,
  always: bool,
  record: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let directory =
      url_path(uri).ok_or_else(|| DirectoryRecordOutputError::MissingPath(uri.to_string()))?;
    let always = uri.query_pairs().any(|(k, _)| k == "always");
    let record = uri.query_pairs().any(|(k, _)| k == "record");

    Ok(DirectoryRecordOutput::new(directory, always, record))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, always: bool, record: bool) -> Self {
    DirectoryRecordOutput {
      directory: directory.into(),
      frame_counter: Mutex::new(0),
      always,
      record,
    }
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counter
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    *counter = counter.wrapping_add(1);
    *counter
  }

  fn frame_path(&self, now: DateTime<Local>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  fn write_record(
    &self,
    image_path: &Path,
    frame: &Frame,
    result: &DetectionResult,
    now: DateTime<Local>,
  ) -> Result<(), DirectoryRecordOutputError> {
    let record = FrameRecord {
      frame_index: frame.index,
      timestamp_ms: frame.timestamp_ms,
      recorded_at: now,
      count: result.count,
      items: &result.items,
    };
    let json = serde_json::to_string_pretty(&record)?;
    std::fs::write(image_path.with_extension("json"), json)?;
    Ok(())
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Frame, result: &DetectionResult) -> Result<(), Self::Error> {
    if !self.always && !result.has_detections() {
      return Ok(());
    }

    let now = Local::now();
    let path = self.frame_path(now)?;
    result.annotated_frame.save(&path)?;
    if self.record {
      self.write_record(&path, frame, result, now)?;
    }
    debug!("保存检测记录: {}", path.display());

    Ok(())
  }
}
