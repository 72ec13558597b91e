// 该文件是 Huojing （火警） 项目的一部分。
// src/config.rs - 配置文件与环境变量
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

//! # 配置
//!
//! 配置按以下顺序合并：内置默认值 → TOML 配置文件 → `HUOJING_*` 环境变量。
//!
//! ```toml
//! [database]
//! path = "users.db"
//!
//! [model]
//! path = "weights/best.onnx"
//! confidence = 0.25
//! labels = ["fire"]
//!
//! [alert]
//! sound = "alarm.mp3"
//! cooldown_secs = 180
//!
//! [smtp]
//! host = "smtp.gmail.com"
//! port = 587
//! username = "sender@example.com"
//! from = "sender@example.com"
//! to = "oncall@example.com"
//! ```
//!
//! SMTP 密码建议通过 `HUOJING_SMTP_PASSWORD` 提供，不要写进配置文件。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_DB_PATH: &str = "users.db";
const DEFAULT_MODEL_PATH: &str = "weights/best.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_NMS_THRESHOLD: f32 = 0.45;
const DEFAULT_LABEL: &str = "fire";
const DEFAULT_SOUND_PATH: &str = "alarm.mp3";
const DEFAULT_COOLDOWN_SECS: u64 = 3 * 60;
const MAX_COOLDOWN_SECS: u64 = 60 * 60 * 24;
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SUBJECT: &str = "Fire Alert";
const DEFAULT_BODY: &str = "A fire has been detected. Please respond immediately!";
const DEFAULT_DEMO_IMAGE: &str = "fire.9.png";
const DEFAULT_DEMO_VIDEO: &str = "Fire_Video.mp4";
const DEFAULT_DEMO_CAMERA: u32 = 0;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("配置文件格式错误 {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
  #[error("环境变量 {name} 无效: {reason}")]
  Env { name: &'static str, reason: String },
  #[error("配置无效: {0}")]
  Invalid(String),
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct HuojingConfigFile {
  database: Option<DatabaseConfigFile>,
  model: Option<ModelConfigFile>,
  alert: Option<AlertConfigFile>,
  smtp: Option<SmtpConfigFile>,
  demo: Option<DemoConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DatabaseConfigFile {
  path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
  path: Option<PathBuf>,
  input_width: Option<u32>,
  input_height: Option<u32>,
  confidence: Option<f32>,
  nms_threshold: Option<f32>,
  labels: Option<Vec<String>>,
  font: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
  sound: Option<PathBuf>,
  cooldown_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SmtpConfigFile {
  host: Option<String>,
  port: Option<u16>,
  username: Option<String>,
  password: Option<String>,
  from: Option<String>,
  to: Option<String>,
  subject: Option<String>,
  body: Option<String>,
  timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DemoConfigFile {
  image: Option<PathBuf>,
  video: Option<PathBuf>,
  camera: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct HuojingConfig {
  pub database: DatabaseSettings,
  pub model: ModelSettings,
  pub alert: AlertSettings,
  pub smtp: SmtpSettings,
  pub demo: DemoSettings,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
  pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
  pub path: PathBuf,
  pub input_width: u32,
  pub input_height: u32,
  pub confidence: f32,
  pub nms_threshold: f32,
  pub labels: Vec<String>,
  /// 标签字体，缺省时只画检测框
  pub font: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
  pub sound: PathBuf,
  pub cooldown: Duration,
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
  pub host: String,
  pub port: u16,
  pub username: Option<String>,
  pub password: Option<String>,
  pub from: Option<String>,
  pub to: Option<String>,
  pub subject: String,
  pub body: String,
  pub timeout: Duration,
}

impl SmtpSettings {
  /// 发件所需的账号、密码、收发件人是否齐全
  pub fn is_complete(&self) -> bool {
    self.username.is_some() && self.password.is_some() && self.from.is_some() && self.to.is_some()
  }
}

#[derive(Debug, Clone)]
pub struct DemoSettings {
  pub image: PathBuf,
  pub video: PathBuf,
  pub camera: u32,
}

impl Default for HuojingConfig {
  fn default() -> Self {
    Self::from_file(HuojingConfigFile::default())
  }
}

impl HuojingConfig {
  /// 读取配置：有 `path` 时读取该文件，否则使用默认值；随后应用环境变量覆盖并校验。
  ///
  /// 命令行的 `--config` 已经处理了 `HUOJING_CONFIG`，这里不再读取它。
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let file_cfg = match path {
      Some(path) => read_config_file(path)?,
      None => HuojingConfigFile::default(),
    };
    let mut cfg = Self::from_file(file_cfg);
    cfg.apply_env()?;
    cfg.validate()?;
    Ok(cfg)
  }

  fn from_file(file: HuojingConfigFile) -> Self {
    let database = file.database.unwrap_or_default();
    let model = file.model.unwrap_or_default();
    let alert = file.alert.unwrap_or_default();
    let smtp = file.smtp.unwrap_or_default();
    let demo = file.demo.unwrap_or_default();

    Self {
      database: DatabaseSettings {
        path: database.path.unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
      },
      model: ModelSettings {
        path: model
          .path
          .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
        input_width: model.input_width.unwrap_or(DEFAULT_INPUT_SIZE),
        input_height: model.input_height.unwrap_or(DEFAULT_INPUT_SIZE),
        confidence: model.confidence.unwrap_or(DEFAULT_CONFIDENCE),
        nms_threshold: model.nms_threshold.unwrap_or(DEFAULT_NMS_THRESHOLD),
        labels: model
          .labels
          .unwrap_or_else(|| vec![DEFAULT_LABEL.to_string()]),
        font: model.font,
      },
      alert: AlertSettings {
        sound: alert
          .sound
          .unwrap_or_else(|| PathBuf::from(DEFAULT_SOUND_PATH)),
        cooldown: Duration::from_secs(alert.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS)),
      },
      smtp: SmtpSettings {
        host: smtp.host.unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
        port: smtp.port.unwrap_or(DEFAULT_SMTP_PORT),
        username: smtp.username,
        password: smtp.password,
        from: smtp.from,
        to: smtp.to,
        subject: smtp.subject.unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
        body: smtp.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
        timeout: Duration::from_secs(smtp.timeout_secs.unwrap_or(DEFAULT_SMTP_TIMEOUT_SECS)),
      },
      demo: DemoSettings {
        image: demo
          .image
          .unwrap_or_else(|| PathBuf::from(DEFAULT_DEMO_IMAGE)),
        video: demo
          .video
          .unwrap_or_else(|| PathBuf::from(DEFAULT_DEMO_VIDEO)),
        camera: demo.camera.unwrap_or(DEFAULT_DEMO_CAMERA),
      },
    }
  }

  fn apply_env(&mut self) -> Result<(), ConfigError> {
    if let Some(path) = non_empty_env("HUOJING_DB_PATH") {
      self.database.path = PathBuf::from(path);
    }
    if let Some(path) = non_empty_env("HUOJING_MODEL_PATH") {
      self.model.path = PathBuf::from(path);
    }
    if let Some(confidence) = non_empty_env("HUOJING_CONFIDENCE") {
      self.model.confidence = confidence.parse().map_err(|_| ConfigError::Env {
        name: "HUOJING_CONFIDENCE",
        reason: "必须是 0.0 到 1.0 之间的小数".to_string(),
      })?;
    }
    if let Some(path) = non_empty_env("HUOJING_ALARM_SOUND") {
      self.alert.sound = PathBuf::from(path);
    }
    if let Some(cooldown) = non_empty_env("HUOJING_COOLDOWN_SECS") {
      let seconds: u64 = cooldown.parse().map_err(|_| ConfigError::Env {
        name: "HUOJING_COOLDOWN_SECS",
        reason: "必须是整数秒".to_string(),
      })?;
      self.alert.cooldown = Duration::from_secs(seconds);
    }
    if let Some(host) = non_empty_env("HUOJING_SMTP_HOST") {
      self.smtp.host = host;
    }
    if let Some(port) = non_empty_env("HUOJING_SMTP_PORT") {
      self.smtp.port = port.parse().map_err(|_| ConfigError::Env {
        name: "HUOJING_SMTP_PORT",
        reason: "必须是有效端口号".to_string(),
      })?;
    }
    if let Some(username) = non_empty_env("HUOJING_SMTP_USERNAME") {
      self.smtp.username = Some(username);
    }
    if let Some(password) = non_empty_env("HUOJING_SMTP_PASSWORD") {
      self.smtp.password = Some(password);
    }
    if let Some(from) = non_empty_env("HUOJING_SMTP_FROM") {
      self.smtp.from = Some(from);
    }
    if let Some(to) = non_empty_env("HUOJING_SMTP_TO") {
      self.smtp.to = Some(to);
    }
    Ok(())
  }

  fn validate(&mut self) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&self.model.confidence) {
      return Err(ConfigError::Invalid(format!(
        "model.confidence 必须在 0.0 到 1.0 之间，实际为 {}",
        self.model.confidence
      )));
    }
    if !(0.0..=1.0).contains(&self.model.nms_threshold) {
      return Err(ConfigError::Invalid(format!(
        "model.nms_threshold 必须在 0.0 到 1.0 之间，实际为 {}",
        self.model.nms_threshold
      )));
    }
    if self.model.input_width == 0 || self.model.input_height == 0 {
      return Err(ConfigError::Invalid("模型输入尺寸不能为零".to_string()));
    }
    if self.model.labels.is_empty() {
      return Err(ConfigError::Invalid("model.labels 不能为空".to_string()));
    }
    if self.alert.cooldown.as_secs() > MAX_COOLDOWN_SECS {
      return Err(ConfigError::Invalid(format!(
        "alert.cooldown_secs 不能超过 {}",
        MAX_COOLDOWN_SECS
      )));
    }
    if self.smtp.port == 0 {
      return Err(ConfigError::Invalid("smtp.port 不能为零".to_string()));
    }
    self.smtp.host = self.smtp.host.trim().to_string();
    Ok(())
  }
}

fn read_config_file(path: &Path) -> Result<HuojingConfigFile, ConfigError> {
  let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  toml::from_str(&raw).map_err(|source| ConfigError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

fn non_empty_env(name: &str) -> Option<String> {
  std::env::var(name)
    .ok()
    .filter(|value| !value.trim().is_empty())
}
