// 该文件是 Huojing （火警） 项目的一部分。
// src/input.rs - 视频/图像/摄像头输入
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

//! 输入源
//!
//! 输入源由 URL 描述：
//!
//! - `image:///path/to/fire.png` 单张图片
//! - `video:///path/to/fire.gif` 视频文件（GIF 内置支持，其余格式需 `gstreamer_input` 特性）
//! - `camera://0` 摄像头编号（需 `v4l_input` 或 `gstreamer_input` 特性）

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, frame::Frame, url_path};

mod gif_input;
mod read_image_file;

pub use self::gif_input::GifInput;
pub use self::read_image_file::ImageFileInput;

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder};

#[cfg(feature = "v4l_input")]
mod v4l_input;
#[cfg(feature = "v4l_input")]
pub use self::v4l_input::{V4lInput, V4lInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("URI 缺少文件路径: {0}")]
  MissingPath(String),
  #[error("无效的摄像头编号: {0}")]
  InvalidCamera(String),
  #[error("无法打开 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("图像解码错误: {0}")]
  Decode(#[from] image::ImageError),
  #[error("不支持的输入: {0}")]
  Unsupported(String),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamer(#[from] GStreamerInputError),
  #[cfg(feature = "v4l_input")]
  #[error("V4L 输入错误: {0}")]
  V4l(#[from] V4lInputError),
}

/// 输入源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSourceType {
  /// 图片文件
  Image,
  /// 视频文件
  Video,
  /// 摄像头
  Camera,
}

impl fmt::Display for InputSourceType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      InputSourceType::Image => write!(f, "image"),
      InputSourceType::Video => write!(f, "video"),
      InputSourceType::Camera => write!(f, "camera"),
    }
  }
}

/// 输入源：逐帧产出图像。
///
/// 文件类输入在没有更多帧时返回 `None`；单帧解码失败返回 `Some(Err(_))`。
pub trait InputSource: Iterator<Item = Result<Frame, InputError>> {
  fn source_type(&self) -> InputSourceType;
}

impl<T: InputSource + ?Sized> InputSource for Box<T> {
  fn source_type(&self) -> InputSourceType {
    (**self).source_type()
  }
}

/// 输入源定位
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
  Image(PathBuf),
  Video(PathBuf),
  Camera(u32),
}

impl FromUrl for SourceLocator {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "image" => url_path(url)
        .map(SourceLocator::Image)
        .ok_or_else(|| InputError::MissingPath(url.to_string())),
      "video" => url_path(url)
        .map(SourceLocator::Video)
        .ok_or_else(|| InputError::MissingPath(url.to_string())),
      "camera" => {
        // camera://0 与 camera:0 均可；省略编号时使用 0 号设备
        let index = url
          .host_str()
          .filter(|h| !h.is_empty())
          .unwrap_or_else(|| url.path().trim_start_matches('/'));
        if index.is_empty() {
          return Ok(SourceLocator::Camera(0));
        }
        index
          .parse::<u32>()
          .map(SourceLocator::Camera)
          .map_err(|_| InputError::InvalidCamera(index.to_string()))
      }
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl SourceLocator {
  pub fn source_type(&self) -> InputSourceType {
    match self {
      SourceLocator::Image(_) => InputSourceType::Image,
      SourceLocator::Video(_) => InputSourceType::Video,
      SourceLocator::Camera(_) => InputSourceType::Camera,
    }
  }

  /// 打开输入源
  pub fn open(&self) -> Result<Box<dyn InputSource>, InputError> {
    info!("打开输入源: {}", self);
    match self {
      SourceLocator::Image(path) => Ok(Box::new(ImageFileInput::open(path)?)),
      SourceLocator::Video(path) => open_video(path),
      SourceLocator::Camera(index) => open_camera(*index),
    }
  }
}

impl fmt::Display for SourceLocator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SourceLocator::Image(path) => write!(f, "image://{}", path.display()),
      SourceLocator::Video(path) => write!(f, "video://{}", path.display()),
      SourceLocator::Camera(index) => write!(f, "camera://{}", index),
    }
  }
}

fn is_gif(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| ext.eq_ignore_ascii_case("gif"))
}

fn open_video(path: &Path) -> Result<Box<dyn InputSource>, InputError> {
  if is_gif(path) {
    return Ok(Box::new(GifInput::open(path)?));
  }
  open_video_file(path)
}

#[cfg(feature = "gstreamer_input")]
fn open_video_file(path: &Path) -> Result<Box<dyn InputSource>, InputError> {
  let input = GStreamerInputPipelineBuilder::file(path).build()?;
  Ok(Box::new(input))
}

#[cfg(not(feature = "gstreamer_input"))]
fn open_video_file(path: &Path) -> Result<Box<dyn InputSource>, InputError> {
  Err(InputError::Unsupported(format!(
    "{}（非 GIF 视频需要启用 gstreamer_input 特性）",
    path.display()
  )))
}

#[cfg(feature = "v4l_input")]
fn open_camera(index: u32) -> Result<Box<dyn InputSource>, InputError> {
  Ok(Box::new(V4lInput::open(index)?))
}

#[cfg(all(not(feature = "v4l_input"), feature = "gstreamer_input"))]
fn open_camera(index: u32) -> Result<Box<dyn InputSource>, InputError> {
  let input = GStreamerInputPipelineBuilder::camera(index).build()?;
  Ok(Box::new(input))
}

#[cfg(not(any(feature = "v4l_input", feature = "gstreamer_input")))]
fn open_camera(index: u32) -> Result<Box<dyn InputSource>, InputError> {
  Err(InputError::Unsupported(format!(
    "camera://{}（摄像头需要启用 v4l_input 或 gstreamer_input 特性）",
    index
  )))
}
