// 该文件是 Huojing （火警） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::Path;

use image::{ImageReader, RgbImage};
use tracing::debug;

use crate::{
  frame::Frame,
  input::{InputError, InputSource, InputSourceType},
};

/// 单张图片输入，只产出一帧
pub struct ImageFileInput {
  image: Option<RgbImage>,
}

impl ImageFileInput {
  /// 读取并解码图片；格式由文件内容判断。
  pub fn open(path: &Path) -> Result<Self, InputError> {
    let reader = ImageReader::open(path)
      .map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
      })?
      .with_guessed_format()
      .map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
      })?;
    let image = reader.decode()?.to_rgb8();
    debug!("图片尺寸: {}x{}", image.width(), image.height());

    Ok(ImageFileInput { image: Some(image) })
  }
}

impl From<RgbImage> for ImageFileInput {
  fn from(image: RgbImage) -> Self {
    ImageFileInput { image: Some(image) }
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take().map(|image| Ok(Frame::new(image, 0, 0)))
  }
}

impl InputSource for ImageFileInput {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::Image
  }
}
