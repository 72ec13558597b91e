// 该文件是 Huojing （火警） 项目的一部分。
// src/input/gif_input.rs - GIF 动画输入
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

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, Frames};
use tracing::{debug, warn};

use crate::{
  frame::Frame,
  input::{InputError, InputSource, InputSourceType},
};

/// GIF 动画作为视频输入，按帧延时累计时间戳。
///
/// 解码出错后不再产出任何帧。
pub struct GifInput {
  frames: Frames<'static>,
  frame_index: u64,
  elapsed_ms: u64,
  finished: bool,
}

impl GifInput {
  pub fn open(path: &Path) -> Result<Self, InputError> {
    let file = File::open(path).map_err(|source| InputError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let decoder = GifDecoder::new(BufReader::new(file))?;
    debug!("打开 GIF 视频: {}", path.display());

    Ok(GifInput {
      frames: decoder.into_frames(),
      frame_index: 0,
      elapsed_ms: 0,
      finished: false,
    })
  }
}

impl Iterator for GifInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    match self.frames.next() {
      Some(Ok(gif_frame)) => {
        let (numer, denom) = gif_frame.delay().numer_denom_ms();
        let delay_ms = if denom == 0 { 0 } else { (numer / denom) as u64 };
        let image = DynamicImage::ImageRgba8(gif_frame.into_buffer()).to_rgb8();

        let frame = Frame::new(image, self.frame_index, self.elapsed_ms);
        self.frame_index += 1;
        self.elapsed_ms += delay_ms;
        Some(Ok(frame))
      }
      Some(Err(e)) => {
        warn!("第 {} 帧解码失败: {}", self.frame_index, e);
        self.finished = true;
        Some(Err(InputError::Decode(e)))
      }
      None => {
        self.finished = true;
        None
      }
    }
  }
}

impl InputSource for GifInput {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::Video
  }
}
