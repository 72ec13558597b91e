// 该文件是 Huojing （火警） 项目的一部分。
// src/input/v4l_input.rs - V4L 摄像头输入
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

use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::{
  frame::Frame,
  input::{InputError, InputSource, InputSourceType},
};

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("无法打开设备 /dev/video{index}: {source}")]
  Open {
    index: u32,
    #[source]
    source: std::io::Error,
  },
  #[error("V4L 错误: {0}")]
  V4lError(#[from] std::io::Error),
  #[error("不支持的像素格式: {0}")]
  UnsupportedPixelFormat(String),
  #[error("帧缓冲区大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
}

/// V4L2 摄像头，固定 YUYV 640x480
pub struct V4lInput {
  // 字段按声明顺序析构，stream 先于 device 释放
  stream: Stream<'static>,
  _device: Device,
  width: u32,
  height: u32,
  frame_index: u64,
  start_time: Instant,
}

impl V4lInput {
  pub fn open(index: u32) -> Result<Self, V4lInputError> {
    let device =
      Device::new(index as usize).map_err(|source| V4lInputError::Open { index, source })?;

    let mut format = device.format()?;
    format.width = CAPTURE_WIDTH;
    format.height = CAPTURE_HEIGHT;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(V4lInputError::UnsupportedPixelFormat(format.fourcc.to_string()));
    }
    info!(
      "摄像头 /dev/video{} 已打开: {}x{} {}",
      index, format.width, format.height, format.fourcc
    );

    let stream = Stream::with_buffers(&device, Type::VideoCapture, 4)?;

    Ok(V4lInput {
      stream,
      _device: device,
      width: format.width,
      height: format.height,
      frame_index: 0,
      start_time: Instant::now(),
    })
  }

  fn capture(&mut self) -> Result<Frame, V4lInputError> {
    let (buffer, _meta) = CaptureStream::next(&mut self.stream)?;
    let expected = (self.width * self.height * 2) as usize;
    if buffer.len() < expected {
      return Err(V4lInputError::BufferSizeMismatch {
        expected,
        actual: buffer.len(),
      });
    }

    let rgb = yuyv_to_rgb(&buffer[..expected]);
    let image = RgbImage::from_raw(self.width, self.height, rgb).ok_or(
      V4lInputError::BufferSizeMismatch {
        expected,
        actual: buffer.len(),
      },
    )?;

    let frame = Frame::new(
      image,
      self.frame_index,
      self.start_time.elapsed().as_millis() as u64,
    );
    self.frame_index += 1;
    Ok(frame)
  }
}

/// YUYV (YUV 4:2:2) 转 RGB，每 4 字节对应两个像素
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
  let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);

  for chunk in yuyv.chunks_exact(4) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;
    for y in [chunk[0] as f32, chunk[2] as f32] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}

impl Iterator for V4lInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    Some(self.capture().map_err(InputError::from))
  }
}

impl InputSource for V4lInput {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::Camera
  }
}
