// 该文件是 Huojing （火警） 项目的一部分。
// src/alert/sound.rs - 报警音
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::alert::Alarm;

#[derive(Error, Debug)]
pub enum AlarmError {
  #[error("无法读取报警音文件 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("音频输出不可用: {0}")]
  Output(String),
  #[error("报警音解码失败: {0}")]
  Decode(String),
}

/// 不发声，只记录日志
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentAlarm;

impl Alarm for SilentAlarm {
  fn play(&self) -> Result<(), AlarmError> {
    info!("检测到火情（报警音未启用）");
    Ok(())
  }
}

#[cfg(feature = "audio_alarm")]
pub use self::rodio_alarm::RodioAlarm;

#[cfg(feature = "audio_alarm")]
mod rodio_alarm {
  use std::io::Cursor;
  use std::path::Path;
  use std::sync::Arc;

  use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
  use tracing::debug;

  use super::AlarmError;
  use crate::alert::Alarm;

  /// 基于 rodio 的报警音。
  ///
  /// 音频输出在构造时打开一次，音频文件也只读取一次；
  /// 每次播放都新建一个 `Sink` 并分离，不阻塞调用方。
  pub struct RodioAlarm {
    // 输出流被丢弃后声音会立即停止，必须与 handle 一起保留
    _stream: OutputStream,
    handle: OutputStreamHandle,
    sound: Arc<[u8]>,
  }

  impl RodioAlarm {
    pub fn open(path: &Path) -> Result<Self, AlarmError> {
      let sound: Arc<[u8]> = std::fs::read(path)
        .map_err(|source| AlarmError::Io {
          path: path.to_path_buf(),
          source,
        })?
        .into();

      // 提前解码一次，尽早发现格式问题
      Decoder::new(Cursor::new(sound.clone())).map_err(|e| AlarmError::Decode(e.to_string()))?;

      let (stream, handle) =
        OutputStream::try_default().map_err(|e| AlarmError::Output(e.to_string()))?;

      Ok(Self {
        _stream: stream,
        handle,
        sound,
      })
    }
  }

  impl Alarm for RodioAlarm {
    fn play(&self) -> Result<(), AlarmError> {
      let source =
        Decoder::new(Cursor::new(self.sound.clone())).map_err(|e| AlarmError::Decode(e.to_string()))?;
      let sink = Sink::try_new(&self.handle).map_err(|e| AlarmError::Output(e.to_string()))?;
      sink.append(source);
      sink.detach();
      debug!("报警音开始播放");
      Ok(())
    }
  }
}

/// 打开报警音；音频功能未编译或文件不可用时退回 `SilentAlarm`。
pub fn open_alarm(path: &Path) -> Box<dyn Alarm> {
  #[cfg(feature = "audio_alarm")]
  {
    match RodioAlarm::open(path) {
      Ok(alarm) => {
        info!("报警音已加载: {}", path.display());
        return Box::new(alarm);
      }
      Err(e) => warn!("报警音加载失败，改用静音模式: {}", e),
    }
  }
  #[cfg(not(feature = "audio_alarm"))]
  warn!(
    "未启用 audio_alarm 特性，忽略报警音文件 {}",
    path.display()
  );

  Box::new(SilentAlarm)
}
