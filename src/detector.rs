// 该文件是 Huojing （火警） 项目的一部分。
// src/detector.rs - 火情检测器
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

use image::RgbImage;
use tracing::debug;

use crate::{
  config::ModelSettings,
  model::{DetectItem, FrameModel, ModelError, Yolov5, Yolov5Params},
  output::draw::Draw,
};

/// 单帧检测结果
#[derive(Debug, Clone)]
pub struct DetectionResult {
  /// 叠加了检测框的帧，尺寸与输入一致
  pub annotated_frame: RgbImage,
  /// 检测到的火情数量
  pub count: usize,
  pub items: Box<[DetectItem]>,
}

impl DetectionResult {
  pub fn has_detections(&self) -> bool {
    self.count > 0
  }
}

/// 检测适配器：输入一帧，输出标注后的帧和检测数量。
///
/// 模型在构造时加载一次，之后每帧复用。
pub struct FireDetector<M = Yolov5> {
  model: M,
  draw: Draw,
}

impl FireDetector<Yolov5> {
  /// 加载模型。失败属于启动期致命错误，不做重试。
  pub fn load(settings: &ModelSettings, draw: Draw) -> Result<Self, ModelError> {
    let params = Yolov5Params {
      input_width: settings.input_width,
      input_height: settings.input_height,
      confidence: settings.confidence,
      nms_threshold: settings.nms_threshold,
      labels: settings.labels.clone(),
    };
    let model = Yolov5::load(&settings.path, params)?;
    Ok(Self::new(model, draw))
  }
}

impl<M: FrameModel> FireDetector<M> {
  pub fn new(model: M, draw: Draw) -> Self {
    Self { model, draw }
  }

  pub fn detect(&self, frame: &RgbImage) -> Result<DetectionResult, ModelError> {
    let result = self.model.infer(frame)?;
    let annotated_frame = self.draw.draw_detection(frame, &result);
    debug!("检测完成，共 {} 处", result.len());

    Ok(DetectionResult {
      annotated_frame,
      count: result.len(),
      items: result.items,
    })
  }
}
