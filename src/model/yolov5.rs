// 该文件是 Huojing （火警） 项目的一部分。
// src/model/yolov5.rs - YOLOv5 ONNX 模型
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

use image::{RgbImage, imageops::FilterType};
use tracing::{debug, info};
use tract_onnx::prelude::*;

use crate::model::{DetectItem, DetectResult, Model, ModelError};

const YOLOV5_BOX_FIELDS: usize = 5; // cx, cy, w, h, objectness
const YOLOV5_MAX_DETECTIONS: usize = 300;

/// YOLOv5 推理参数
#[derive(Debug, Clone)]
pub struct Yolov5Params {
  pub input_width: u32,
  pub input_height: u32,
  /// 置信度阈值（objectness × 类别分数）
  pub confidence: f32,
  /// NMS IOU 阈值
  pub nms_threshold: f32,
  pub labels: Vec<String>,
}

impl Default for Yolov5Params {
  fn default() -> Self {
    Self {
      input_width: 640,
      input_height: 640,
      confidence: 0.25,
      nms_threshold: 0.45,
      labels: vec!["fire".to_string()],
    }
  }
}

impl Yolov5Params {
  fn label(&self, class_id: usize) -> String {
    self
      .labels
      .get(class_id)
      .cloned()
      .unwrap_or_else(|| format!("class-{}", class_id))
  }
}

/// 基于 tract 的 YOLOv5 检测模型
///
/// 模型只加载一次，之后对每一帧复用同一个执行计划。
pub struct Yolov5 {
  plan: TypedRunnableModel<TypedModel>,
  params: Yolov5Params,
}

impl Yolov5 {
  pub fn load<P: AsRef<Path>>(model_path: P, params: Yolov5Params) -> Result<Self, ModelError> {
    let model_path = model_path.as_ref();
    if !model_path.is_file() {
      return Err(ModelError::NotFound(model_path.to_path_buf()));
    }

    info!("加载模型文件: {}", model_path.display());
    let load_error = |source| ModelError::Load {
      path: model_path.to_path_buf(),
      source,
    };

    let plan = tract_onnx::onnx()
      .model_for_path(model_path)
      .map_err(load_error)?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(
          f32::datum_type(),
          tvec!(1, 3, params.input_height as usize, params.input_width as usize),
        ),
      )
      .map_err(load_error)?
      .into_optimized()
      .map_err(load_error)?
      .into_runnable()
      .map_err(load_error)?;

    Ok(Self::with_plan(plan, params))
  }

  fn with_plan(plan: TypedRunnableModel<TypedModel>, params: Yolov5Params) -> Self {
    info!(
      "模型加载完成，输入尺寸 {}x{}，类别 {:?}",
      params.input_width, params.input_height, params.labels
    );
    Self { plan, params }
  }

  /// 缩放到模型输入尺寸并转为 NCHW 浮点张量
  fn preprocess(&self, image: &RgbImage) -> Tensor {
    let (width, height) = (self.params.input_width, self.params.input_height);
    let resized = image::imageops::resize(image, width, height, FilterType::Triangle);

    tract_ndarray::Array4::from_shape_fn(
      (1, 3, height as usize, width as usize),
      |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
    )
    .into_tensor()
  }
}

impl Model for Yolov5 {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let tensor = self.preprocess(input);

    debug!("执行模型推理");
    let outputs = self
      .plan
      .run(tvec!(tensor.into()))
      .map_err(ModelError::Inference)?;

    let output = outputs
      .first()
      .ok_or_else(|| ModelError::UnexpectedOutput("模型没有输出".to_string()))?;
    let view = output
      .to_array_view::<f32>()
      .map_err(ModelError::Inference)?;

    let stride = *view
      .shape()
      .last()
      .ok_or_else(|| ModelError::UnexpectedOutput("输出张量维度为空".to_string()))?;
    if stride <= YOLOV5_BOX_FIELDS {
      return Err(ModelError::UnexpectedOutput(format!(
        "每个候选框的字段数 {} 不足",
        stride
      )));
    }

    let data: Vec<f32> = view.iter().copied().collect();
    Ok(postprocess(&data, stride, &self.params))
  }
}

/// 解码 YOLOv5 输出：每行为 `[cx, cy, w, h, objectness, class scores...]`，
/// 坐标以模型输入像素为单位。
pub(crate) fn postprocess(data: &[f32], stride: usize, params: &Yolov5Params) -> DetectResult {
  debug!("后处理模型输出");
  let input_w = params.input_width as f32;
  let input_h = params.input_height as f32;
  let mut candidates = Vec::new();

  for row in data.chunks_exact(stride) {
    let objectness = row[4];
    if objectness < params.confidence {
      continue;
    }

    let (class_id, class_score) = row[YOLOV5_BOX_FIELDS..]
      .iter()
      .copied()
      .enumerate()
      .fold((0usize, f32::MIN), |best, (id, score)| {
        if score > best.1 { (id, score) } else { best }
      });

    let score = objectness * class_score;
    if score < params.confidence {
      continue;
    }

    let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
    let bbox = [
      ((cx - w / 2.0) / input_w).clamp(0.0, 1.0),
      ((cy - h / 2.0) / input_h).clamp(0.0, 1.0),
      ((cx + w / 2.0) / input_w).clamp(0.0, 1.0),
      ((cy + h / 2.0) / input_h).clamp(0.0, 1.0),
    ];
    if bbox[0] >= bbox[2] || bbox[1] >= bbox[3] {
      continue;
    }

    candidates.push(DetectItem {
      class_id: class_id as u32,
      label: params.label(class_id),
      score,
      bbox,
    });
  }

  let items = nms(candidates, params.nms_threshold);
  debug!("检测到 {} 个目标", items.len());

  DetectResult::from(items)
}

/// 按类别做非极大值抑制
fn nms(mut detections: Vec<DetectItem>, threshold: f32) -> Vec<DetectItem> {
  detections.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result: Vec<DetectItem> = Vec::new();
  for candidate in detections {
    if result.len() >= YOLOV5_MAX_DETECTIONS {
      break;
    }
    let suppressed = result
      .iter()
      .any(|kept| kept.class_id == candidate.class_id && iou(&kept.bbox, &candidate.bbox) > threshold);
    if !suppressed {
      result.push(candidate);
    }
  }

  result
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn params() -> Yolov5Params {
    Yolov5Params {
      input_width: 100,
      input_height: 100,
      labels: vec!["fire".to_string(), "smoke".to_string()],
      ..Yolov5Params::default()
    }
  }

  #[test]
  fn decodes_rows_above_threshold() {
    #[rustfmt::skip]
    let data = [
      50.0, 50.0, 20.0, 40.0, 0.9, 0.9, 0.1,
      10.0, 10.0, 5.0, 5.0, 0.1, 0.9, 0.1,
    ];
    let result = postprocess(&data, 7, &params());

    assert_eq!(result.len(), 1);
    let item = &result.items[0];
    assert_eq!(item.label, "fire");
    assert!((item.score - 0.81).abs() < 1e-5);
    assert_eq!(item.bbox, [0.4, 0.3, 0.6, 0.7]);
  }

  #[test]
  fn low_class_score_is_dropped() {
    let data = [50.0, 50.0, 20.0, 20.0, 0.5, 0.2, 0.3];
    assert!(postprocess(&data, 7, &params()).is_empty());
  }

  #[test]
  fn overlapping_boxes_of_same_class_are_suppressed() {
    #[rustfmt::skip]
    let data = [
      50.0, 50.0, 20.0, 20.0, 0.9, 0.9, 0.0,
      51.0, 51.0, 20.0, 20.0, 0.8, 0.9, 0.0,
      51.0, 51.0, 20.0, 20.0, 0.8, 0.0, 0.9,
      10.0, 10.0, 10.0, 10.0, 0.7, 0.9, 0.0,
    ];
    let result = postprocess(&data, 7, &params());

    assert_eq!(result.len(), 3);
    assert_eq!(result.items[0].class_id, 0);
    assert_eq!(result.items[1].label, "smoke");
    assert_eq!(result.items[2].bbox, [0.05, 0.05, 0.15, 0.15]);
  }

  #[test]
  fn unknown_class_gets_placeholder_label() {
    let data = [50.0, 50.0, 20.0, 20.0, 0.9, 0.0, 0.0, 0.9];
    let result = postprocess(&data, 8, &params());
    assert_eq!(result.items[0].label, "class-2");
  }

  /// 输出直接等于输入张量的模型，输出形状为 `[1, 3, height, width]`
  fn passthrough_model(width: u32, height: u32) -> Yolov5 {
    let mut model = TypedModel::default();
    let input = model
      .add_source(
        "images",
        TypedFact::dt_shape(f32::datum_type(), [1, 3, height as usize, width as usize]),
      )
      .expect("source");
    model.set_output_outlets(&[input]).expect("outputs");
    let params = Yolov5Params {
      input_width: width,
      input_height: height,
      ..Yolov5Params::default()
    };
    Yolov5::with_plan(model.into_runnable().expect("plan"), params)
  }

  #[test]
  fn input_tensor_is_nchw() {
    // 输出按行解读时，红色通道第一行就是一个候选框：
    // cx=1 cy=1 w=1 h=1 objectness=1 fire=1
    let model = passthrough_model(6, 2);
    let mut image = RgbImage::new(6, 2);
    for x in 0..6 {
      image.put_pixel(x, 0, image::Rgb([255, 0, 0]));
    }

    let result = model.infer(&image).expect("infer");

    assert_eq!(result.len(), 1);
    let item = &result.items[0];
    assert_eq!(item.label, "fire");
    assert!((item.score - 1.0).abs() < 1e-5);
    let expected = [1.0 / 12.0, 0.25, 0.25, 0.75];
    for (got, want) in item.bbox.iter().zip(expected) {
      assert!((got - want).abs() < 1e-5, "{:?}", item.bbox);
    }
  }

  #[test]
  fn dark_frame_has_no_candidates() {
    let model = passthrough_model(6, 2);
    assert!(model.infer(&RgbImage::new(6, 2)).expect("infer").is_empty());
  }

  #[test]
  fn too_narrow_output_is_rejected() {
    let model = passthrough_model(4, 4);
    assert!(matches!(
      model.infer(&RgbImage::new(4, 4)),
      Err(ModelError::UnexpectedOutput(_))
    ));
  }

  #[test]
  fn invalid_model_file_is_a_load_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("best.onnx");
    std::fs::write(&path, b"not an onnx model").expect("write");

    let err = Yolov5::load(&path, Yolov5Params::default())
      .err()
      .expect("加载应当失败");
    assert!(matches!(err, ModelError::Load { .. }));
  }

  #[test]
  fn missing_model_file_is_reported() {
    let err = Yolov5::load("/nonexistent/best.onnx", Yolov5Params::default())
      .err()
      .expect("加载应当失败");
    assert!(matches!(err, ModelError::NotFound(_)));
  }
}
