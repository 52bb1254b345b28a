//! MoveNet (ONNX) による `PoseBackend` 実装。
//!
//! パイプライン本体はトレイトしか見ないので、このモジュールは
//! `movenet` フィーチャを有効にしたときだけビルドされる。

use anyhow::{Context, Result};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use crate::pose::backend::PoseBackend;
use crate::pose::landmark::{Landmark, LandmarkFrame, LandmarkIndex};
use crate::video::source::Raster;

const INPUT_SIZE: usize = 192;

/// MoveNetの17キーポイント→13ランドマークの対応表
/// （目・耳はスイング解析で使わないので捨てる）
const MOVENET_MAP: [(usize, LandmarkIndex); LandmarkIndex::COUNT] = [
    (0, LandmarkIndex::Nose),
    (5, LandmarkIndex::LeftShoulder),
    (6, LandmarkIndex::RightShoulder),
    (7, LandmarkIndex::LeftElbow),
    (8, LandmarkIndex::RightElbow),
    (9, LandmarkIndex::LeftWrist),
    (10, LandmarkIndex::RightWrist),
    (11, LandmarkIndex::LeftHip),
    (12, LandmarkIndex::RightHip),
    (13, LandmarkIndex::LeftKnee),
    (14, LandmarkIndex::RightKnee),
    (15, LandmarkIndex::LeftAnkle),
    (16, LandmarkIndex::RightAnkle),
];

pub struct MoveNetBackend {
    session: Session,
    /// 全キーポイントの平均信頼度がこれ未満なら「人物なし」扱い
    presence_threshold: f64,
}

impl MoveNetBackend {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path.as_ref())
            .context("Failed to load ONNX model")?;

        Ok(Self {
            session,
            presence_threshold: 0.2,
        })
    }

    /// BGRラスタを[1, 192, 192, 3]のRGBテンソルに変換（最近傍リサイズ）
    fn preprocess(raster: &Raster) -> Array4<f32> {
        let mut input = Array4::<f32>::zeros((1, INPUT_SIZE, INPUT_SIZE, 3));
        let (w, h) = (raster.width as usize, raster.height as usize);
        if w == 0 || h == 0 {
            return input;
        }

        for oy in 0..INPUT_SIZE {
            let sy = (oy * h) / INPUT_SIZE;
            for ox in 0..INPUT_SIZE {
                let sx = (ox * w) / INPUT_SIZE;
                let offset = (sy * w + sx) * 3;
                if offset + 2 < raster.data.len() {
                    // BGR → RGB
                    input[[0, oy, ox, 0]] = raster.data[offset + 2] as f32;
                    input[[0, oy, ox, 1]] = raster.data[offset + 1] as f32;
                    input[[0, oy, ox, 2]] = raster.data[offset] as f32;
                }
            }
        }
        input
    }
}

impl PoseBackend for MoveNetBackend {
    fn detect(&mut self, raster: &Raster) -> Result<Option<LandmarkFrame>> {
        let input_tensor = Tensor::from_array(Self::preprocess(raster))?;
        let outputs = self
            .session
            .run(ort::inputs!["serving_default_input_0" => input_tensor])
            .context("Inference failed")?;

        // MoveNetの出力は [1, 1, 17, 3] (y, x, confidence)
        let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        let mut frame = LandmarkFrame::default();
        for (src, dst) in MOVENET_MAP {
            let y = output[[0, 0, src, 0]] as f64;
            let x = output[[0, 0, src, 1]] as f64;
            let confidence = output[[0, 0, src, 2]] as f64;
            frame.set(dst, Landmark::new(x, y, 0.0, confidence));
        }

        if frame.average_visibility() < self.presence_threshold {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}
