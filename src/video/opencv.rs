use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::path::Path;

use crate::error::PipelineError;
use crate::video::source::{is_supported_extension, Raster, VideoMeta, VideoSource};

/// OpenCVを使用した動画ファイルのデコード
pub struct OpenCvVideoSource {
    capture: VideoCapture,
    meta: VideoMeta,
    /// 次にreadで返るフレームの位置（シーク回避用）
    next_pos: usize,
}

impl OpenCvVideoSource {
    /// 動画ファイルを開いてプロパティを検証する
    pub fn open<P: AsRef<Path>>(path: P) -> std::result::Result<Self, PipelineError> {
        let path = path.as_ref();
        if !is_supported_extension(path) {
            return Err(PipelineError::UnsupportedFormat {
                path: path.display().to_string(),
                reason: "unsupported container extension".to_string(),
            });
        }

        let path_str = path.to_string_lossy().to_string();
        let capture = VideoCapture::from_file(&path_str, VideoCaptureAPIs::CAP_ANY as i32)
            .context("Failed to open video")?;
        if !capture.is_opened().context("Failed to query capture state")? {
            return Err(PipelineError::UnsupportedFormat {
                path: path_str,
                reason: "could not open video".to_string(),
            });
        }

        let meta = VideoMeta {
            id: path_str.clone(),
            frame_count: capture
                .get(videoio::CAP_PROP_FRAME_COUNT)
                .context("Failed to read frame count")? as usize,
            frame_rate: capture
                .get(videoio::CAP_PROP_FPS)
                .context("Failed to read fps")?,
            width: capture
                .get(videoio::CAP_PROP_FRAME_WIDTH)
                .context("Failed to read width")? as u32,
            height: capture
                .get(videoio::CAP_PROP_FRAME_HEIGHT)
                .context("Failed to read height")? as u32,
        };

        let errors = meta.validate();
        if !errors.is_empty() {
            return Err(PipelineError::UnsupportedFormat {
                path: path_str,
                reason: errors.join(", "),
            });
        }

        Ok(Self {
            capture,
            meta,
            next_pos: 0,
        })
    }

    fn mat_to_raster(frame: &Mat, width: u32, height: u32) -> Result<Raster> {
        let bytes = frame.data_bytes().context("Failed to access frame data")?;
        Ok(Raster::new(width, height, bytes.to_vec()))
    }
}

impl VideoSource for OpenCvVideoSource {
    fn meta(&self) -> &VideoMeta {
        &self.meta
    }

    fn read_frame(&mut self, index: usize) -> Result<Raster> {
        if index >= self.meta.frame_count {
            anyhow::bail!("frame {} out of range ({})", index, self.meta.frame_count);
        }

        // 順次読みならシークを省略する
        if index != self.next_pos {
            self.capture
                .set(videoio::CAP_PROP_POS_FRAMES, index as f64)
                .context("Failed to seek")?;
        }

        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;
        if frame.empty() {
            anyhow::bail!("Empty frame at index {}", index);
        }
        self.next_pos = index + 1;

        Self::mat_to_raster(&frame, self.meta.width, self.meta.height)
    }
}
