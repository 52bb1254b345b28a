use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 対応コンテナの拡張子
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "webm"];

/// 検証済み動画のプロパティ。検証後は不変。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    /// ソース識別子（通常はパス）。キャッシュキーにも使う
    pub id: String,
    pub frame_count: usize,
    pub frame_rate: f64,
    pub width: u32,
    pub height: u32,
}

impl VideoMeta {
    pub fn duration_secs(&self) -> f64 {
        if self.frame_rate > 0.0 {
            self.frame_count as f64 / self.frame_rate
        } else {
            0.0
        }
    }

    /// プロパティ検証。不正があれば理由のリストを返す
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.frame_rate <= 0.0 {
            errors.push("invalid fps".to_string());
        }
        if self.frame_count == 0 {
            errors.push("no frames in video".to_string());
        }
        if self.width == 0 || self.height == 0 {
            errors.push("invalid resolution".to_string());
        }
        errors
    }
}

/// パスの拡張子が対応コンテナか
pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// デコード済み1フレーム（BGRパック、行連続）
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Raster {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    /// テスト・合成ソース用の空ラスタ
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height * 3) as usize],
        }
    }
}

/// 整列済みの1フレームペア
///
/// 整列後にどちらか一方だけ終端に達することはないが、
/// デコード失敗したサイドはNone（欠損センチネル）になる。
#[derive(Debug, Clone)]
pub struct FramePair {
    /// 整列後の論理フレームインデックス（ダウンサンプル前の元インデックス）
    pub index: usize,
    pub dtl: Option<Raster>,
    pub face: Option<Raster>,
}

impl FramePair {
    /// 両サイドともデコード失敗か
    pub fn is_missing(&self) -> bool {
        self.dtl.is_none() && self.face.is_none()
    }
}

/// デコード可能な動画ソース
///
/// 実装はフレーム単位のランダムアクセスを提供する。リーダースレッドが
/// 排他所有する前提なのでSendのみ要求する。
pub trait VideoSource: Send {
    fn meta(&self) -> &VideoMeta;

    /// 指定インデックスのフレームをデコードする。
    /// 範囲外・デコード失敗はErr（呼び出し側が欠損センチネルに変換する）。
    fn read_frame(&mut self, index: usize) -> Result<Raster>;
}
