use std::collections::VecDeque;
use std::thread;
use tracing::{debug, warn};

use crate::pose::backend::PoseBackend;
use crate::pose::landmark::{LandmarkFrame, LandmarkIndex};
use crate::pose::phase::SwingPhaseMap;
use crate::video::source::FramePair;

/// これ未満の有効フレーム数ではフェーズ検出を試みない
const MIN_VALID_FRAMES: usize = 10;

/// 1フレーム分のポーズ解析結果
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub frame_index: usize,
    pub dtl: Option<LandmarkFrame>,
    pub face: Option<LandmarkFrame>,
}

impl FrameAnalysis {
    /// 両アングルで人物を検出できたか
    pub fn swing_detected(&self) -> bool {
        self.dtl.is_some() && self.face.is_some()
    }
}

/// 外部ポーズ能力へのフレーム供給とランドマーク列のバッファリング
///
/// アングルごとに有界デックを持ち、バッファ済み列からスイングの
/// 局面（アドレス→トップ→インパクト→フィニッシュ）を検出する。
/// 低信頼・欠損フレームは検出から除外されるだけで、エラーにはしない。
pub struct PoseDataAdapter {
    capacity: usize,
    visibility_threshold: f64,
    dtl_buffer: VecDeque<(usize, Option<LandmarkFrame>)>,
    face_buffer: VecDeque<(usize, Option<LandmarkFrame>)>,
    /// ポーズ検出に失敗（または欠損）したフレーム数
    skipped: usize,
}

impl PoseDataAdapter {
    pub fn new(capacity: usize, visibility_threshold: f64) -> Self {
        Self {
            capacity: capacity.max(MIN_VALID_FRAMES),
            visibility_threshold,
            dtl_buffer: VecDeque::new(),
            face_buffer: VecDeque::new(),
            skipped: 0,
        }
    }

    /// フレームペアを両バックエンドにかけ、結果をバッファに積む。
    ///
    /// DTLとフェースオンは互いに独立な計算なので別スレッドで並行実行し、
    /// 両方の結果が揃ってから返る。バックエンドの失敗はフレーム単位で
    /// 吸収してスキップ扱いにする（呼び出し側にエラーは返さない）。
    pub fn analyze(
        &mut self,
        pair: &FramePair,
        dtl_backend: &mut dyn PoseBackend,
        face_backend: &mut dyn PoseBackend,
    ) -> FrameAnalysis {
        let (dtl, face) = thread::scope(|s| {
            let dtl_handle = s.spawn(|| Self::detect_side(pair.dtl.as_ref(), dtl_backend, "dtl", pair.index));
            let face = Self::detect_side(pair.face.as_ref(), face_backend, "face", pair.index);
            (dtl_handle.join().expect("dtl detection panicked"), face)
        });

        let analysis = FrameAnalysis {
            frame_index: pair.index,
            dtl,
            face,
        };
        self.push(analysis.clone());
        analysis
    }

    fn detect_side(
        raster: Option<&crate::video::source::Raster>,
        backend: &mut dyn PoseBackend,
        angle: &str,
        index: usize,
    ) -> Option<LandmarkFrame> {
        let raster = raster?;
        match backend.detect(raster) {
            Ok(result) => result,
            Err(err) => {
                warn!(angle, index, %err, "pose detection failed, skipping frame");
                None
            }
        }
    }

    /// 検出済みの結果（キャッシュヒットなど）を直接バッファに積む
    pub fn push(&mut self, analysis: FrameAnalysis) {
        if analysis.dtl.is_none() || analysis.face.is_none() {
            self.skipped += 1;
        }
        if self.dtl_buffer.len() >= self.capacity {
            self.dtl_buffer.pop_front();
        }
        if self.face_buffer.len() >= self.capacity {
            self.face_buffer.pop_front();
        }
        self.dtl_buffer
            .push_back((analysis.frame_index, analysis.dtl));
        self.face_buffer
            .push_back((analysis.frame_index, analysis.face));
    }

    pub fn len(&self) -> usize {
        self.dtl_buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dtl_buffer.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// バッファ順のDTLランドマーク列（指標抽出への入力）
    pub fn dtl_frames(&self) -> Vec<Option<LandmarkFrame>> {
        self.dtl_buffer.iter().map(|(_, f)| f.clone()).collect()
    }

    /// スイング消費後にバッファを空にしてメモリを解放する
    pub fn clear(&mut self) {
        self.dtl_buffer.clear();
        self.face_buffer.clear();
        self.skipped = 0;
    }

    /// バッファ済みDTL列から局面を検出する
    ///
    /// 手首高さの軌跡ヒューリスティック:
    /// - アドレス = 最初の有効フレーム
    /// - トップ = 手首yの最小値（画像座標は下が正なので最高到達点）
    /// - インパクト = トップ以降の手首yの最大値
    /// - フィニッシュ = 最後の有効フレーム
    ///
    /// 有効フレームが足りない場合は全てNone。ベストエフォートであり、
    /// ノイズの多いデータで誤検出しうる前提で下流はNoneを許容する。
    pub fn detect_phases(&self) -> SwingPhaseMap {
        let wrist_heights: Vec<Option<f64>> = self
            .dtl_buffer
            .iter()
            .map(|(_, frame)| {
                let frame = frame.as_ref()?;
                let wrist = frame.get(LandmarkIndex::LeftWrist);
                if wrist.is_valid(self.visibility_threshold) {
                    Some(wrist.y)
                } else {
                    None
                }
            })
            .collect();

        let valid: Vec<(usize, f64)> = wrist_heights
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.map(|h| (i, h)))
            .collect();

        if valid.len() < MIN_VALID_FRAMES {
            debug!(
                valid = valid.len(),
                min = MIN_VALID_FRAMES,
                "not enough valid frames for phase detection"
            );
            return SwingPhaseMap::default();
        }

        let address = valid.first().map(|(i, _)| *i);
        let finish = valid.last().map(|(i, _)| *i);

        // トップ: 最小y（最も高い位置）
        let top = valid
            .iter()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| *i);

        // インパクト: トップ以降で最大y（急降下の終端）
        let impact = top.and_then(|top_idx| {
            valid
                .iter()
                .filter(|(i, _)| *i > top_idx)
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, _)| *i)
        });

        SwingPhaseMap {
            address,
            top,
            impact,
            finish,
        }
        .enforce_ordering()
    }
}
