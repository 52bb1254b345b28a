use serde::{Deserialize, Serialize};
use std::thread;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::video::source::{FramePair, VideoMeta, VideoSource};

/// フレーム数不一致の非致命警告。処理は短い方の長さで続行する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentWarning {
    pub dtl_frames: usize,
    pub face_frames: usize,
    /// 不一致の大きさ |dtl - face|
    pub magnitude: usize,
}

/// 2本の動画ソースを検証し、整列済みフレームペアを供給する
///
/// リソースはイテレーション終了時またはclose()で確定的に解放される。
/// 二重closeはno-op。
pub struct FrameSynchronizer {
    dtl: Option<Box<dyn VideoSource>>,
    face: Option<Box<dyn VideoSource>>,
    dtl_meta: VideoMeta,
    face_meta: VideoMeta,
    effective_len: usize,
    alignment_warning: Option<AlignmentWarning>,
}

impl FrameSynchronizer {
    /// 両ソースを検証して開く。プロパティ不正は`UnsupportedFormat`。
    /// フレーム数の不一致は失敗ではなく警告として記録し、
    /// 有効長をmin(dtl, face)に設定する。
    pub fn open(dtl: Box<dyn VideoSource>, face: Box<dyn VideoSource>) -> Result<Self> {
        let dtl_meta = dtl.meta().clone();
        let face_meta = face.meta().clone();

        for meta in [&dtl_meta, &face_meta] {
            let errors = meta.validate();
            if !errors.is_empty() {
                return Err(PipelineError::UnsupportedFormat {
                    path: meta.id.clone(),
                    reason: errors.join(", "),
                });
            }
        }

        let effective_len = dtl_meta.frame_count.min(face_meta.frame_count);
        let alignment_warning = if dtl_meta.frame_count != face_meta.frame_count {
            let warning = AlignmentWarning {
                dtl_frames: dtl_meta.frame_count,
                face_frames: face_meta.frame_count,
                magnitude: dtl_meta.frame_count.abs_diff(face_meta.frame_count),
            };
            warn!(
                dtl_frames = warning.dtl_frames,
                face_frames = warning.face_frames,
                magnitude = warning.magnitude,
                "frame count mismatch, aligning to shorter stream"
            );
            Some(warning)
        } else {
            None
        };

        Ok(Self {
            dtl: Some(dtl),
            face: Some(face),
            dtl_meta,
            face_meta,
            effective_len,
            alignment_warning,
        })
    }

    pub fn dtl_meta(&self) -> &VideoMeta {
        &self.dtl_meta
    }

    pub fn face_meta(&self) -> &VideoMeta {
        &self.face_meta
    }

    /// 整列後の有効シーケンス長 min(dtl, face)
    pub fn effective_len(&self) -> usize {
        self.effective_len
    }

    pub fn alignment_warning(&self) -> Option<&AlignmentWarning> {
        self.alignment_warning.as_ref()
    }

    /// ダウンサンプル係数kで選択されるインデックス列 0, k, 2k, …
    /// （カウンタのフィルタリングではなく整数ストライドで選ぶ）
    pub fn selected_indices(&self, downsample: usize) -> impl Iterator<Item = usize> {
        let k = downsample.max(1);
        (0..self.effective_len).step_by(k)
    }

    /// ダウンサンプル後に生成されるペア数 ceil(effective_len / k)
    pub fn pair_count(&self, downsample: usize) -> usize {
        let k = downsample.max(1);
        self.effective_len.div_ceil(k)
    }

    /// 指定インデックスのペアを読む。デコード失敗したサイドは
    /// Noneの欠損センチネルになる（エラーにしない）。
    pub fn read_pair(&mut self, index: usize) -> FramePair {
        let dtl = Self::read_side(self.dtl.as_deref_mut(), index, "dtl");
        let face = Self::read_side(self.face.as_deref_mut(), index, "face");
        FramePair { index, dtl, face }
    }

    /// インデックス列をまとめて読む。2本のストリームは独立した
    /// リーダーが並行デコードする（各リーダーがソースを排他所有）。
    pub fn read_batch(&mut self, indices: &[usize]) -> Vec<FramePair> {
        let dtl = self.dtl.as_deref_mut();
        let face = self.face.as_deref_mut();

        let (dtl_frames, face_frames) = thread::scope(|s| {
            let dtl_handle = s.spawn(move || {
                let mut source = dtl;
                indices
                    .iter()
                    .map(|&i| Self::read_side(source.as_deref_mut(), i, "dtl"))
                    .collect::<Vec<_>>()
            });
            let face_frames = {
                let mut source = face;
                indices
                    .iter()
                    .map(|&i| Self::read_side(source.as_deref_mut(), i, "face"))
                    .collect::<Vec<_>>()
            };
            (dtl_handle.join().expect("dtl reader panicked"), face_frames)
        });

        indices
            .iter()
            .zip(dtl_frames.into_iter().zip(face_frames))
            .map(|(&index, (dtl, face))| FramePair { index, dtl, face })
            .collect()
    }

    fn read_side(
        source: Option<&mut (dyn VideoSource + 'static)>,
        index: usize,
        angle: &str,
    ) -> Option<crate::video::source::Raster> {
        let source = source?;
        match source.read_frame(index) {
            Ok(raster) => Some(raster),
            Err(err) => {
                debug!(angle, index, %err, "frame decode failed, marking missing");
                None
            }
        }
    }

    /// 遅延イテレーション。`ceil(effective_len / k)`個のペアを生成する。
    pub fn iter(&mut self, downsample: usize) -> FramePairIter<'_> {
        let indices: Vec<usize> = self.selected_indices(downsample).collect();
        FramePairIter {
            sync: self,
            indices,
            cursor: 0,
        }
    }

    /// ランダムアクセスが必要な呼び出し側向けの先行読み込み
    pub fn materialize_all(&mut self, downsample: usize) -> Vec<FramePair> {
        let indices: Vec<usize> = self.selected_indices(downsample).collect();
        self.read_batch(&indices)
    }

    /// 両ソースを解放する。二重closeはno-op（Dropでも解放される）。
    pub fn close(&mut self) {
        self.dtl = None;
        self.face = None;
    }

    pub fn is_closed(&self) -> bool {
        self.dtl.is_none() && self.face.is_none()
    }
}

/// `FrameSynchronizer::iter`の遅延イテレータ
pub struct FramePairIter<'a> {
    sync: &'a mut FrameSynchronizer,
    indices: Vec<usize>,
    cursor: usize,
}

impl Iterator for FramePairIter<'_> {
    type Item = FramePair;

    fn next(&mut self) -> Option<FramePair> {
        let index = *self.indices.get(self.cursor)?;
        self.cursor += 1;
        Some(self.sync.read_pair(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.indices.len() - self.cursor;
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::source::Raster;
    use anyhow::bail;

    /// テスト用の合成ソース。指定インデックスでデコード失敗を再現できる。
    pub(crate) struct SyntheticSource {
        meta: VideoMeta,
        fail_at: Vec<usize>,
    }

    impl SyntheticSource {
        pub(crate) fn new(id: &str, frame_count: usize) -> Self {
            Self {
                meta: VideoMeta {
                    id: id.to_string(),
                    frame_count,
                    frame_rate: 60.0,
                    width: 64,
                    height: 48,
                },
                fail_at: Vec::new(),
            }
        }

        fn failing_at(mut self, indices: &[usize]) -> Self {
            self.fail_at = indices.to_vec();
            self
        }
    }

    impl VideoSource for SyntheticSource {
        fn meta(&self) -> &VideoMeta {
            &self.meta
        }

        fn read_frame(&mut self, index: usize) -> anyhow::Result<Raster> {
            if index >= self.meta.frame_count {
                bail!("index {} out of range", index);
            }
            if self.fail_at.contains(&index) {
                bail!("synthetic decode failure at {}", index);
            }
            Ok(Raster::empty(self.meta.width, self.meta.height))
        }
    }

    fn open_pair(a: usize, b: usize) -> FrameSynchronizer {
        FrameSynchronizer::open(
            Box::new(SyntheticSource::new("dtl", a)),
            Box::new(SyntheticSource::new("face", b)),
        )
        .unwrap()
    }

    #[test]
    fn test_effective_len_is_min() {
        let sync = open_pair(300, 280);
        assert_eq!(sync.effective_len(), 280);
    }

    #[test]
    fn test_alignment_warning_iff_mismatch() {
        let sync = open_pair(300, 280);
        let warning = sync.alignment_warning().unwrap();
        assert_eq!(warning.magnitude, 20);
        assert_eq!(warning.dtl_frames, 300);
        assert_eq!(warning.face_frames, 280);

        let sync = open_pair(300, 300);
        assert!(sync.alignment_warning().is_none());
    }

    #[test]
    fn test_unsupported_format_on_invalid_meta() {
        let mut source = SyntheticSource::new("bad", 0);
        source.meta.frame_rate = 0.0;
        let result = FrameSynchronizer::open(
            Box::new(source),
            Box::new(SyntheticSource::new("face", 300)),
        );
        assert!(matches!(
            result,
            Err(PipelineError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_downsample_pair_count_and_indices() {
        let mut sync = open_pair(10, 10);
        // ceil(10 / 3) = 4、インデックスは 0, 3, 6, 9
        assert_eq!(sync.pair_count(3), 4);
        let pairs: Vec<FramePair> = sync.iter(3).collect();
        let indices: Vec<usize> = pairs.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_downsample_factor_one_yields_all() {
        let mut sync = open_pair(7, 7);
        assert_eq!(sync.pair_count(1), 7);
        assert_eq!(sync.iter(1).count(), 7);
        // 係数0は1にクランプ
        assert_eq!(sync.pair_count(0), 7);
    }

    #[test]
    fn test_decode_failure_yields_missing_sentinel() {
        let mut sync = FrameSynchronizer::open(
            Box::new(SyntheticSource::new("dtl", 5).failing_at(&[2])),
            Box::new(SyntheticSource::new("face", 5)),
        )
        .unwrap();
        let pairs = sync.materialize_all(1);
        assert_eq!(pairs.len(), 5);
        assert!(pairs[2].dtl.is_none());
        assert!(pairs[2].face.is_some());
        assert!(!pairs[2].is_missing());
    }

    #[test]
    fn test_read_batch_matches_sequential() {
        let mut sync = open_pair(6, 6);
        let batch = sync.read_batch(&[0, 2, 4]);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].index, 0);
        assert_eq!(batch[2].index, 4);
        assert!(batch.iter().all(|p| p.dtl.is_some() && p.face.is_some()));
    }

    #[test]
    fn test_double_close_is_noop() {
        let mut sync = open_pair(3, 3);
        sync.close();
        assert!(sync.is_closed());
        sync.close();
        assert!(sync.is_closed());
        // close後の読み込みは欠損センチネル
        let pair = sync.read_pair(0);
        assert!(pair.is_missing());
    }
}
