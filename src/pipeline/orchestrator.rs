use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

use crate::analysis::flaw::{FlawDetector, FlawReport, IdealRanges};
use crate::analysis::metrics::{MetricSet, MetricsExtractor};
use crate::analysis::style::{classify_style, MatchResult, StyleMatcher};
use crate::cache::{CacheKey, CacheStats, CachedFrame, FrameCache};
use crate::config::AnalysisConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::progress::{CancelToken, PipelineState, ProgressEvent};
use crate::pose::adapter::{FrameAnalysis, PoseDataAdapter};
use crate::pose::backend::PoseBackend;
use crate::pose::phase::SwingPhaseMap;
use crate::telemetry::{PerfMonitor, PerfSummary};
use crate::video::source::VideoSource;
use crate::video::sync::{AlignmentWarning, FrameSynchronizer};

/// 1スイング解析の最終成果物
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub phases: SwingPhaseMap,
    pub metrics: MetricSet,
    pub flaw_report: FlawReport,
    pub match_result: Option<MatchResult>,
    pub style_tags: Vec<String>,
    pub alignment_warning: Option<AlignmentWarning>,
    pub perf: PerfSummary,
    pub cache_stats: CacheStats,
    pub frames_processed: usize,
    /// 両アングルともデコードできなかったフレーム数
    pub frames_skipped: usize,
    /// ポーズ検出に失敗した（片側以上欠損の）フレーム数
    pub pose_skipped: usize,
}

/// スイング解析パイプラインの編成役
///
/// フレーム同期、ポーズ検出、局面検出、指標抽出、欠点検出、
/// スタイル照合を1回のrun呼び出しに束ねる。キャンセルはバッチ境界で
/// のみ確認され、進捗イベントもバッチ境界で発行される。
pub struct SwingPipeline {
    config: AnalysisConfig,
    cache: Arc<FrameCache>,
    flaw_detector: FlawDetector,
    matcher: Option<StyleMatcher>,
}

impl SwingPipeline {
    pub fn new(config: AnalysisConfig, cache: Arc<FrameCache>) -> Self {
        Self {
            config: config.normalized(),
            cache,
            flaw_detector: FlawDetector::new(IdealRanges::default()),
            matcher: None,
        }
    }

    pub fn with_ideal_ranges(mut self, ranges: IdealRanges) -> Self {
        self.flaw_detector = FlawDetector::new(ranges);
        self
    }

    /// スタイル照合を有効にする。未設定ならmatch_resultは常にNone。
    pub fn with_matcher(mut self, matcher: StyleMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// 2本の動画ソースを開いて解析する。
    ///
    /// openの失敗（不正フォーマット等）はFailedイベントを発行してから
    /// エラーの種別ごと返す。キャンセル時は`PipelineError::Cancelled`。
    /// 1フレームも処理できなかった場合は`PipelineError::TotalDecodeFailure`。
    /// 個別フレームの失敗はスキップとして吸収する。
    pub fn run(
        &self,
        dtl_source: Box<dyn VideoSource>,
        face_source: Box<dyn VideoSource>,
        dtl_backend: &mut dyn PoseBackend,
        face_backend: &mut dyn PoseBackend,
        club_type: &str,
        cancel: &CancelToken,
        progress: Option<&Sender<ProgressEvent>>,
    ) -> Result<AnalysisOutcome> {
        let started = Instant::now();

        Self::emit(
            progress,
            PipelineState::Loading,
            0,
            0,
            started,
            "opening streams".to_string(),
        );
        let mut sync = match FrameSynchronizer::open(dtl_source, face_source) {
            Ok(sync) => sync,
            Err(err) => {
                Self::emit(
                    progress,
                    PipelineState::Failed,
                    0,
                    0,
                    started,
                    format!("open failed: {err}"),
                );
                return Err(err);
            }
        };

        let k = self.config.downsample_factor;
        let indices: Vec<usize> = sync.selected_indices(k).collect();
        let total = indices.len();
        let pair_id = format!("{}+{}", sync.dtl_meta().id, sync.face_meta().id);
        let alignment_warning = sync.alignment_warning().cloned();
        // ダウンサンプル後の実効フレームレート
        let effective_rate = sync.dtl_meta().frame_rate / k as f64;

        let threshold = self.config.quality_mode.visibility_threshold();
        let mut adapter = PoseDataAdapter::new(self.config.buffer_capacity, threshold);
        let mut monitor = PerfMonitor::new(self.config.frame_budget_ms);
        let mut frames_processed = 0usize;
        let mut frames_skipped = 0usize;

        for chunk in indices.chunks(self.config.batch_size) {
            if cancel.is_cancelled() {
                info!(frames_processed, total, "cancelled at batch boundary");
                Self::emit(
                    progress,
                    PipelineState::Cancelled,
                    frames_processed,
                    total,
                    started,
                    "cancelled".to_string(),
                );
                sync.close();
                return Err(PipelineError::Cancelled);
            }

            // キャッシュミスのフレームだけデコードする
            let mut hits: HashMap<usize, CachedFrame> = HashMap::new();
            let mut miss_indices = Vec::with_capacity(chunk.len());
            for &index in chunk {
                let key = CacheKey::new(&pair_id, index);
                match self.cache.get(&key) {
                    Some(cached) => {
                        hits.insert(index, cached);
                    }
                    None => miss_indices.push(index),
                }
            }
            let mut decoded: HashMap<usize, _> = sync
                .read_batch(&miss_indices)
                .into_iter()
                .map(|pair| (pair.index, pair))
                .collect();

            for &index in chunk {
                let frame_started = Instant::now();
                if let Some(cached) = hits.remove(&index) {
                    adapter.push(FrameAnalysis {
                        frame_index: index,
                        dtl: cached.dtl,
                        face: cached.face,
                    });
                    frames_processed += 1;
                } else if let Some(pair) = decoded.remove(&index) {
                    if pair.is_missing() {
                        debug!(index, "both angles missing, skipping frame");
                        frames_skipped += 1;
                        continue;
                    }
                    let analysis = adapter.analyze(&pair, dtl_backend, face_backend);
                    self.cache.insert(
                        CacheKey::new(&pair_id, index),
                        CachedFrame {
                            dtl: analysis.dtl.clone(),
                            face: analysis.face.clone(),
                        },
                    );
                    frames_processed += 1;
                }
                monitor.record(index, frame_started.elapsed().as_secs_f64() * 1000.0);
            }

            Self::emit(
                progress,
                PipelineState::Processing,
                frames_processed,
                total,
                started,
                format!("{frames_processed}/{total} frames"),
            );
        }

        sync.close();

        if frames_processed == 0 {
            Self::emit(
                progress,
                PipelineState::Failed,
                0,
                total,
                started,
                "no frames decoded".to_string(),
            );
            return Err(PipelineError::TotalDecodeFailure {
                skipped: frames_skipped,
            });
        }

        let phases = adapter.detect_phases();
        let extractor = MetricsExtractor::new(threshold);
        let metrics = extractor.extract(&adapter.dtl_frames(), &phases, effective_rate);

        // 欠点検出とスタイル照合は独立なので並行実行する
        let (flaw_report, match_result) = thread::scope(|s| {
            let style_handle = self
                .matcher
                .as_ref()
                .map(|matcher| s.spawn(|| matcher.find_best_match(&metrics, club_type)));
            let report = self.flaw_detector.detect(&metrics);
            let matched = match style_handle {
                Some(handle) => handle.join().expect("style matcher panicked"),
                None => Ok(None),
            };
            (report, matched)
        });
        let match_result = match match_result {
            Ok(result) => result,
            Err(err) => {
                Self::emit(
                    progress,
                    PipelineState::Failed,
                    frames_processed,
                    total,
                    started,
                    format!("style matching failed: {err}"),
                );
                return Err(PipelineError::Backend(err));
            }
        };
        let style_tags = classify_style(&metrics);

        Self::emit(
            progress,
            PipelineState::Completed,
            frames_processed,
            total,
            started,
            "analysis complete".to_string(),
        );
        info!(
            frames_processed,
            frames_skipped,
            pose_skipped = adapter.skipped(),
            score = flaw_report.overall_score,
            "swing analysis complete"
        );

        Ok(AnalysisOutcome {
            phases,
            metrics,
            flaw_report,
            match_result,
            style_tags,
            alignment_warning,
            perf: monitor.summary(),
            cache_stats: self.cache.stats(),
            frames_processed,
            frames_skipped,
            pose_skipped: adapter.skipped(),
        })
    }

    fn emit(
        progress: Option<&Sender<ProgressEvent>>,
        state: PipelineState,
        frames_processed: usize,
        frames_total: usize,
        started: Instant,
        message: String,
    ) {
        let Some(tx) = progress else { return };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let eta_ms = if frames_processed > 0 && frames_total > frames_processed {
            Some(elapsed_ms / frames_processed as f64 * (frames_total - frames_processed) as f64)
        } else {
            None
        };
        // 受信側が先に終了していても進捗は落とすだけで処理は続行する
        let _ = tx.send(ProgressEvent {
            state,
            frames_processed,
            frames_total,
            elapsed_ms,
            eta_ms,
            message,
        });
    }
}
