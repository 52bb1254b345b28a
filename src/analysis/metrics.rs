use serde::{Deserialize, Serialize};

use crate::pose::landmark::{LandmarkFrame, LandmarkIndex};
use crate::pose::phase::SwingPhaseMap;

/// スイングから抽出するバイオメカニクス指標
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    HipRotationTop,
    ShoulderRotationTop,
    XFactor,
    SpineAngleAddress,
    SpineAngleImpact,
    SpineAngleChange,
    BackswingTime,
    DownswingTime,
    TempoRatio,
    WeightTransfer,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::HipRotationTop,
        Metric::ShoulderRotationTop,
        Metric::XFactor,
        Metric::SpineAngleAddress,
        Metric::SpineAngleImpact,
        Metric::SpineAngleChange,
        Metric::BackswingTime,
        Metric::DownswingTime,
        Metric::TempoRatio,
        Metric::WeightTransfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::HipRotationTop => "hip_rotation_top",
            Metric::ShoulderRotationTop => "shoulder_rotation_top",
            Metric::XFactor => "x_factor",
            Metric::SpineAngleAddress => "spine_angle_address",
            Metric::SpineAngleImpact => "spine_angle_impact",
            Metric::SpineAngleChange => "spine_angle_change",
            Metric::BackswingTime => "backswing_time",
            Metric::DownswingTime => "downswing_time",
            Metric::TempoRatio => "tempo_ratio",
            Metric::WeightTransfer => "weight_transfer",
        }
    }
}

/// 1スイング分の指標セット。作成後は不変。
/// 検出できなかったフェーズに依存する指標はNoneのまま（値を捏造しない）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub hip_rotation_top: Option<f64>,
    pub shoulder_rotation_top: Option<f64>,
    pub x_factor: Option<f64>,
    pub spine_angle_address: Option<f64>,
    pub spine_angle_impact: Option<f64>,
    pub spine_angle_change: Option<f64>,
    pub backswing_time: Option<f64>,
    pub downswing_time: Option<f64>,
    pub tempo_ratio: Option<f64>,
    pub weight_transfer: Option<f64>,
}

impl MetricSet {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::HipRotationTop => self.hip_rotation_top,
            Metric::ShoulderRotationTop => self.shoulder_rotation_top,
            Metric::XFactor => self.x_factor,
            Metric::SpineAngleAddress => self.spine_angle_address,
            Metric::SpineAngleImpact => self.spine_angle_impact,
            Metric::SpineAngleChange => self.spine_angle_change,
            Metric::BackswingTime => self.backswing_time,
            Metric::DownswingTime => self.downswing_time,
            Metric::TempoRatio => self.tempo_ratio,
            Metric::WeightTransfer => self.weight_transfer,
        }
    }

    /// 値が入っている指標の数
    pub fn populated_count(&self) -> usize {
        Metric::ALL.iter().filter(|m| self.get(**m).is_some()).count()
    }
}

/// 体幹の回転量（度）: 左右ジョイントペアのatan2(Δz, Δx)の差分
///
/// ±180°に折り返してから絶対値を取る。左右どちらかが低信頼ならNone。
fn rotation_between(
    from: &LandmarkFrame,
    to: &LandmarkFrame,
    left: LandmarkIndex,
    right: LandmarkIndex,
    threshold: f64,
) -> Option<f64> {
    let angle_of = |frame: &LandmarkFrame| -> Option<f64> {
        let l = frame.get(left);
        let r = frame.get(right);
        if !l.is_valid(threshold) || !r.is_valid(threshold) {
            return None;
        }
        let dx = r.x - l.x;
        let dz = r.z - l.z;
        if dx.abs() < 1e-3 && dz.abs() < 1e-3 {
            return Some(0.0);
        }
        Some(dz.atan2(dx).to_degrees())
    };

    let a = angle_of(from)?;
    let b = angle_of(to)?;
    let mut rotation = b - a;
    while rotation > 180.0 {
        rotation -= 360.0;
    }
    while rotation < -180.0 {
        rotation += 360.0;
    }
    Some(rotation.abs())
}

/// 脊柱前傾角（度）: 腰中点→肩中点ベクトルの鉛直からの傾き
///
/// [0°, 90°]に折り返す（0=直立、90=水平）。
fn spine_angle(frame: &LandmarkFrame, threshold: f64) -> Option<f64> {
    let ls = frame.get(LandmarkIndex::LeftShoulder);
    let rs = frame.get(LandmarkIndex::RightShoulder);
    let lh = frame.get(LandmarkIndex::LeftHip);
    let rh = frame.get(LandmarkIndex::RightHip);
    if !ls.is_valid(threshold)
        || !rs.is_valid(threshold)
        || !lh.is_valid(threshold)
        || !rh.is_valid(threshold)
    {
        return None;
    }

    let shoulder_mid_x = (ls.x + rs.x) / 2.0;
    let shoulder_mid_y = (ls.y + rs.y) / 2.0;
    let hip_mid_x = (lh.x + rh.x) / 2.0;
    let hip_mid_y = (lh.y + rh.y) / 2.0;

    let dx = shoulder_mid_x - hip_mid_x;
    let dy = shoulder_mid_y - hip_mid_y;
    if dy.abs() < 1e-3 {
        // 肩と腰が同じ高さ: 角度が定義できないので0を返す
        return Some(0.0);
    }

    let angle = dx.abs().atan2(dy.abs()).to_degrees();
    Some(angle.clamp(0.0, 90.0))
}

/// 体重移動（正規化）: アドレス→インパクトの腰中点の横方向変位
fn weight_transfer(from: &LandmarkFrame, to: &LandmarkFrame, threshold: f64) -> Option<f64> {
    let hip_x = |frame: &LandmarkFrame| -> Option<f64> {
        let l = frame.get(LandmarkIndex::LeftHip);
        let r = frame.get(LandmarkIndex::RightHip);
        if !l.is_valid(threshold) || !r.is_valid(threshold) {
            return None;
        }
        Some((l.x + r.x) / 2.0)
    };

    let shift = (hip_x(to)? - hip_x(from)?).abs();
    // 0.2でキャップ（それ以上はトラッキングノイズとみなす）
    Some(shift.min(0.2))
}

/// フェーズ付きランドマーク列から指標セットを計算する
pub struct MetricsExtractor {
    visibility_threshold: f64,
}

impl MetricsExtractor {
    pub fn new(visibility_threshold: f64) -> Self {
        Self { visibility_threshold }
    }

    /// `frames`はバッファ順のDTLランドマーク列（欠損フレームはNone）。
    /// `phases`のインデックスはこの列に対するもの。
    /// フェーズが欠けている指標は計算せずNoneのままにする。
    pub fn extract(
        &self,
        frames: &[Option<LandmarkFrame>],
        phases: &SwingPhaseMap,
        frame_rate: f64,
    ) -> MetricSet {
        let mut metrics = MetricSet::default();
        let th = self.visibility_threshold;

        let frame_at = |idx: Option<usize>| -> Option<&LandmarkFrame> {
            frames.get(idx?)?.as_ref()
        };

        let address = frame_at(phases.address);
        let top = frame_at(phases.top);
        let impact = frame_at(phases.impact);

        if let (Some(address), Some(top)) = (address, top) {
            metrics.hip_rotation_top = rotation_between(
                address,
                top,
                LandmarkIndex::LeftHip,
                LandmarkIndex::RightHip,
                th,
            );
            metrics.shoulder_rotation_top = rotation_between(
                address,
                top,
                LandmarkIndex::LeftShoulder,
                LandmarkIndex::RightShoulder,
                th,
            );
            if let (Some(shoulder), Some(hip)) =
                (metrics.shoulder_rotation_top, metrics.hip_rotation_top)
            {
                metrics.x_factor = Some(shoulder - hip);
            }
        }

        if let Some(address) = address {
            metrics.spine_angle_address = spine_angle(address, th);
        }
        if let Some(impact) = impact {
            metrics.spine_angle_impact = spine_angle(impact, th);
        }
        if let (Some(at_impact), Some(at_address)) =
            (metrics.spine_angle_impact, metrics.spine_angle_address)
        {
            metrics.spine_angle_change = Some(at_impact - at_address);
        }

        if let (Some(address_idx), Some(top_idx)) = (phases.address, phases.top) {
            if frame_rate > 0.0 {
                metrics.backswing_time =
                    Some((top_idx.saturating_sub(address_idx)) as f64 / frame_rate);
            } else {
                metrics.backswing_time = Some(0.0);
            }
        }
        if let (Some(top_idx), Some(impact_idx)) = (phases.top, phases.impact) {
            if frame_rate > 0.0 {
                metrics.downswing_time =
                    Some((impact_idx.saturating_sub(top_idx)) as f64 / frame_rate);
            } else {
                metrics.downswing_time = Some(0.0);
            }
        }
        if let (Some(backswing), Some(downswing)) =
            (metrics.backswing_time, metrics.downswing_time)
        {
            // ダウンスイング時間0のガード: 比率0を返す
            metrics.tempo_ratio = Some(if downswing > 0.0 {
                backswing / downswing
            } else {
                0.0
            });
        }

        if let (Some(address), Some(impact)) = (address, impact) {
            metrics.weight_transfer = weight_transfer(address, impact, th);
        }

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::landmark::Landmark;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    /// 肩と腰だけ配置したフレームを作る
    fn make_frame(
        left_shoulder: (f64, f64, f64),
        right_shoulder: (f64, f64, f64),
        left_hip: (f64, f64, f64),
        right_hip: (f64, f64, f64),
    ) -> LandmarkFrame {
        let mut frame = LandmarkFrame::default();
        frame.set(
            LandmarkIndex::LeftShoulder,
            Landmark::new(left_shoulder.0, left_shoulder.1, left_shoulder.2, 0.9),
        );
        frame.set(
            LandmarkIndex::RightShoulder,
            Landmark::new(right_shoulder.0, right_shoulder.1, right_shoulder.2, 0.9),
        );
        frame.set(
            LandmarkIndex::LeftHip,
            Landmark::new(left_hip.0, left_hip.1, left_hip.2, 0.9),
        );
        frame.set(
            LandmarkIndex::RightHip,
            Landmark::new(right_hip.0, right_hip.1, right_hip.2, 0.9),
        );
        frame
    }

    fn upright_frame() -> LandmarkFrame {
        make_frame(
            (0.4, 0.3, 0.0),
            (0.6, 0.3, 0.0),
            (0.4, 0.5, 0.0),
            (0.6, 0.5, 0.0),
        )
    }

    /// 肩・腰を45°回した（z成分が出た）フレーム
    fn rotated_frame() -> LandmarkFrame {
        make_frame(
            (0.43, 0.3, -0.07),
            (0.57, 0.3, 0.07),
            (0.43, 0.5, -0.07),
            (0.57, 0.5, 0.07),
        )
    }

    fn full_phases(address: usize, top: usize, impact: usize, finish: usize) -> SwingPhaseMap {
        SwingPhaseMap {
            address: Some(address),
            top: Some(top),
            impact: Some(impact),
            finish: Some(finish),
        }
    }

    #[test]
    fn test_rotation_from_identical_frames_is_zero() {
        let frame = upright_frame();
        let rot = rotation_between(
            &frame,
            &frame,
            LandmarkIndex::LeftHip,
            LandmarkIndex::RightHip,
            0.5,
        );
        assert!(approx_eq(rot.unwrap(), 0.0, 1e-9));
    }

    #[test]
    fn test_rotation_45_degrees() {
        let rot = rotation_between(
            &upright_frame(),
            &rotated_frame(),
            LandmarkIndex::LeftHip,
            LandmarkIndex::RightHip,
            0.5,
        )
        .unwrap();
        assert!(approx_eq(rot, 45.0, 1.0), "expected ~45, got {rot}");
    }

    #[test]
    fn test_rotation_low_visibility_is_none() {
        let mut frame = upright_frame();
        frame.set(LandmarkIndex::LeftHip, Landmark::new(0.4, 0.5, 0.0, 0.1));
        let rot = rotation_between(
            &upright_frame(),
            &frame,
            LandmarkIndex::LeftHip,
            LandmarkIndex::RightHip,
            0.5,
        );
        assert!(rot.is_none());
    }

    #[test]
    fn test_spine_angle_vertical_is_zero() {
        // 肩が腰の真上: 前傾0°
        let angle = spine_angle(&upright_frame(), 0.5).unwrap();
        assert!(approx_eq(angle, 0.0, 1e-9));
    }

    #[test]
    fn test_spine_angle_45_degrees() {
        // 肩中点が腰中点から斜め45°
        let frame = make_frame(
            (0.5, 0.3, 0.0),
            (0.7, 0.3, 0.0),
            (0.3, 0.5, 0.0),
            (0.5, 0.5, 0.0),
        );
        let angle = spine_angle(&frame, 0.5).unwrap();
        assert!(approx_eq(angle, 45.0, 1e-6), "got {angle}");
    }

    #[test]
    fn test_spine_angle_bounded() {
        // 肩と腰がほぼ同じ高さでも[0,90]に収まる
        let frame = make_frame(
            (0.1, 0.499, 0.0),
            (0.3, 0.499, 0.0),
            (0.5, 0.5, 0.0),
            (0.7, 0.5, 0.0),
        );
        let angle = spine_angle(&frame, 0.5).unwrap();
        assert!((0.0..=90.0).contains(&angle));
    }

    #[test]
    fn test_tempo_ratio_from_phase_indices() {
        let frames: Vec<Option<LandmarkFrame>> =
            (0..130).map(|_| Some(upright_frame())).collect();
        let extractor = MetricsExtractor::new(0.5);
        let metrics = extractor.extract(&frames, &full_phases(0, 90, 120, 129), 60.0);

        assert!(approx_eq(metrics.backswing_time.unwrap(), 1.5, 1e-9));
        assert!(approx_eq(metrics.downswing_time.unwrap(), 0.5, 1e-9));
        assert!(approx_eq(metrics.tempo_ratio.unwrap(), 3.0, 1e-9));
    }

    #[test]
    fn test_zero_duration_downswing_guard() {
        let frames: Vec<Option<LandmarkFrame>> =
            (0..100).map(|_| Some(upright_frame())).collect();
        let extractor = MetricsExtractor::new(0.5);
        // top == impact → downswing 0秒 → tempo_ratio 0.0（発散させない）
        let metrics = extractor.extract(&frames, &full_phases(0, 50, 50, 99), 60.0);
        assert_eq!(metrics.tempo_ratio, Some(0.0));
    }

    #[test]
    fn test_missing_top_omits_dependent_metrics() {
        let frames: Vec<Option<LandmarkFrame>> =
            (0..100).map(|_| Some(upright_frame())).collect();
        let phases = SwingPhaseMap {
            address: Some(0),
            top: None,
            impact: Some(50),
            finish: Some(99),
        };
        let extractor = MetricsExtractor::new(0.5);
        let metrics = extractor.extract(&frames, &phases, 60.0);

        assert!(metrics.hip_rotation_top.is_none());
        assert!(metrics.shoulder_rotation_top.is_none());
        assert!(metrics.x_factor.is_none());
        assert!(metrics.backswing_time.is_none());
        assert!(metrics.tempo_ratio.is_none());
        // アドレス・インパクトだけで計算できる指標は残る
        assert!(metrics.spine_angle_address.is_some());
        assert!(metrics.weight_transfer.is_some());
    }

    #[test]
    fn test_weight_transfer_capped() {
        let address = upright_frame();
        // 腰が0.5正規化単位も横に動いた（ノイズ扱い）
        let impact = make_frame(
            (0.9, 0.3, 0.0),
            (1.1, 0.3, 0.0),
            (0.9, 0.5, 0.0),
            (1.1, 0.5, 0.0),
        );
        let shift = weight_transfer(&address, &impact, 0.5).unwrap();
        assert!(approx_eq(shift, 0.2, 1e-9));
    }

    #[test]
    fn test_metric_as_str_roundtrip() {
        for metric in Metric::ALL {
            assert!(!metric.as_str().is_empty());
        }
        assert_eq!(Metric::XFactor.as_str(), "x_factor");
    }
}
