use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::analysis::metrics::{Metric, MetricSet};

/// 理想範囲からの外れ方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlawDirection {
    TooLow,
    TooHigh,
}

/// 指標→[min, max]理想範囲のテーブル
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdealRanges(pub HashMap<Metric, [f64; 2]>);

impl Default for IdealRanges {
    fn default() -> Self {
        let mut ranges = HashMap::new();
        ranges.insert(Metric::HipRotationTop, [35.0, 50.0]);
        ranges.insert(Metric::ShoulderRotationTop, [80.0, 110.0]);
        ranges.insert(Metric::XFactor, [35.0, 55.0]);
        ranges.insert(Metric::SpineAngleAddress, [25.0, 40.0]);
        ranges.insert(Metric::SpineAngleChange, [-5.0, 5.0]);
        ranges.insert(Metric::WeightTransfer, [0.05, 0.15]);
        ranges.insert(Metric::TempoRatio, [2.5, 3.5]);
        ranges.insert(Metric::BackswingTime, [0.7, 1.1]);
        ranges.insert(Metric::DownswingTime, [0.2, 0.35]);
        Self(ranges)
    }
}

/// 検出された1件のフロー（欠陥）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flaw {
    pub metric: Metric,
    pub value: f64,
    pub ideal_min: f64,
    pub ideal_max: f64,
    pub direction: FlawDirection,
    /// 深刻度 [0, 1]。近い境界からの相対偏差×2、1.0で飽和
    pub severity: f64,
    pub recommendation: String,
}

/// 1スイング分のフローレポート。作成後は不変。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlawReport {
    /// 深刻度降順の全フロー
    pub flaws: Vec<Flaw>,
    /// 総合スコア [0, 100]。フローなしで100
    pub overall_score: f64,
    pub flaw_count: usize,
}

impl FlawReport {
    /// 表示用の上位3件
    pub fn top_flaws(&self) -> &[Flaw] {
        &self.flaws[..self.flaws.len().min(3)]
    }
}

/// 指標セットを理想範囲と比較してフローを検出する
pub struct FlawDetector {
    ranges: IdealRanges,
}

impl FlawDetector {
    pub fn new(ranges: IdealRanges) -> Self {
        Self { ranges }
    }

    pub fn detect(&self, metrics: &MetricSet) -> FlawReport {
        let mut flaws = Vec::new();

        for (&metric, &[min, max]) in &self.ranges.0 {
            // 未検出フェーズ由来の欠損指標はフローを生成しない
            let Some(value) = metrics.get(metric) else {
                continue;
            };

            if value < min {
                flaws.push(self.make_flaw(metric, value, min, max, FlawDirection::TooLow));
            } else if value > max {
                flaws.push(self.make_flaw(metric, value, min, max, FlawDirection::TooHigh));
            }
        }

        flaws.sort_by(|a, b| {
            b.severity
                .partial_cmp(&a.severity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let overall_score = Self::overall_score(&flaws);
        let flaw_count = flaws.len();

        FlawReport {
            flaws,
            overall_score,
            flaw_count,
        }
    }

    fn make_flaw(
        &self,
        metric: Metric,
        value: f64,
        min: f64,
        max: f64,
        direction: FlawDirection,
    ) -> Flaw {
        let bound = match direction {
            FlawDirection::TooLow => min,
            FlawDirection::TooHigh => max,
        };
        Flaw {
            metric,
            value,
            ideal_min: min,
            ideal_max: max,
            direction,
            severity: severity(value, bound),
            recommendation: recommendation(metric, direction, value).to_string(),
        }
    }

    /// 100点から深刻度の段階に応じて減点、0で打ち止め
    fn overall_score(flaws: &[Flaw]) -> f64 {
        let mut score: f64 = 100.0;
        for flaw in flaws {
            score -= if flaw.severity >= 0.7 {
                15.0
            } else if flaw.severity >= 0.4 {
                10.0
            } else {
                5.0
            };
        }
        score.max(0.0)
    }
}

/// 近い境界からの相対偏差を2倍してクランプ（50%外れで飽和）
fn severity(value: f64, bound: f64) -> f64 {
    if bound.abs() < f64::EPSILON {
        // 境界0は相対偏差が定義できないので絶対偏差を使う
        return (value.abs() * 2.0).min(1.0);
    }
    ((value - bound).abs() / bound.abs() * 2.0).min(1.0)
}

fn recommendation(metric: Metric, direction: FlawDirection, _value: f64) -> &'static str {
    use FlawDirection::{TooHigh, TooLow};
    match (metric, direction) {
        (Metric::HipRotationTop, TooLow) => {
            "Hip rotation is below the ideal range. Focus on rotating the hips more in the backswing; the step drill helps hip turn."
        }
        (Metric::HipRotationTop, TooHigh) => {
            "Hip rotation is above the ideal range. You may be over-rotating; keep the lower body connected to the upper body."
        }
        (Metric::ShoulderRotationTop, TooLow) => {
            "Shoulder turn is below the ideal range. Turn more fully; try to get the back facing the target at the top."
        }
        (Metric::ShoulderRotationTop, TooHigh) => {
            "Shoulder turn is above the ideal range. Maintain spine angle and connection instead of over-rotating."
        }
        (Metric::XFactor, TooLow) => {
            "X-Factor (shoulder-hip separation) is below the ideal range. Resist with the lower body in the backswing to create separation."
        }
        (Metric::XFactor, TooHigh) => {
            "X-Factor is above the ideal range. Too much separation; work on connection and sequencing."
        }
        (Metric::SpineAngleAddress, TooLow) => {
            "Spine angle at address is below the ideal range. Stand with more forward tilt; check the setup posture."
        }
        (Metric::SpineAngleAddress, TooHigh) => {
            "Spine angle at address is above the ideal range. You may be bending over too much at setup."
        }
        (Metric::SpineAngleChange, TooLow) | (Metric::SpineAngleChange, TooHigh) => {
            "Spine angle is changing through the swing. Focus on maintaining posture into impact."
        }
        (Metric::WeightTransfer, TooLow) => {
            "Weight transfer is below the ideal range. Shift more weight to the lead foot through impact."
        }
        (Metric::WeightTransfer, TooHigh) => {
            "Weight transfer is above the ideal range. The shift may be too aggressive; keep it controlled."
        }
        (Metric::TempoRatio, TooLow) => {
            "Tempo ratio is below the ideal range. Slow the backswing down; aim for roughly 3:1 backswing to downswing."
        }
        (Metric::TempoRatio, TooHigh) => {
            "Tempo ratio is above the ideal range. The backswing may be too slow; find a natural balanced tempo."
        }
        (Metric::BackswingTime, TooLow) => {
            "Backswing is quicker than the ideal range. Give the club time to complete the turn."
        }
        (Metric::BackswingTime, TooHigh) => {
            "Backswing is slower than the ideal range. Tighten the takeaway without rushing transition."
        }
        (Metric::DownswingTime, TooLow) => {
            "Downswing is quicker than the ideal range. Sequence from the ground up instead of snatching the club down."
        }
        (Metric::DownswingTime, TooHigh) => {
            "Downswing is slower than the ideal range. Commit through the ball with a full release."
        }
        (Metric::SpineAngleImpact, _) => {
            "Work on posture at impact with a coach."
        }
    }
}
