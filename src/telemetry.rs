use serde::{Deserialize, Serialize};
use tracing::warn;

/// 処理時間の統計サマリ。計測が無いときは全て0。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerfSummary {
    pub count: usize,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
}

/// フレーム単位の処理時間テレメトリ
///
/// 1フレームの所要時間を記録し、予算超過を警告する。サマリは処理中の
/// 任意の時点で取得できる（完了を待つ必要はない）。
pub struct PerfMonitor {
    /// 1フレームあたりの予算（ミリ秒）。0で予算チェック無効。
    budget_ms: f64,
    samples: Vec<f64>,
    total_ms: f64,
}

impl PerfMonitor {
    pub fn new(budget_ms: f64) -> Self {
        Self {
            budget_ms,
            samples: Vec::new(),
            total_ms: 0.0,
        }
    }

    /// 1フレームの所要時間を記録する。
    /// 単発の予算超過と移動平均の予算超過をそれぞれ警告する。
    pub fn record(&mut self, frame_index: usize, elapsed_ms: f64) {
        self.samples.push(elapsed_ms);
        self.total_ms += elapsed_ms;

        if self.budget_ms > 0.0 {
            if elapsed_ms > self.budget_ms {
                warn!(
                    frame_index,
                    elapsed_ms,
                    budget_ms = self.budget_ms,
                    "frame exceeded time budget"
                );
            }
            let avg = self.total_ms / self.samples.len() as f64;
            if avg > self.budget_ms {
                warn!(
                    avg_ms = avg,
                    budget_ms = self.budget_ms,
                    "running average exceeds time budget"
                );
            }
        }
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn total_ms(&self) -> f64 {
        self.total_ms
    }

    /// 現時点のサマリ。p95はソート済みサンプルのインデックス
    /// `floor(0.95 * n)`（上限n-1）の値。
    pub fn summary(&self) -> PerfSummary {
        if self.samples.is_empty() {
            return PerfSummary::default();
        }

        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = sorted.len();
        let p95_idx = ((count as f64 * 0.95) as usize).min(count - 1);

        PerfSummary {
            count,
            avg_ms: self.total_ms / count as f64,
            min_ms: sorted[0],
            max_ms: sorted[count - 1],
            p95_ms: sorted[p95_idx],
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.total_ms = 0.0;
    }
}
