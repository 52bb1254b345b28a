use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::analysis::metrics::{Metric, MetricSet};

/// 類似度の指数減衰係数: similarity = exp(-k * relative_difference)
const DECAY_RATE: f64 = 2.0;

/// プロスイングの参照データ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSwing {
    pub id: String,
    pub golfer_name: String,
    pub club_type: String,
    pub metrics: MetricSet,
    #[serde(default)]
    pub style_tags: Vec<String>,
}

/// マッチング結果。クエリごとに再計算され、永続化はしない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub reference_id: String,
    pub golfer_name: String,
    /// 類似度 [0, 100]
    pub similarity: f64,
}

/// 参照コーパスの供給者（元実装ではsqliteのプロDB）
pub trait ReferenceProvider: Send + Sync {
    fn load(&self, club_type: &str) -> Result<Vec<ReferenceSwing>>;
}

/// JSONファイルからコーパスを読む供給者
///
/// ファイルは`ReferenceSwing`の配列。club_typeでフィルタして返す。
pub struct JsonReferenceProvider {
    path: PathBuf,
}

impl JsonReferenceProvider {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl ReferenceProvider for JsonReferenceProvider {
    fn load(&self, club_type: &str) -> Result<Vec<ReferenceSwing>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read corpus: {}", self.path.display()))?;
        let all: Vec<ReferenceSwing> =
            serde_json::from_str(&content).context("invalid corpus json")?;
        Ok(all
            .into_iter()
            .filter(|swing| swing.club_type == club_type)
            .collect())
    }
}

/// 指標→重みのテーブル。合計1.0（テンポと回転系を重めに）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleWeights(pub HashMap<Metric, f64>);

impl Default for StyleWeights {
    fn default() -> Self {
        let mut weights = HashMap::new();
        weights.insert(Metric::TempoRatio, 0.15);
        weights.insert(Metric::HipRotationTop, 0.12);
        weights.insert(Metric::ShoulderRotationTop, 0.12);
        weights.insert(Metric::XFactor, 0.15);
        weights.insert(Metric::SpineAngleAddress, 0.10);
        weights.insert(Metric::SpineAngleChange, 0.08);
        weights.insert(Metric::WeightTransfer, 0.10);
        weights.insert(Metric::BackswingTime, 0.10);
        weights.insert(Metric::DownswingTime, 0.08);
        Self(weights)
    }
}

/// ユーザーの指標セットをプロの参照コーパスと照合する
///
/// コーパスはクラブタイプ別に初回アクセスで遅延ロードし、
/// プロセス寿命の間（または明示invalidateまで）保持する。
/// リロードはキャッシュ内のArcを丸ごと差し替えるので、
/// 並行リーダーが更新途中のコーパスを見ることはない。
pub struct StyleMatcher {
    provider: Box<dyn ReferenceProvider>,
    weights: StyleWeights,
    cache: Mutex<HashMap<String, Arc<Vec<ReferenceSwing>>>>,
}

impl StyleMatcher {
    pub fn new(provider: Box<dyn ReferenceProvider>, weights: StyleWeights) -> Self {
        Self {
            provider,
            weights,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// クラブタイプのコーパスを取得（キャッシュミス時のみロード）
    fn corpus(&self, club_type: &str) -> Result<Arc<Vec<ReferenceSwing>>> {
        if let Some(cached) = self.cache.lock().unwrap().get(club_type) {
            return Ok(cached.clone());
        }

        let loaded = Arc::new(self.provider.load(club_type)?);
        debug!(club_type, count = loaded.len(), "reference corpus loaded");
        self.cache
            .lock()
            .unwrap()
            .insert(club_type.to_string(), loaded.clone());
        Ok(loaded)
    }

    /// キャッシュを破棄して次回アクセスで再ロードさせる
    pub fn invalidate(&self) {
        self.cache.lock().unwrap().clear();
    }

    /// 最も類似度の高い参照スイングを返す。コーパスが空ならNone。
    pub fn find_best_match(
        &self,
        metrics: &MetricSet,
        club_type: &str,
    ) -> Result<Option<MatchResult>> {
        let corpus = self.corpus(club_type)?;
        if corpus.is_empty() {
            warn!(club_type, "no reference swings for club type");
            return Ok(None);
        }

        let mut best: Option<MatchResult> = None;
        for reference in corpus.iter() {
            let similarity = self.similarity(metrics, &reference.metrics);
            if best.as_ref().map_or(true, |b| similarity > b.similarity) {
                best = Some(MatchResult {
                    reference_id: reference.id.clone(),
                    golfer_name: reference.golfer_name.clone(),
                    similarity,
                });
            }
        }

        if let Some(best) = &best {
            info!(
                golfer = %best.golfer_name,
                similarity = best.similarity,
                "best style match"
            );
        }
        Ok(best)
    }

    /// 類似度上位n件
    pub fn find_top_matches(
        &self,
        metrics: &MetricSet,
        club_type: &str,
        n: usize,
    ) -> Result<Vec<MatchResult>> {
        let corpus = self.corpus(club_type)?;
        let mut results: Vec<MatchResult> = corpus
            .iter()
            .map(|reference| MatchResult {
                reference_id: reference.id.clone(),
                golfer_name: reference.golfer_name.clone(),
                similarity: self.similarity(metrics, &reference.metrics),
            })
            .collect();
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(n);
        Ok(results)
    }

    /// 重み付き平均類似度 [0, 100]
    ///
    /// 両方のセットに存在する指標だけで計算し、使った重みで正規化する
    /// （部分的な指標セットでも公平に比較できるように）。
    fn similarity(&self, user: &MetricSet, reference: &MetricSet) -> f64 {
        let mut total_similarity = 0.0;
        let mut total_weight = 0.0;

        for (&metric, &weight) in &self.weights.0 {
            let (Some(user_val), Some(ref_val)) = (user.get(metric), reference.get(metric))
            else {
                continue;
            };

            // ゼロ参照値ガード: 相対差の代わりに絶対差を使う
            let diff = if ref_val.abs() > f64::EPSILON {
                (user_val - ref_val).abs() / ref_val.abs()
            } else {
                (user_val - ref_val).abs()
            };

            total_similarity += (-DECAY_RATE * diff).exp() * weight;
            total_weight += weight;
        }

        if total_weight > 0.0 {
            (total_similarity / total_weight) * 100.0
        } else {
            0.0
        }
    }
}

/// スイングの特徴からスタイルタグを割り当てる
pub fn classify_style(metrics: &MetricSet) -> Vec<String> {
    let mut tags = Vec::new();

    if let Some(tempo) = metrics.tempo_ratio {
        if tempo > 3.5 {
            tags.push("slow_backswing".to_string());
        } else if tempo < 2.5 && tempo > 0.0 {
            tags.push("fast_backswing".to_string());
        } else if tempo > 0.0 {
            tags.push("balanced_tempo".to_string());
        }
    }

    if let Some(shoulder) = metrics.shoulder_rotation_top {
        if shoulder > 100.0 {
            tags.push("full_turn".to_string());
        } else if shoulder < 80.0 {
            tags.push("compact".to_string());
        }
    }

    if let Some(x_factor) = metrics.x_factor {
        if x_factor > 50.0 {
            tags.push("high_separation".to_string());
        } else if x_factor < 35.0 {
            tags.push("connected".to_string());
        }
    }

    if let Some(weight) = metrics.weight_transfer {
        if weight > 0.12 {
            tags.push("aggressive_shift".to_string());
        } else if weight < 0.05 {
            tags.push("stable_base".to_string());
        }
    }

    tags
}
