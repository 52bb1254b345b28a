use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

/// 解析品質モード。可視性しきい値と引き換えに速度を選ぶ。
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityMode {
    Speed,
    #[default]
    Balanced,
    Quality,
}

impl QualityMode {
    /// モードに対応するランドマーク可視性しきい値
    pub fn visibility_threshold(&self) -> f64 {
        match self {
            QualityMode::Speed => 0.3,
            QualityMode::Balanced => 0.5,
            QualityMode::Quality => 0.7,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// ダウンサンプル係数k（kフレームに1枚処理）。最低1。
    #[serde(default = "default_downsample_factor")]
    pub downsample_factor: usize,
    /// 品質モード ("speed" | "balanced" | "quality")
    #[serde(default)]
    pub quality_mode: QualityMode,
    /// 1バッチあたりのフレームペア数
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// ポーズバッファの上限フレーム数
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// 1フレームあたりの処理時間予算（ミリ秒）
    #[serde(default = "default_frame_budget_ms")]
    pub frame_budget_ms: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// メモリ層の最大エントリ数
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// ディスク層のディレクトリ。未設定ならメモリ層のみ。
    #[serde(default)]
    pub disk_dir: Option<String>,
}

fn default_downsample_factor() -> usize { 1 }
fn default_batch_size() -> usize { 10 }
fn default_buffer_capacity() -> usize { 600 }
fn default_frame_budget_ms() -> f64 { 100.0 }
fn default_cache_capacity() -> usize { 500 }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            downsample_factor: default_downsample_factor(),
            quality_mode: QualityMode::default(),
            batch_size: default_batch_size(),
            buffer_capacity: default_buffer_capacity(),
            frame_budget_ms: default_frame_budget_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            disk_dir: None,
        }
    }
}

impl AnalysisConfig {
    /// 範囲外の値をクランプした正規化済みコピーを返す
    pub fn normalized(&self) -> Self {
        let mut config = self.clone();
        if config.downsample_factor == 0 {
            warn!("downsample_factor 0 clamped to 1");
            config.downsample_factor = 1;
        }
        if config.batch_size == 0 {
            config.batch_size = default_batch_size();
        }
        config
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 設定ファイルが無い・壊れている場合は既定値で続行する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.as_ref().display(), %err, "config load failed, using defaults");
                Config::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.analysis.downsample_factor, 1);
        assert_eq!(config.analysis.quality_mode, QualityMode::Balanced);
        assert_eq!(config.analysis.batch_size, 10);
        assert_eq!(config.cache.capacity, 500);
        assert!(config.cache.disk_dir.is_none());
    }

    #[test]
    fn test_quality_mode_thresholds() {
        assert!((QualityMode::Speed.visibility_threshold() - 0.3).abs() < 1e-9);
        assert!((QualityMode::Balanced.visibility_threshold() - 0.5).abs() < 1e-9);
        assert!((QualityMode::Quality.visibility_threshold() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [analysis]
            downsample_factor = 3
            quality_mode = "quality"
            "#,
        )
        .unwrap();
        assert_eq!(config.analysis.downsample_factor, 3);
        assert_eq!(config.analysis.quality_mode, QualityMode::Quality);
        assert_eq!(config.analysis.batch_size, 10);
        assert_eq!(config.cache.capacity, 500);
    }

    #[test]
    fn test_normalized_clamps_zero_factor() {
        let config = AnalysisConfig {
            downsample_factor: 0,
            batch_size: 0,
            ..Default::default()
        };
        let normalized = config.normalized();
        assert_eq!(normalized.downsample_factor, 1);
        assert_eq!(normalized.batch_size, 10);
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let config = Config::load_or_default("/nonexistent/swingsight.toml");
        assert_eq!(config.analysis.downsample_factor, 1);
    }
}
