use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// パイプラインの状態機械
///
/// Idle → Loading → Processing → {Completed | Cancelled | Failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Loading,
    Processing,
    Completed,
    Cancelled,
    Failed,
}

impl PipelineState {
    /// 終端状態か
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Completed | PipelineState::Cancelled | PipelineState::Failed
        )
    }
}

/// バッチ境界ごとに発行される進捗イベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub state: PipelineState,
    pub frames_processed: usize,
    pub frames_total: usize,
    pub elapsed_ms: f64,
    /// 残り時間の推定。処理実績が無い間はNone。
    pub eta_ms: Option<f64>,
    pub message: String,
}

impl ProgressEvent {
    pub fn fraction(&self) -> f64 {
        if self.frames_total == 0 {
            0.0
        } else {
            self.frames_processed as f64 / self.frames_total as f64
        }
    }
}

/// 協調的キャンセルのトークン。クローンは同じフラグを共有する。
///
/// パイプラインはバッチ境界でのみフラグを確認する。フレーム処理の
/// 途中で割り込むことはない。
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// 指定時間後にキャンセルする監視スレッドを立てる
    pub fn cancel_after(&self, delay: Duration) {
        let token = self.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            token.cancel();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!PipelineState::Idle.is_terminal());
        assert!(!PipelineState::Processing.is_terminal());
        assert!(PipelineState::Completed.is_terminal());
        assert!(PipelineState::Cancelled.is_terminal());
        assert!(PipelineState::Failed.is_terminal());
    }

    #[test]
    fn test_cancel_token_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_cancel_after_fires() {
        let token = CancelToken::new();
        token.cancel_after(Duration::from_millis(10));
        assert!(!token.is_cancelled());
        thread::sleep(Duration::from_millis(100));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_progress_fraction() {
        let event = ProgressEvent {
            state: PipelineState::Processing,
            frames_processed: 30,
            frames_total: 120,
            elapsed_ms: 500.0,
            eta_ms: Some(1500.0),
            message: "processing".to_string(),
        };
        assert!((event.fraction() - 0.25).abs() < 1e-9);
    }
}
