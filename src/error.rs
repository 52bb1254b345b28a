use thiserror::Error;

/// パイプライン全体を続行不能にする失敗のみをエラーとして扱う。
/// フレーム単位の失敗（デコード失敗・ポーズ未検出）はスキップ扱いで、
/// このenumには現れない。
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 対応していないコンテナ/コーデック、または開けない動画
    #[error("unsupported video format: {path}: {reason}")]
    UnsupportedFormat { path: String, reason: String },

    /// 全フレームのデコードに失敗した（1フレームも処理できなかった）
    #[error("total decode failure: no frame pair could be processed ({skipped} skipped)")]
    TotalDecodeFailure { skipped: usize },

    /// 協調キャンセル。レポート上はエラーではなく終了状態として扱う
    #[error("processing cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// ポーズバックエンドのセッション初期化など、フレーム単位ではない失敗
    #[error("pose backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PipelineError::UnsupportedFormat {
            path: "swing.wmv".to_string(),
            reason: "unsupported extension: .wmv".to_string(),
        };
        assert!(err.to_string().contains("swing.wmv"));

        let err = PipelineError::TotalDecodeFailure { skipped: 42 };
        assert!(err.to_string().contains("42"));
    }
}
