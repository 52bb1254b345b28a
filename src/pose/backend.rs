use anyhow::Result;

use crate::pose::landmark::LandmarkFrame;
use crate::video::source::Raster;

/// 外部ポーズ推定能力の注入点
///
/// パイプラインはこのトレイト越しにしかポーズ検出を知らない。
/// カメラアングルごとに独立したインスタンスを1つずつ持たせる前提
/// （DTLとフェースオンの検出を別スレッドで並行実行できる）。
///
/// 返り値の意味:
/// - `Ok(Some(_))` — 人物を検出した
/// - `Ok(None)` — このフレームでは人物が見つからなかった（スキップ対象）
/// - `Err(_)` — バックエンド自体の失敗。呼び出し側はフレーム単位で吸収する
pub trait PoseBackend: Send {
    fn detect(&mut self, raster: &Raster) -> Result<Option<LandmarkFrame>>;
}

impl<F> PoseBackend for F
where
    F: FnMut(&Raster) -> Result<Option<LandmarkFrame>> + Send,
{
    fn detect(&mut self, raster: &Raster) -> Result<Option<LandmarkFrame>> {
        self(raster)
    }
}
