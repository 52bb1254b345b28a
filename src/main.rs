use anyhow::Result;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use swingsight::analysis::style::{JsonReferenceProvider, StyleMatcher, StyleWeights};
use swingsight::cache::FrameCache;
use swingsight::config::Config;
use swingsight::pipeline::{CancelToken, ProgressEvent, SwingPipeline};
use swingsight::video::opencv::OpenCvVideoSource;

const CONFIG_PATH: &str = "swingsight.toml";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("使い方: {} <後方動画> <正面動画> [クラブ種別] [参照データjson]", args[0]);
        std::process::exit(1);
    }
    let dtl_path = &args[1];
    let face_path = &args[2];
    let club_type = args.get(3).map(String::as_str).unwrap_or("driver");

    let config = Config::load_or_default(CONFIG_PATH);

    println!("=== SwingSight {} - スイング解析 ===", env!("GIT_VERSION"));
    println!("後方: {}", dtl_path);
    println!("正面: {}", face_path);
    println!("クラブ: {}", club_type);
    println!("品質モード: {:?}", config.analysis.quality_mode);
    println!();

    let dtl = OpenCvVideoSource::open(dtl_path)?;
    let face = OpenCvVideoSource::open(face_path)?;

    let mut cache = FrameCache::new(config.cache.capacity);
    if let Some(dir) = &config.cache.disk_dir {
        cache = cache.with_disk_dir(dir.into());
    }

    let mut pipeline = SwingPipeline::new(config.analysis.clone(), Arc::new(cache));
    if let Some(reference_path) = args.get(4) {
        let provider = JsonReferenceProvider::new(reference_path.clone());
        pipeline = pipeline.with_matcher(StyleMatcher::new(
            Box::new(provider),
            StyleWeights::default(),
        ));
    }

    let cancel = CancelToken::new();
    let (tx, rx) = mpsc::channel::<ProgressEvent>();
    let progress_thread = thread::spawn(move || {
        for event in rx {
            println!(
                "[{:?}] {}/{} ({:.0}%) {}",
                event.state,
                event.frames_processed,
                event.frames_total,
                event.fraction() * 100.0,
                event.message
            );
        }
    });

    let mut dtl_backend = make_backend()?;
    let mut face_backend = make_backend()?;
    let outcome = pipeline.run(
        Box::new(dtl),
        Box::new(face),
        dtl_backend.as_mut(),
        face_backend.as_mut(),
        club_type,
        &cancel,
        Some(&tx),
    )?;
    drop(tx);
    let _ = progress_thread.join();

    println!();
    println!("=== 解析結果 ===");
    println!("総合スコア: {:.0}", outcome.flaw_report.overall_score);
    println!(
        "処理フレーム: {} (デコード失敗: {}, ポーズ未検出: {})",
        outcome.frames_processed, outcome.frames_skipped, outcome.pose_skipped
    );
    if let Some(warning) = &outcome.alignment_warning {
        println!(
            "警告: フレーム数不一致 ({} vs {})",
            warning.dtl_frames, warning.face_frames
        );
    }
    println!();
    println!("検出された欠点 (上位{}件):", outcome.flaw_report.top_flaws().len());
    for flaw in outcome.flaw_report.top_flaws() {
        println!(
            "  {} (深刻度 {:.2}): {}",
            flaw.metric.as_str(),
            flaw.severity,
            flaw.recommendation
        );
    }
    if let Some(matched) = &outcome.match_result {
        println!();
        println!(
            "スタイル照合: {} (類似度 {:.0})",
            matched.golfer_name, matched.similarity
        );
    }
    if !outcome.style_tags.is_empty() {
        println!("スタイル: {}", outcome.style_tags.join(", "));
    }
    println!();
    println!(
        "処理時間: 平均 {:.1}ms / p95 {:.1}ms (キャッシュヒット率 {:.0}%)",
        outcome.perf.avg_ms,
        outcome.perf.p95_ms,
        outcome.cache_stats.hit_rate() * 100.0
    );

    Ok(())
}

#[cfg(feature = "movenet")]
fn make_backend() -> Result<Box<dyn swingsight::pose::PoseBackend>> {
    let model_path = std::env::var("SWINGSIGHT_MODEL")
        .unwrap_or_else(|_| "models/movenet_thunder.onnx".to_string());
    Ok(Box::new(swingsight::pose::MoveNetBackend::new(&model_path)?))
}

#[cfg(not(feature = "movenet"))]
fn make_backend() -> Result<Box<dyn swingsight::pose::PoseBackend>> {
    anyhow::bail!("movenetフィーチャーが無効です。--features movenet でビルドしてください")
}
