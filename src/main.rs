use anyhow::{Context as _, Result};
use log::{info, warn};
use std::sync::Arc;
use webm_player::core::PlayerConfig;
use webm_player::player::{AudioOutput, FfmpegCodecs, FfmpegInput, MediaInput, Player};

mod app;

use app::WebmPlayerApp;

/// 可选配置文件（JSON）
const CONFIG_ENV: &str = "WEBM_PLAYER_CONFIG";

fn load_config() -> Result<PlayerConfig> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            let json = std::fs::read_to_string(&path).with_context(|| format!("无法读取配置文件 {}", path))?;
            let config = PlayerConfig::from_json(&json)?;
            info!("⚙️ 使用配置文件 {}: {:?}", path, config);
            Ok(config)
        }
        Err(_) => Ok(PlayerConfig::default()),
    }
}

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .filter_module("wgpu_core", log::LevelFilter::Error)
        .init();

    info!("🎬 WebM Player 启动");

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        anyhow::bail!("用法: webm_player <文件> [第二个文件]");
    }

    let config = load_config()?;
    let codecs = Arc::new(FfmpegCodecs::new()?);
    let inputs: Vec<Box<dyn MediaInput>> = paths
        .iter()
        .map(|p| Box::new(FfmpegInput::new(p.as_str())) as Box<dyn MediaInput>)
        .collect();

    let player = Player::open(inputs, codecs, config)?;
    info!("📋 媒体信息: {}", serde_json::to_string_pretty(player.media_info())?);

    // 音频输出失败时退回系统时钟，只播放视频
    let audio_output = match player.audio() {
        Some(assembler) => match AudioOutput::new(assembler).and_then(|mut out| out.start().map(|_| out)) {
            Ok(out) => Some(out),
            Err(e) => {
                warn!("⚠️ 音频输出不可用: {}", e);
                None
            }
        },
        None => None,
    };

    let (w, h) = player.video_size();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([w.max(640) as f32, h.max(360) as f32 + 32.0])
            .with_min_inner_size([320.0, 240.0])
            .with_title("WebM Player"),
        renderer: eframe::Renderer::Wgpu,
        ..Default::default()
    };

    eframe::run_native(
        "WebM Player",
        options,
        Box::new(move |_cc| Box::new(WebmPlayerApp::new(player, audio_output))),
    )
    .map_err(|e| anyhow::anyhow!("应用启动失败: {}", e))?;

    Ok(())
}
