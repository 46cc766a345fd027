use egui::{ColorImage, Context, TextureHandle, TextureOptions};
use log::{error, info};
use std::time::Duration;
use webm_player::core::{Clock, PlaybackClock};
use webm_player::player::{AudioOutput, FrameSink, Player};

/// 把 FrameSlot 中的帧上传为 egui 纹理
struct TextureSink<'a> {
    ctx: &'a Context,
    texture: &'a mut Option<TextureHandle>,
}

impl FrameSink for TextureSink<'_> {
    fn present(&mut self, pixels: &[u8], width: u32, height: u32) {
        let image = ColorImage::from_rgba_unmultiplied([width as usize, height as usize], pixels);
        match self.texture.as_mut() {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => {
                *self.texture = Some(self.ctx.load_texture("video_frame", image, TextureOptions::LINEAR));
            }
        }
    }
}

/// 演示播放器窗口
pub struct WebmPlayerApp {
    player: Player,
    audio_output: Option<AudioOutput>,
    wall_clock: PlaybackClock, // 没有音频输出时的呈现时钟
    texture: Option<TextureHandle>,
    last_generation: u64,
    volume: f32,
    video_error: Option<String>,
}

impl WebmPlayerApp {
    pub fn new(player: Player, audio_output: Option<AudioOutput>) -> Self {
        let wall_clock = PlaybackClock::new();
        if audio_output.is_none() {
            info!("🕐 没有音频输出，使用系统时钟驱动视频");
            wall_clock.play();
        }
        Self {
            player,
            audio_output,
            wall_clock,
            texture: None,
            last_generation: 0,
            volume: 1.0,
            video_error: None,
        }
    }

    fn position(&self) -> Duration {
        match &self.audio_output {
            Some(output) => output.position(),
            None => self.wall_clock.position(),
        }
    }

    fn render_info_panel(&mut self, ctx: &Context, position: Duration) {
        egui::TopBottomPanel::bottom("info_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let (w, h) = self.player.video_size();
                if self.player.has_video() {
                    ui.label(format!("🎬 {} {}x{}", self.player.video_codec_id(), w, h));
                }
                if self.player.has_audio() {
                    ui.label(format!(
                        "🔊 {} {} Hz {} 声道",
                        self.player.audio_codec_id(),
                        self.player.audio_sampling_frequency(),
                        self.player.audio_channels()
                    ));
                }
                let total = self.player.video_duration().or(self.player.audio_duration());
                ui.label(match total {
                    Some(total) => format!("{:.1}s / {:.1}s", position.as_secs_f64(), total.as_secs_f64()),
                    None => format!("{:.1}s", position.as_secs_f64()),
                });
                if let Some(output) = &self.audio_output {
                    if ui.add(egui::Slider::new(&mut self.volume, 0.0..=1.0).text("音量")).changed() {
                        output.set_volume(self.volume);
                    }
                }
                if let Some(e) = &self.video_error {
                    ui.colored_label(egui::Color32::RED, e);
                }
            });
        });
    }
}

impl eframe::App for WebmPlayerApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        // 每帧采样一次时钟交给视频调度器
        let position = self.position();
        if let Err(e) = self.player.update(position) {
            if self.video_error.is_none() {
                error!("❌ 视频停止: {}", e);
                self.video_error = Some(e.to_string());
            }
        }

        // 只有新帧才重新上传纹理
        let generation = self.player.frame_slot().map_or(0, |slot| slot.generation());
        if generation != self.last_generation {
            let mut sink = TextureSink {
                ctx,
                texture: &mut self.texture,
            };
            self.player.present_into(&mut sink);
            self.last_generation = generation;
        }

        self.render_info_panel(ctx, position);

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                let Some(texture) = &self.texture else {
                    ui.centered_and_justified(|ui| ui.label("🔊"));
                    return;
                };
                // 保持宽高比居中
                let available = ui.available_size();
                let size = texture.size_vec2();
                let scale = (available.x / size.x).min(available.y / size.y);
                let rect = egui::Rect::from_center_size(ui.max_rect().center(), size * scale);
                ui.painter().image(
                    texture.id(),
                    rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            });

        ctx.request_repaint_after(Duration::from_millis(16));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("🔚 WebmPlayerApp 退出");
        if let Some(output) = self.audio_output.as_mut() {
            output.stop();
        }
    }
}
