use crate::core::{MediaInfo, PlayerConfig, PlayerError, Result, Track, TrackKind, VideoCodec};
use crate::player::audio_assembler::AudioFrameAssembler;
use crate::player::codec::{CodecProvider, VideoDecode};
use crate::player::demuxer_source::MediaInput;
use crate::player::demuxer_thread::DemuxerThread;
use crate::player::discovery::{discover_streams, SelectedSource};
use crate::player::frame_slot::{FrameSink, FrameSlot};
use crate::player::log_ctx;
use crate::player::video_scheduler::VideoPresentationScheduler;
use crossbeam_channel::{bounded, Sender};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

/// 播放器 - 组合根
///
/// 打开时完成轨道发现、解码器创建，并为每个选中的源启动一个路由线程。
/// 之后宿主循环每个 tick 调用一次 `update(音频位置)`，绘制时调用 `present_into`；
/// 音频输出端直接从 `audio()` 拉取样本。
pub struct Player {
    media_info: MediaInfo,
    video: Option<VideoPresentationScheduler>,
    audio: Option<Arc<AudioFrameAssembler>>,
    routers: Vec<DemuxerThread>,
    shutdown_tx: Option<Sender<()>>,
}

impl Player {
    /// 打开 1~2 个输入
    ///
    /// 某条轨道初始化失败（未知编码、头部不一致）时只禁用这条轨道；
    /// 如果它是唯一的内容，返回该错误。
    pub fn open(
        inputs: Vec<Box<dyn MediaInput>>,
        codecs: Arc<dyn CodecProvider>,
        config: PlayerConfig,
    ) -> Result<Self> {
        config.validate()?;
        info!("{} 🎮 打开播放器（{} 个输入）", log_ctx(), inputs.len());

        let discovery = discover_streams(inputs)?;
        if discovery.is_empty() {
            warn!("{} ⚠️ 没有找到可播放的音视频轨道", log_ctx());
            return Err(PlayerError::NothingToPlay);
        }

        let has_audio = discovery.audio_track().is_some();
        info!(
            "{} 🔍 选中轨道: 视频={} 音频={}",
            log_ctx(),
            discovery.video_track().map_or("-", |t| t.codec_id.as_str()),
            discovery.audio_track().map_or("-", |t| t.codec_id.as_str())
        );

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let mut player = Self {
            media_info: MediaInfo::default(),
            video: None,
            audio: None,
            routers: Vec::new(),
            shutdown_tx: Some(shutdown_tx),
        };

        let mut sources = discovery.sources;
        for selected in sources.iter_mut() {
            let duration = selected.source.duration();
            for track in [selected.video.as_mut(), selected.audio.as_mut()].into_iter().flatten() {
                if track.duration.is_none() {
                    track.duration = duration;
                }
            }
        }

        // 视频解码器在路由启动之前创建，失败的轨道不会再被路由
        let mut video_decoder = None;
        if let Some(track) = sources.iter().find_map(|s| s.video.as_ref()) {
            log_track(track);
            match create_video_decoder(codecs.as_ref(), track) {
                Ok(decoder) => video_decoder = Some(decoder),
                Err(e) if e.is_track_level() && has_audio => {
                    warn!("{} ⚠️ 视频轨道不可用，仅播放音频: {}", log_ctx(), e);
                    disable_video(&mut sources);
                }
                Err(e) => return Err(e),
            }
        }
        if let Some(track) = sources.iter().find_map(|s| s.audio.as_ref()) {
            log_track(track);
        }

        // 每个源一个路由线程
        let mut video_queue = None;
        let mut audio_queue = None;
        for selected in sources {
            let SelectedSource { input_index, source, video, audio } = selected;
            if video.is_none() && audio.is_none() {
                info!("{} 释放未使用的输入 #{}", log_ctx(), input_index);
                continue;
            }
            let (router, queues) = DemuxerThread::start(
                source,
                video.as_ref(),
                audio.as_ref(),
                config.queue_capacity,
                shutdown_rx.clone(),
            )?;
            player.routers.push(router);
            if video.is_some() {
                player.media_info.video = video;
                video_queue = Some(queues.video);
            }
            if audio.is_some() {
                player.media_info.audio = audio;
                audio_queue = Some(queues.audio);
            }
        }

        if let (Some(track), Some(packets)) = (player.media_info.audio.clone(), audio_queue) {
            match AudioFrameAssembler::new(&track, codecs.as_ref(), packets, &config) {
                Ok(assembler) => player.audio = Some(Arc::new(assembler)),
                Err(e) if e.is_track_level() && video_decoder.is_some() => {
                    // 音频队列随 Err 一起释放，路由线程会停止转发音频包
                    warn!("{} ⚠️ 音频轨道不可用，仅播放视频: {}", log_ctx(), e);
                    player.media_info.audio = None;
                }
                Err(e) => return Err(e),
            }
        }

        if let (Some(decoder), Some(packets)) = (video_decoder, video_queue) {
            player.video = Some(VideoPresentationScheduler::start(
                decoder,
                packets,
                config.late_drop_threshold,
                shutdown_rx,
            )?);
        }

        info!(
            "{} ✅ 播放器就绪: 视频={} 音频={}（{} 个路由线程）",
            log_ctx(),
            player.video.is_some(),
            player.audio.is_some(),
            player.routers.len()
        );
        Ok(player)
    }

    /// 每个 tick 调用一次：把音频位置交给视频调度器
    ///
    /// 视频解码出错后一直返回同一个错误；没有视频时什么都不做。
    pub fn update(&self, position: Duration) -> Result<()> {
        match &self.video {
            Some(video) => video.update(position),
            None => Ok(()),
        }
    }

    /// 把最近呈现的帧交给 sink，没有帧时返回 false
    pub fn present_into(&self, sink: &mut dyn FrameSink) -> bool {
        self.video
            .as_ref()
            .map_or(false, |v| v.frame_slot().present_into(sink))
    }

    pub fn frame_slot(&self) -> Option<&FrameSlot> {
        self.video.as_ref().map(|v| v.frame_slot())
    }

    /// 音频拉取端
    pub fn audio(&self) -> Option<Arc<AudioFrameAssembler>> {
        self.audio.clone()
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// 容器声明的显示尺寸，没有视频时为 (0, 0)
    pub fn video_size(&self) -> (u32, u32) {
        self.media_info
            .video
            .as_ref()
            .map_or((0, 0), |t| (t.display_width, t.display_height))
    }

    pub fn video_duration(&self) -> Option<Duration> {
        self.media_info.video.as_ref().and_then(|t| t.duration)
    }

    pub fn audio_duration(&self) -> Option<Duration> {
        self.media_info.audio.as_ref().and_then(|t| t.duration)
    }

    /// 源声道数（输出始终为立体声），没有音频时为 0
    pub fn audio_channels(&self) -> u16 {
        self.media_info.audio.as_ref().map_or(0, |t| t.channels)
    }

    pub fn audio_sampling_frequency(&self) -> u32 {
        self.media_info.audio.as_ref().map_or(0, |t| t.sampling_frequency)
    }

    pub fn video_codec_id(&self) -> &str {
        self.media_info.video.as_ref().map_or("", |t| t.codec_id.as_str())
    }

    pub fn audio_codec_id(&self) -> &str {
        self.media_info.audio.as_ref().map_or("", |t| t.codec_id.as_str())
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    /// 视频调度线程已退出（流结束或出错）
    pub fn video_finished(&self) -> bool {
        self.video.as_ref().map_or(true, |v| v.is_finished())
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        info!("{} 🛑 关闭播放器", log_ctx());
        // 先发停止信号，阻塞中的路由和调度线程都会返回
        drop(self.shutdown_tx.take());
        for router in self.routers.iter_mut() {
            if let Some(stats) = router.join() {
                info!("{} 路由统计 {}: {:?}", log_ctx(), router.description(), stats);
            }
        }
        if let Some(video) = self.video.as_mut() {
            video.join();
        }
    }
}

fn create_video_decoder(codecs: &dyn CodecProvider, track: &Track) -> Result<Box<dyn VideoDecode>> {
    let codec = VideoCodec::from_codec_id(&track.codec_id)
        .ok_or_else(|| PlayerError::UnsupportedCodec(track.codec_id.clone()))?;
    codecs.video_decoder(codec, track)
}

fn disable_video(sources: &mut [SelectedSource]) {
    for s in sources.iter_mut() {
        s.video = None;
    }
}

fn log_track(track: &Track) {
    match track.kind {
        TrackKind::Video => info!(
            "{} 🎬 找到视频轨道 #{}: {}x{} 时长 {:?} 编码 {}",
            log_ctx(),
            track.id,
            track.display_width,
            track.display_height,
            track.duration,
            track.codec_id
        ),
        TrackKind::Audio => info!(
            "{} 🔊 找到音频轨道 #{}: {} 声道 {} Hz 时长 {:?} 编码 {}",
            log_ctx(),
            track.id,
            track.channels,
            track.sampling_frequency,
            track.duration,
            track.codec_id
        ),
    }
}
