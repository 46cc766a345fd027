use crate::core::{Packet, PlayerError, Result, Track, TrackList};
use crate::player::demuxer_source::{DemuxerSource, MediaInput};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, media, Rational};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::time::Duration;

/// Matroska CodecID（只映射播放核心认识的编码，其它返回原名）
fn matroska_codec_id(id: codec::Id) -> String {
    match id {
        codec::Id::VP8 => "V_VP8".to_string(),
        codec::Id::VP9 => "V_VP9".to_string(),
        codec::Id::AV1 => "V_AV1".to_string(),
        codec::Id::VORBIS => "A_VORBIS".to_string(),
        codec::Id::OPUS => "A_OPUS".to_string(),
        other => format!("{:?}", other),
    }
}

fn to_duration(ts: i64, time_base: Rational) -> Duration {
    if ts <= 0 || time_base.denominator() == 0 {
        return Duration::ZERO;
    }
    let secs = ts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64;
    Duration::from_secs_f64(secs)
}

/// 流参数里的 extradata（Matroska CodecPrivate）
fn extradata(params: &codec::Parameters) -> Vec<u8> {
    unsafe {
        let raw = params.as_ptr();
        let data = (*raw).extradata;
        let size = (*raw).extradata_size;
        if data.is_null() || size <= 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(data, size as usize).to_vec()
        }
    }
}

/// 尚未打开的本地文件
pub struct FfmpegInput {
    path: String,
}

impl FfmpegInput {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl MediaInput for FfmpegInput {
    fn open(self: Box<Self>) -> Result<Box<dyn DemuxerSource>> {
        Ok(Box::new(FfmpegSource::open(&self.path)?))
    }

    fn description(&self) -> String {
        self.path.clone()
    }
}

/// 解封装器 - 基于 libavformat 读取 WebM/Matroska
pub struct FfmpegSource {
    input_ctx: format::context::Input,
    tracks: TrackList,
    time_bases: HashMap<usize, Rational>, // 流索引 → time_base（只含音视频流）
    duration: Option<Duration>,
    source_path: String,
}

impl FfmpegSource {
    /// 打开媒体文件
    pub fn open(path: &str) -> Result<Self> {
        info!("正在打开文件: {}", path);
        ffmpeg::init().map_err(|e| PlayerError::OpenError(format!("FFmpeg 初始化失败: {}", e)))?;

        let input_ctx = format::input(&path)
            .map_err(|e| PlayerError::OpenError(format!("无法打开文件 {}: {}", path, e)))?;

        // 容器时长（微秒）
        let duration = match input_ctx.duration() {
            d if d > 0 => Some(Duration::from_micros(d as u64)),
            _ => None,
        };

        let mut tracks = Vec::new();
        let mut time_bases = HashMap::new();
        for stream in input_ctx.streams() {
            let params = stream.parameters();
            let medium = params.medium();
            if medium != media::Type::Video && medium != media::Type::Audio {
                debug!("跳过流 #{}: {:?}", stream.index(), medium);
                continue;
            }
            let codec_id = matroska_codec_id(params.id());
            let private = extradata(&params);
            let decoder = codec::context::Context::from_parameters(params)?.decoder();

            let id = stream.index() as u64;
            let track = if medium == media::Type::Video {
                let video = decoder.video()?;
                Track::video(id, &codec_id, video.width(), video.height())
            } else {
                let audio = decoder.audio()?;
                Track::audio(id, &codec_id, audio.channels() as u16, audio.rate())
            };
            let stream_duration = to_duration(stream.duration(), stream.time_base());
            let track = match stream_duration {
                d if d > Duration::ZERO => track.with_duration(d),
                _ => track,
            };

            debug!("流 #{}: {:?} {}", stream.index(), medium, codec_id);
            time_bases.insert(stream.index(), stream.time_base());
            tracks.push(track.with_codec_private(private));
        }

        if tracks.is_empty() {
            warn!("⚠️ {} 中没有音视频流", path);
        }

        Ok(Self {
            input_ctx,
            tracks: TrackList::new(tracks),
            time_bases,
            duration,
            source_path: path.to_string(),
        })
    }
}

impl DemuxerSource for FfmpegSource {
    fn tracks(&self) -> &TrackList {
        &self.tracks
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            match self.input_ctx.packets().next() {
                Some((stream, packet)) => {
                    let index = stream.index();
                    // 跳过字幕等其它流
                    let Some(&time_base) = self.time_bases.get(&index) else {
                        continue;
                    };
                    let pts = packet.pts().or(packet.dts()).unwrap_or(0);
                    let payload = packet.data().map(|d| d.to_vec()).unwrap_or_default();
                    return Ok(Some(Packet::new(index as u64, to_duration(pts, time_base), payload)));
                }
                None => return Ok(None),
            }
        }
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}
