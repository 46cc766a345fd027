use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 轨道编号（容器内的 TrackNumber / 流索引）
pub type TrackId = u64;

/// 压缩数据包（解封装输出）
///
/// 生产后不可变，由所在的轨道队列持有，只会被消费一次。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub track_id: TrackId,
    pub timestamp: Duration, // 显示时间戳（相对流起点）
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(track_id: TrackId, timestamp: Duration, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            track_id,
            timestamp,
            payload: payload.into(),
        }
    }
}

/// 轨道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// 轨道元数据，打开流时确定，生命周期内不变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub kind: TrackKind,
    pub codec_id: String,
    #[serde(skip)]
    pub codec_private: Vec<u8>,
    pub display_width: u32,
    pub display_height: u32,
    pub channels: u16,
    pub sampling_frequency: u32,
    /// 时长（来自容器 Segment，可能未知）
    pub duration: Option<Duration>,
}

impl Track {
    pub fn video(id: TrackId, codec_id: &str, width: u32, height: u32) -> Self {
        Self {
            id,
            kind: TrackKind::Video,
            codec_id: codec_id.to_string(),
            codec_private: Vec::new(),
            display_width: width,
            display_height: height,
            channels: 0,
            sampling_frequency: 0,
            duration: None,
        }
    }

    pub fn audio(id: TrackId, codec_id: &str, channels: u16, sampling_frequency: u32) -> Self {
        Self {
            id,
            kind: TrackKind::Audio,
            codec_id: codec_id.to_string(),
            codec_private: Vec::new(),
            display_width: 0,
            display_height: 0,
            channels,
            sampling_frequency,
            duration: None,
        }
    }

    pub fn with_codec_private(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.codec_private = data.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// 容器内的轨道列表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackList {
    tracks: Vec<Track>,
}

impl TrackList {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    pub fn find_first_video_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Video)
    }

    pub fn find_first_audio_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Audio)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }
}

/// 视频编解码器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    VP8,
    VP9,
}

impl VideoCodec {
    /// Matroska CodecID → 视频编解码器。V_VP10 等未知编号返回 None
    pub fn from_codec_id(codec_id: &str) -> Option<Self> {
        match codec_id {
            "V_VP8" => Some(VideoCodec::VP8),
            "V_VP9" => Some(VideoCodec::VP9),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::VP8 => "V_VP8",
            VideoCodec::VP9 => "V_VP9",
        }
    }
}

/// 音频编解码器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Vorbis,
    Opus,
}

impl AudioCodec {
    pub fn from_codec_id(codec_id: &str) -> Option<Self> {
        match codec_id {
            "A_VORBIS" => Some(AudioCodec::Vorbis),
            "A_OPUS" => Some(AudioCodec::Opus),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCodec::Vorbis => "A_VORBIS",
            AudioCodec::Opus => "A_OPUS",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解码后的视频帧（RGBA8，紧密排列）
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Duration,
}

impl VideoFrame {
    /// RGBA 帧所需的字节数
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }
}

/// 输出声道数：样本缓冲区永远是交错立体声
pub const OUTPUT_CHANNELS: usize = 2;

/// 媒体信息（打开后供 UI 显示）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    pub video: Option<Track>,
    pub audio: Option<Track>,
}
