// 单元测试共用的桩：输入源、解码器

use crate::core::{Packet, PlayerError, Result, Track, TrackList, VideoCodec, VideoFrame};
use crate::player::codec::{CodecProvider, OpusDecode, VideoDecode, VorbisHeaders, VorbisSynthesis};
use crate::player::demuxer_source::{DemuxerSource, MediaInput, MemorySource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub fn both(name: &str) -> MemorySource {
    MemorySource::new(
        name,
        TrackList::new(vec![
            Track::video(1, "V_VP8", 640, 360),
            Track::audio(2, "A_OPUS", 2, 48000),
        ]),
        Vec::new(),
    )
}

pub fn video_only(name: &str) -> MemorySource {
    MemorySource::new(name, TrackList::new(vec![Track::video(1, "V_VP9", 1920, 1080)]), Vec::new())
}

pub fn audio_only(name: &str) -> MemorySource {
    MemorySource::new(name, TrackList::new(vec![Track::audio(1, "A_OPUS", 2, 48000)]), Vec::new())
}

pub fn nothing(name: &str) -> MemorySource {
    MemorySource::new(name, TrackList::default(), Vec::new())
}

/// 记录是否被打开过的输入
pub struct ProbeInput {
    source: MemorySource,
    opened: Arc<AtomicBool>,
}

impl ProbeInput {
    pub fn new(source: MemorySource) -> Self {
        Self {
            source,
            opened: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn boxed(source: MemorySource) -> Box<dyn MediaInput> {
        Box::new(Self::new(source))
    }

    pub fn opened_flag(&self) -> Arc<AtomicBool> {
        self.opened.clone()
    }
}

impl MediaInput for ProbeInput {
    fn open(self: Box<Self>) -> Result<Box<dyn DemuxerSource>> {
        self.opened.store(true, Ordering::SeqCst);
        Ok(Box::new(self.source))
    }

    fn description(&self) -> String {
        DemuxerSource::description(&self.source)
    }
}

/// 打开总是失败的输入
pub struct FailingInput {
    name: String,
}

impl FailingInput {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

impl MediaInput for FailingInput {
    fn open(self: Box<Self>) -> Result<Box<dyn DemuxerSource>> {
        Err(PlayerError::OpenError(format!("无法打开 {}", self.name)))
    }

    fn description(&self) -> String {
        self.name.clone()
    }
}

/// 构造 Matroska 风格的 Vorbis CodecPrivate（Xiph lacing 三个头部包）
pub fn vorbis_codec_private(channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut identification = vec![0x01];
    identification.extend_from_slice(b"vorbis");
    identification.extend_from_slice(&0u32.to_le_bytes());
    identification.push(channels);
    identification.extend_from_slice(&sample_rate.to_le_bytes());
    identification.extend_from_slice(&[0u8; 12]); // bitrate max/nominal/min
    identification.push(0xB8); // blocksize 256/2048
    identification.push(1);

    let mut comment = vec![0x03];
    comment.extend_from_slice(b"vorbis");
    comment.extend_from_slice(&0u32.to_le_bytes());
    comment.extend_from_slice(&0u32.to_le_bytes());
    comment.push(1);

    let mut setup = vec![0x05];
    setup.extend_from_slice(b"vorbis");
    setup.extend_from_slice(&[0xAB; 8]);

    let mut data = vec![2, identification.len() as u8, comment.len() as u8];
    data.extend(identification);
    data.extend(comment);
    data.extend(setup);
    data
}

/// 视频桩解码器的行为
#[derive(Debug, Clone)]
pub struct VideoScript {
    pub frames_per_packet: usize,
    /// 解码 n 个包之后切换到新尺寸
    pub size_after: Option<(usize, (u32, u32))>,
    /// 第 n 个包（从 1 开始）解码失败
    pub fail_on_packet: Option<usize>,
}

impl Default for VideoScript {
    fn default() -> Self {
        Self {
            frames_per_packet: 1,
            size_after: None,
            fail_on_packet: None,
        }
    }
}

/// 每帧像素填充为包的第一个字节，时间戳取自包
pub struct ScriptedVideoDecoder {
    script: VideoScript,
    decoded: usize,
    pending: VecDeque<VideoFrame>,
}

impl ScriptedVideoDecoder {
    pub fn new(script: VideoScript) -> Self {
        Self {
            script,
            decoded: 0,
            pending: VecDeque::new(),
        }
    }
}

impl VideoDecode for ScriptedVideoDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<()> {
        self.decoded += 1;
        if self.script.fail_on_packet == Some(self.decoded) {
            return Err(PlayerError::DecodeError(format!("损坏的视频包 #{}", self.decoded)));
        }
        let (width, height) = match self.script.size_after {
            Some((n, size)) if self.decoded > n => size,
            _ => (4, 4),
        };
        let fill = packet.payload.first().copied().unwrap_or(0);
        for _ in 0..self.script.frames_per_packet {
            self.pending.push_back(VideoFrame {
                pixels: vec![fill; VideoFrame::expected_len(width, height)],
                width,
                height,
                timestamp: packet.timestamp,
            });
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Option<VideoFrame> {
        self.pending.pop_front()
    }
}

/// Opus 桩解码器的行为：每包每声道 `frames` 个样本，值为 tag*10 + 交错序号
#[derive(Debug, Clone, Copy)]
pub struct OpusScript {
    pub frames: usize,
    pub fail_on_packet: Option<usize>,
}

impl OpusScript {
    pub fn ramp(frames: usize) -> Self {
        Self {
            frames,
            fail_on_packet: None,
        }
    }
}

struct ScriptedOpus {
    script: OpusScript,
    channels: usize,
    decoded: usize,
}

impl OpusDecode for ScriptedOpus {
    fn decode_float(&mut self, packet: &[u8], out: &mut [f32], _fec: bool) -> Result<usize> {
        self.decoded += 1;
        if self.script.fail_on_packet == Some(self.decoded) {
            return Err(PlayerError::DecodeError(format!("损坏的 Opus 包 #{}", self.decoded)));
        }
        let n = self.script.frames * self.channels;
        if out.len() < n {
            return Err(PlayerError::DecodeError("输出缓冲区太小".to_string()));
        }
        let base = packet.first().copied().unwrap_or(0) as f32 * 10.0;
        for (k, s) in out[..n].iter_mut().enumerate() {
            *s = base + k as f32;
        }
        Ok(self.script.frames)
    }
}

/// Vorbis 桩：每个包产出两个块，每块每声道 2 个样本
///
/// 第 c 声道的样本值为 tag*10 + 100*c + 0..4，用来区分左右声道。
struct ScriptedVorbis {
    channels: usize,
    pending: VecDeque<Vec<Vec<f32>>>,
    current: Vec<Vec<f32>>, // 按声道，空表示没有可读的块
    read_total: Arc<AtomicUsize>,
}

impl ScriptedVorbis {
    fn block(&self, first: f32) -> Vec<Vec<f32>> {
        (0..self.channels)
            .map(|c| {
                let v = first + 100.0 * c as f32;
                vec![v, v + 1.0]
            })
            .collect()
    }

    fn available(&self) -> usize {
        self.current.first().map_or(0, |c| c.len())
    }
}

impl VorbisSynthesis for ScriptedVorbis {
    fn synthesis(&mut self, packet: &[u8]) -> Result<()> {
        let base = packet.first().copied().unwrap_or(0) as f32 * 10.0;
        let (first, second) = (self.block(base), self.block(base + 2.0));
        self.pending.push_back(first);
        self.pending.push_back(second);
        Ok(())
    }

    fn blockin(&mut self) -> Result<()> {
        if self.available() == 0 {
            self.current = self.pending.pop_front().unwrap_or_default();
        }
        Ok(())
    }

    fn pcm_out(&self) -> Vec<&[f32]> {
        self.current.iter().map(|c| c.as_slice()).collect()
    }

    fn read(&mut self, samples: usize) -> Result<()> {
        if samples != self.available() {
            return Err(PlayerError::DecodeError(format!(
                "read({}) 与可读样本数 {} 不一致",
                samples,
                self.available()
            )));
        }
        self.read_total.fetch_add(samples, Ordering::SeqCst);
        self.current = self.pending.pop_front().unwrap_or_default();
        Ok(())
    }
}

/// 桩解码器工厂
#[derive(Default)]
pub struct MockCodecs {
    video: VideoScript,
    opus: Option<OpusScript>,
    vorbis_read_total: Arc<AtomicUsize>,
}

impl MockCodecs {
    pub fn with_video(mut self, script: VideoScript) -> Self {
        self.video = script;
        self
    }

    pub fn with_opus(mut self, script: OpusScript) -> Self {
        self.opus = Some(script);
        self
    }

    /// 所有 Vorbis 桩累计推进的样本数
    pub fn vorbis_read_total(&self) -> usize {
        self.vorbis_read_total.load(Ordering::SeqCst)
    }
}

impl CodecProvider for MockCodecs {
    fn video_decoder(&self, _codec: VideoCodec, _track: &Track) -> Result<Box<dyn VideoDecode>> {
        Ok(Box::new(ScriptedVideoDecoder::new(self.video.clone())))
    }

    fn opus_decoder(&self, track: &Track) -> Result<Box<dyn OpusDecode>> {
        Ok(Box::new(ScriptedOpus {
            script: self.opus.unwrap_or(OpusScript::ramp(960)),
            channels: track.channels as usize,
            decoded: 0,
        }))
    }

    fn vorbis_synthesis(&self, headers: &VorbisHeaders) -> Result<Box<dyn VorbisSynthesis>> {
        Ok(Box::new(ScriptedVorbis {
            channels: headers.channels as usize,
            pending: VecDeque::new(),
            current: Vec::new(),
            read_total: self.vorbis_read_total.clone(),
        }))
    }
}
