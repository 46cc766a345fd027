// 端到端场景：内存数据源 + 桩解码器驱动完整的 Player

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use webm_player::core::{Packet, PlayerConfig, PlayerError, Result, Track, TrackList, VideoCodec, VideoFrame};
use webm_player::player::{
    discover_streams, CodecProvider, MediaInput, MemorySource, OpusDecode, Player, VideoDecode, VorbisHeaders,
    VorbisSynthesis,
};

const CORRUPT: [u8; 2] = [0xFF, 0xFF];

/// 每个包一帧，像素填充为包的第一个字节；遇到损坏标记报错
struct TagVideo {
    frames: VecDeque<VideoFrame>,
}

impl VideoDecode for TagVideo {
    fn decode(&mut self, packet: &Packet) -> Result<()> {
        if packet.payload == CORRUPT {
            return Err(PlayerError::DecodeError("损坏的视频包".to_string()));
        }
        self.frames.push_back(VideoFrame {
            pixels: vec![packet.payload[0]; VideoFrame::expected_len(2, 2)],
            width: 2,
            height: 2,
            timestamp: packet.timestamp,
        });
        Ok(())
    }

    fn next_frame(&mut self) -> Option<VideoFrame> {
        self.frames.pop_front()
    }
}

/// 每包每声道 4 个样本，值为包的第一个字节
struct FlatOpus {
    channels: usize,
}

impl OpusDecode for FlatOpus {
    fn decode_float(&mut self, packet: &[u8], out: &mut [f32], _fec: bool) -> Result<usize> {
        let value = packet[0] as f32;
        out[..4 * self.channels].fill(value);
        Ok(4)
    }
}

struct StubCodecs;

impl CodecProvider for StubCodecs {
    fn video_decoder(&self, _codec: VideoCodec, _track: &Track) -> Result<Box<dyn VideoDecode>> {
        Ok(Box::new(TagVideo { frames: VecDeque::new() }))
    }

    fn opus_decoder(&self, track: &Track) -> Result<Box<dyn OpusDecode>> {
        Ok(Box::new(FlatOpus {
            channels: track.channels as usize,
        }))
    }

    fn vorbis_synthesis(&self, _headers: &VorbisHeaders) -> Result<Box<dyn VorbisSynthesis>> {
        Err(PlayerError::UnsupportedCodec("A_VORBIS".to_string()))
    }
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn audio_only_opus() -> MemorySource {
    let track = Track::audio(1, "A_OPUS", 2, 48000);
    let packets = (1..=5u8)
        .map(|i| Packet::new(1, Duration::from_millis(i as u64 * 20), vec![i]))
        .collect();
    MemorySource::new("A", TrackList::new(vec![track]), packets)
}

fn video_only_vp9() -> MemorySource {
    let track = Track::video(1, "V_VP9", 1920, 1080);
    let packets = (1..=5u8)
        .map(|i| Packet::new(1, Duration::from_millis(i as u64 * 20), vec![i]))
        .collect();
    MemorySource::new("B", TrackList::new(vec![track]), packets)
}

#[test]
fn test_audio_and_video_from_separate_inputs() {
    init_logger();

    let discovery = discover_streams(vec![Box::new(audio_only_opus()), Box::new(video_only_vp9())]).unwrap();
    assert_eq!(discovery.video_input(), Some(1));
    assert_eq!(discovery.audio_input(), Some(0));

    let inputs: Vec<Box<dyn MediaInput>> = vec![Box::new(audio_only_opus()), Box::new(video_only_vp9())];
    let player = Player::open(inputs, Arc::new(StubCodecs), PlayerConfig::default()).unwrap();
    assert_eq!(player.video_size(), (1920, 1080));
    assert_eq!(player.audio_sampling_frequency(), 48000);
    assert_eq!(player.video_codec_id(), "V_VP9");
    assert_eq!(player.audio_codec_id(), "A_OPUS");

    // 音频来自 A：5 个包 × 4 帧 × 2 声道
    let audio = player.audio().unwrap();
    let mut out = [0f32; 40];
    assert_eq!(audio.fill(&mut out).unwrap(), 40);
    assert_eq!(out[0], 1.0);
    assert_eq!(out[39], 5.0);
}

#[test]
fn test_corrupt_video_packet_stops_video_only() {
    init_logger();

    let video = Track::video(1, "V_VP8", 320, 240);
    let audio = Track::audio(2, "A_OPUS", 1, 48000);
    let mut packets = Vec::new();
    for i in 1..=20u8 {
        let ts = Duration::from_millis(i as u64 * 10);
        let payload = if i == 10 { CORRUPT.to_vec() } else { vec![i] };
        packets.push(Packet::new(1, ts, payload));
        packets.push(Packet::new(2, ts, vec![i]));
    }
    let source = MemorySource::new("av", TrackList::new(vec![video, audio]), packets);

    let player = Player::open(vec![Box::new(source)], Arc::new(StubCodecs), PlayerConfig::default()).unwrap();
    player.update(Duration::ZERO).unwrap();

    // 音频不受影响：20 个单声道包 → 160 个立体声样本
    let assembler = player.audio().unwrap();
    let mut out = vec![0f32; 160];
    assert_eq!(assembler.fill(&mut out).unwrap(), 160);
    assert_eq!(out[158], 20.0);
    assert!(assembler.error().is_none());

    let start = Instant::now();
    while !player.video_finished() && start.elapsed() < Duration::from_secs(5) {
        std::thread::sleep(Duration::from_millis(1));
    }

    // 前 9 帧正常呈现，之后画面停在第 9 帧
    let slot = player.frame_slot().unwrap();
    assert_eq!(slot.generation(), 9);
    assert_eq!(slot.snapshot().unwrap().pixels[0], 9);

    for _ in 0..3 {
        assert!(matches!(
            player.update(Duration::from_secs(1)),
            Err(PlayerError::DecodeError(_))
        ));
    }
    assert_eq!(slot.generation(), 9);

    // 音频读完后返回短静音
    let mut tail = [1u8; 1024];
    assert_eq!(assembler.read(&mut tail).unwrap(), 256);
}
