// 外部编解码器接口
//
// 播放核心不做任何压缩算法，只通过这些 trait 调用外部解码器。

use crate::core::{Packet, PlayerError, Result, Track, VideoCodec, VideoFrame};

/// 视频解码器（VP8/VP9）
pub trait VideoDecode: Send {
    /// 送入一个压缩包；一个包可能产出 0~n 帧（编码器重排序）
    fn decode(&mut self, packet: &Packet) -> Result<()>;

    /// 帧输出游标：取出下一帧，没有更多帧时返回 None
    fn next_frame(&mut self) -> Option<VideoFrame>;
}

/// Opus 解码器
pub trait OpusDecode: Send {
    /// 解码一个包到 `out`（按原始声道数交错），返回每声道样本数
    fn decode_float(&mut self, packet: &[u8], out: &mut [f32], fec: bool) -> Result<usize>;
}

/// Vorbis 合成管线（synthesis → blockin → pcmout → read）
pub trait VorbisSynthesis: Send {
    fn synthesis(&mut self, packet: &[u8]) -> Result<()>;

    fn blockin(&mut self) -> Result<()>;

    /// 当前可读的 PCM，每个声道一个切片，长度相同
    fn pcm_out(&self) -> Vec<&[f32]>;

    /// 推进读取游标；必须与读出的样本数完全一致，否则解码器会停滞
    fn read(&mut self, samples: usize) -> Result<()>;
}

/// 解码器工厂，由具体后端（FFmpeg、测试桩）实现
pub trait CodecProvider: Send + Sync {
    fn video_decoder(&self, codec: VideoCodec, track: &Track) -> Result<Box<dyn VideoDecode>>;

    fn opus_decoder(&self, track: &Track) -> Result<Box<dyn OpusDecode>>;

    fn vorbis_synthesis(&self, headers: &VorbisHeaders) -> Result<Box<dyn VorbisSynthesis>>;
}

/// Vorbis 三个头部包（来自 Matroska CodecPrivate，Xiph lacing）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VorbisHeaders {
    pub identification: Vec<u8>,
    pub comment: Vec<u8>,
    pub setup: Vec<u8>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl VorbisHeaders {
    /// 解析 CodecPrivate 并读取识别头中的声道数与采样率
    pub fn parse(codec_private: &[u8]) -> Result<Self> {
        let packets = split_xiph_lacing(codec_private)?;
        let [identification, comment, setup]: [Vec<u8>; 3] = packets
            .try_into()
            .map_err(|_| header_error("CodecPrivate 应包含 3 个头部包"))?;

        check_header_type(&identification, 0x01, "识别头")?;
        check_header_type(&comment, 0x03, "注释头")?;
        check_header_type(&setup, 0x05, "设置头")?;

        // 0x01 "vorbis" | version u32 | channels u8 | rate u32 | ...
        if identification.len() < 30 {
            return Err(header_error("识别头长度不足"));
        }
        let version = u32::from_le_bytes([
            identification[7],
            identification[8],
            identification[9],
            identification[10],
        ]);
        if version != 0 {
            return Err(header_error(&format!("不支持的 Vorbis 版本 {}", version)));
        }
        let channels = identification[11] as u16;
        let sample_rate = u32::from_le_bytes([
            identification[12],
            identification[13],
            identification[14],
            identification[15],
        ]);
        if channels == 0 || sample_rate == 0 {
            return Err(header_error("声道数或采样率为 0"));
        }

        Ok(Self {
            identification,
            comment,
            setup,
            channels,
            sample_rate,
        })
    }
}

fn header_error(msg: &str) -> PlayerError {
    PlayerError::DecodeError(format!("Vorbis 头部: {}", msg))
}

fn check_header_type(packet: &[u8], kind: u8, name: &str) -> Result<()> {
    if packet.len() < 7 || packet[0] != kind || &packet[1..7] != b"vorbis" {
        return Err(header_error(&format!("{}格式错误", name)));
    }
    Ok(())
}

/// Xiph lacing：首字节为包数-1，随后是前 n-1 个包的长度（255 累加），最后一个包占剩余部分
fn split_xiph_lacing(data: &[u8]) -> Result<Vec<Vec<u8>>> {
    let (&count_minus_one, mut rest) = data
        .split_first()
        .ok_or_else(|| header_error("CodecPrivate 为空"))?;

    let mut sizes = Vec::with_capacity(count_minus_one as usize);
    for _ in 0..count_minus_one {
        let mut size = 0usize;
        loop {
            let (&b, tail) = rest
                .split_first()
                .ok_or_else(|| header_error("lacing 长度被截断"))?;
            rest = tail;
            size += b as usize;
            if b != 255 {
                break;
            }
        }
        sizes.push(size);
    }

    let mut packets = Vec::with_capacity(sizes.len() + 1);
    for size in sizes {
        if rest.len() < size {
            return Err(header_error("头部包长度超出 CodecPrivate"));
        }
        let (packet, tail) = rest.split_at(size);
        packets.push(packet.to_vec());
        rest = tail;
    }
    packets.push(rest.to_vec());
    Ok(packets)
}
