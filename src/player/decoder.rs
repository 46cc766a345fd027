use crate::core::{Packet, PlayerError, Result, Track, VideoCodec, VideoFrame};
use crate::player::codec::{CodecProvider, OpusDecode, VideoDecode, VorbisHeaders, VorbisSynthesis};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, software, util};
use log::{debug, info};
use std::collections::VecDeque;

fn decode_error(e: ffmpeg::Error) -> PlayerError {
    PlayerError::DecodeError(e.to_string())
}

/// 按编码打开 FFmpeg 解码器，extradata 为 CodecPrivate
fn open_decoder(id: codec::Id, extradata: &[u8]) -> Result<codec::decoder::Decoder> {
    let codec = codec::decoder::find(id)
        .ok_or_else(|| PlayerError::UnsupportedCodec(format!("FFmpeg 没有 {:?} 解码器", id)))?;
    let mut context = codec::context::Context::new_with_codec(codec);
    if !extradata.is_empty() {
        unsafe {
            let raw = context.as_mut_ptr();
            let padding = ffmpeg::ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
            let buf = ffmpeg::ffi::av_mallocz(extradata.len() + padding) as *mut u8;
            if buf.is_null() {
                return Err(PlayerError::Other("extradata 分配失败".to_string()));
            }
            std::ptr::copy_nonoverlapping(extradata.as_ptr(), buf, extradata.len());
            (*raw).extradata = buf;
            (*raw).extradata_size = extradata.len() as i32;
        }
    }
    Ok(context.decoder())
}

/// 送入一个压缩包
fn send(decoder: &mut codec::decoder::Opened, payload: &[u8]) -> Result<()> {
    let packet = ffmpeg::Packet::copy(payload);
    decoder.send_packet(&packet).map_err(decode_error)
}

fn is_drained(e: &ffmpeg::Error) -> bool {
    matches!(e, ffmpeg::Error::Other { errno: 11 } | ffmpeg::Error::Eof)
}

/// 基于 FFmpeg 的解码器工厂
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegCodecs;

impl FfmpegCodecs {
    pub fn new() -> Result<Self> {
        ffmpeg::init().map_err(|e| PlayerError::Other(format!("FFmpeg 初始化失败: {}", e)))?;
        Ok(Self)
    }
}

impl CodecProvider for FfmpegCodecs {
    fn video_decoder(&self, codec: VideoCodec, track: &Track) -> Result<Box<dyn VideoDecode>> {
        let id = match codec {
            VideoCodec::VP8 => codec::Id::VP8,
            VideoCodec::VP9 => codec::Id::VP9,
        };
        let decoder = open_decoder(id, &track.codec_private)?.video()?;
        info!("创建视频解码器: {}", codec);
        Ok(Box::new(SoftwareVideoDecoder {
            decoder,
            scaler: None,
            frames: VecDeque::new(),
        }))
    }

    fn opus_decoder(&self, track: &Track) -> Result<Box<dyn OpusDecode>> {
        let decoder = open_decoder(codec::Id::OPUS, &track.codec_private)?.audio()?;
        info!("创建 Opus 解码器: {} Hz, {} 声道", track.sampling_frequency, track.channels);
        Ok(Box::new(FfmpegOpus {
            decoder,
            resampler: None,
            channels: track.channels as usize,
        }))
    }

    fn vorbis_synthesis(&self, headers: &VorbisHeaders) -> Result<Box<dyn VorbisSynthesis>> {
        let private = xiph_lace(&[&headers.identification, &headers.comment, &headers.setup]);
        let decoder = open_decoder(codec::Id::VORBIS, &private)?.audio()?;
        info!("创建 Vorbis 解码器: {} Hz, {} 声道", headers.sample_rate, headers.channels);
        Ok(Box::new(FfmpegVorbis {
            decoder,
            resampler: None,
            pcm: vec![Vec::new(); headers.channels as usize],
        }))
    }
}

/// 重新打包为 Xiph lacing（FFmpeg Vorbis 解码器的 extradata 格式）
fn xiph_lace(packets: &[&[u8]]) -> Vec<u8> {
    let mut out = vec![packets.len().saturating_sub(1) as u8];
    if let Some((_, head)) = packets.split_last() {
        for p in head {
            let mut n = p.len();
            while n >= 255 {
                out.push(255);
                n -= 255;
            }
            out.push(n as u8);
        }
    }
    for p in packets {
        out.extend_from_slice(p);
    }
    out
}

/// 软件视频解码器（YUV → RGBA）
struct SoftwareVideoDecoder {
    decoder: codec::decoder::Video,
    scaler: Option<(software::scaling::Context, util::format::Pixel, u32, u32)>,
    frames: VecDeque<VideoFrame>,
}

// SwsContext 本身不是 Send，但每个解码器实例只在调度线程中使用
unsafe impl Send for SoftwareVideoDecoder {}

impl SoftwareVideoDecoder {
    /// 转换帧格式为 RGBA；分辨率或像素格式变化时重建 scaler
    fn convert_frame(&mut self, frame: &util::frame::Video, timestamp: std::time::Duration) -> Result<VideoFrame> {
        let (format, width, height) = (frame.format(), frame.width(), frame.height());
        let stale = !matches!(&self.scaler, Some((_, f, w, h)) if (*f, *w, *h) == (format, width, height));
        if stale {
            debug!("初始化 scaler: {:?} {}x{}", format, width, height);
            let ctx = software::scaling::Context::get(
                format,
                width,
                height,
                util::format::Pixel::RGBA,
                width,
                height,
                software::scaling::Flags::BILINEAR,
            )?;
            self.scaler = Some((ctx, format, width, height));
        }
        let Some((scaler, ..)) = self.scaler.as_mut() else {
            return Err(PlayerError::DecodeError("scaler 未初始化".to_string()));
        };

        let mut rgba_frame = util::frame::Video::empty();
        scaler.run(frame, &mut rgba_frame).map_err(decode_error)?;

        // 复制数据到连续内存
        let row_size = width as usize * 4;
        let stride = rgba_frame.stride(0);
        let src = rgba_frame.data(0);
        let mut pixels = vec![0u8; VideoFrame::expected_len(width, height)];
        for (y, dst) in pixels.chunks_exact_mut(row_size).enumerate() {
            dst.copy_from_slice(&src[y * stride..y * stride + row_size]);
        }

        Ok(VideoFrame {
            pixels,
            width,
            height,
            timestamp,
        })
    }
}

impl VideoDecode for SoftwareVideoDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<()> {
        send(&mut self.decoder, &packet.payload)?;
        loop {
            let mut decoded = util::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let frame = self.convert_frame(&decoded, packet.timestamp)?;
                    self.frames.push_back(frame);
                }
                Err(e) if is_drained(&e) => break,
                Err(e) => return Err(decode_error(e)),
            }
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Option<VideoFrame> {
        self.frames.pop_front()
    }
}

/// 把 FFmpeg 音频帧重采样为指定格式（同采样率、同声道布局）
fn resample(
    resampler: &mut Option<software::resampling::Context>,
    frame: &util::frame::Audio,
    target: util::format::Sample,
) -> Result<util::frame::Audio> {
    if resampler.is_none() {
        *resampler = Some(software::resampling::Context::get(
            frame.format(),
            frame.channel_layout(),
            frame.rate(),
            target,
            frame.channel_layout(),
            frame.rate(),
        )?);
    }
    let mut out = util::frame::Audio::empty();
    if let Some(ctx) = resampler.as_mut() {
        ctx.run(frame, &mut out).map_err(decode_error)?;
    }
    Ok(out)
}

/// Opus：输出交错 f32
struct FfmpegOpus {
    decoder: codec::decoder::Audio,
    resampler: Option<software::resampling::Context>,
    channels: usize,
}

unsafe impl Send for FfmpegOpus {}

impl OpusDecode for FfmpegOpus {
    fn decode_float(&mut self, packet: &[u8], out: &mut [f32], _fec: bool) -> Result<usize> {
        send(&mut self.decoder, packet)?;
        let mut written = 0usize; // 每声道样本数
        loop {
            let mut decoded = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let packed = resample(
                        &mut self.resampler,
                        &decoded,
                        util::format::Sample::F32(util::format::sample::Type::Packed),
                    )?;
                    let n = packed.samples() * self.channels;
                    let start = written * self.channels;
                    let dst = out
                        .get_mut(start..start + n)
                        .ok_or_else(|| PlayerError::DecodeError("Opus 输出超出缓冲区".to_string()))?;
                    let samples: Vec<f32> = bytemuck::pod_collect_to_vec(&packed.data(0)[..n * 4]);
                    dst.copy_from_slice(&samples);
                    written += packed.samples();
                }
                Err(e) if is_drained(&e) => break,
                Err(e) => return Err(decode_error(e)),
            }
        }
        Ok(written)
    }
}

/// Vorbis：用 FFmpeg 解码器模拟 synthesis/blockin/pcmout/read
struct FfmpegVorbis {
    decoder: codec::decoder::Audio,
    resampler: Option<software::resampling::Context>,
    pcm: Vec<Vec<f32>>, // 每声道待读取的样本
}

unsafe impl Send for FfmpegVorbis {}

impl VorbisSynthesis for FfmpegVorbis {
    fn synthesis(&mut self, packet: &[u8]) -> Result<()> {
        send(&mut self.decoder, packet)
    }

    fn blockin(&mut self) -> Result<()> {
        loop {
            let mut decoded = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let planar = resample(
                        &mut self.resampler,
                        &decoded,
                        util::format::Sample::F32(util::format::sample::Type::Planar),
                    )?;
                    let n = planar.samples();
                    for (ch, buf) in self.pcm.iter_mut().enumerate() {
                        let samples: Vec<f32> = bytemuck::pod_collect_to_vec(&planar.data(ch)[..n * 4]);
                        buf.extend_from_slice(&samples);
                    }
                }
                Err(e) if is_drained(&e) => return Ok(()),
                Err(e) => return Err(decode_error(e)),
            }
        }
    }

    fn pcm_out(&self) -> Vec<&[f32]> {
        self.pcm.iter().map(|c| c.as_slice()).collect()
    }

    fn read(&mut self, samples: usize) -> Result<()> {
        for buf in self.pcm.iter_mut() {
            if samples > buf.len() {
                return Err(PlayerError::DecodeError(format!(
                    "read({}) 超出可读样本数 {}",
                    samples,
                    buf.len()
                )));
            }
            buf.drain(..samples);
        }
        Ok(())
    }
}
