use crate::core::{
    AudioCodec, Packet, PlayerConfig, PlayerError, Result, Track, OUTPUT_CHANNELS,
};
use crate::player::codec::{CodecProvider, OpusDecode, VorbisHeaders, VorbisSynthesis};
use crate::player::log_ctx;
use crossbeam_channel::Receiver;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// 每种编解码器的解码路径：送入一个包，把交错立体声样本追加到缓冲区
enum AudioPipeline {
    Opus {
        decoder: Box<dyn OpusDecode>,
        pcm: Vec<f32>, // 单包解码缓冲（原始声道数交错）
    },
    Vorbis {
        synthesis: Box<dyn VorbisSynthesis>,
    },
}

impl AudioPipeline {
    /// 解码一个包，返回追加的样本数
    fn feed(&mut self, payload: &[u8], channels: usize, out: &mut VecDeque<f32>) -> Result<usize> {
        let before = out.len();
        match self {
            AudioPipeline::Opus { decoder, pcm } => {
                let frames = decoder.decode_float(payload, pcm, false)?;
                let decoded = pcm.get(..frames * channels).ok_or_else(|| {
                    PlayerError::DecodeError(format!("Opus 返回 {} 个样本，超出缓冲区", frames))
                })?;
                append_stereo(decoded, channels, out);
            }
            AudioPipeline::Vorbis { synthesis } => {
                synthesis.synthesis(payload)?;
                synthesis.blockin()?;
                // 一个包可能产出 0~n 个 PCM 块，全部读出
                loop {
                    let count = {
                        let pcm = synthesis.pcm_out();
                        let count = pcm.first().map_or(0, |c| c.len());
                        if count == 0 {
                            break;
                        }
                        if pcm.len() < channels || pcm.iter().any(|c| c.len() != count) {
                            return Err(PlayerError::DecodeError(format!(
                                "Vorbis PCM 声道数据不完整（{} 声道）",
                                pcm.len()
                            )));
                        }
                        for i in 0..count {
                            if channels == 1 {
                                out.push_back(pcm[0][i]);
                                out.push_back(pcm[0][i]);
                            } else {
                                out.push_back(pcm[0][i]);
                                out.push_back(pcm[1][i]);
                            }
                        }
                        count
                    };
                    // 读取游标必须推进读出的样本数，否则解码器停滞
                    synthesis.read(count)?;
                }
            }
        }
        Ok(out.len() - before)
    }
}

/// 把原始声道数的交错样本转换成立体声追加到缓冲区；单声道逐样本复制
fn append_stereo(samples: &[f32], channels: usize, out: &mut VecDeque<f32>) {
    if channels == 1 {
        out.reserve(samples.len() * 2);
        for &s in samples {
            out.push_back(s);
            out.push_back(s);
        }
    } else {
        out.extend(samples.iter().copied());
    }
}

/// 只由 `fill` 使用，等包时一直持有
struct AssemblerState {
    pipeline: AudioPipeline,
    samples: VecDeque<f32>, // 交错立体声，按解码顺序
    ended: bool,
    packets: u64,
}

/// 音频帧组装器
///
/// 拉模式：音频输出端按自己的节奏调用 `fill`，样本不够时在调用线程里
/// 取包解码，直到够用为止；流结束后返回固定上限的静音，不阻塞也不报错。
///
/// `position`/`error`/`is_drained` 不碰解码状态锁，`fill` 等包时也能立即返回。
pub struct AudioFrameAssembler {
    codec: AudioCodec,
    channels: u16, // 源声道数
    sample_rate: u32,
    packets: Receiver<Packet>,
    eos_fill_samples: usize,
    state: Mutex<AssemblerState>,
    served_samples: AtomicU64, // 已交给输出端的真实样本（不含静音填充）
    drained: AtomicBool,
    failure: Mutex<Option<PlayerError>>,
    scratch: Mutex<Vec<f32>>, // read() 遇到未对齐缓冲时使用
}

impl AudioFrameAssembler {
    /// 根据轨道 CodecID 选择解码路径
    ///
    /// Vorbis 会校验轨道声明的声道数/采样率与 CodecPrivate 头部是否一致，不一致直接报错。
    pub fn new(
        track: &Track,
        codecs: &dyn CodecProvider,
        packets: Receiver<Packet>,
        config: &PlayerConfig,
    ) -> Result<Self> {
        let codec = AudioCodec::from_codec_id(&track.codec_id)
            .ok_or_else(|| PlayerError::UnsupportedCodec(track.codec_id.clone()))?;

        let (channels, sample_rate, pipeline) = match codec {
            AudioCodec::Vorbis => {
                let headers = VorbisHeaders::parse(&track.codec_private)?;
                if headers.channels != track.channels {
                    return Err(PlayerError::ConfigMismatch {
                        what: "声道数",
                        declared: track.channels as u32,
                        header: headers.channels as u32,
                    });
                }
                if headers.sample_rate != track.sampling_frequency {
                    return Err(PlayerError::ConfigMismatch {
                        what: "采样率",
                        declared: track.sampling_frequency,
                        header: headers.sample_rate,
                    });
                }
                let synthesis = codecs.vorbis_synthesis(&headers)?;
                (headers.channels, headers.sample_rate, AudioPipeline::Vorbis { synthesis })
            }
            AudioCodec::Opus => {
                let decoder = codecs.opus_decoder(track)?;
                let pcm = vec![0f32; config.max_opus_frame_samples * track.channels.max(1) as usize];
                (track.channels, track.sampling_frequency, AudioPipeline::Opus { decoder, pcm })
            }
        };

        if !(1..=OUTPUT_CHANNELS as u16).contains(&channels) {
            return Err(PlayerError::UnsupportedCodec(format!(
                "{} {} 声道（只支持单声道/立体声）",
                codec, channels
            )));
        }
        if sample_rate == 0 {
            return Err(PlayerError::UnsupportedCodec(format!("{} 采样率为 0", codec)));
        }

        info!("🔊 音频组装器: {} {} Hz, {} 声道 → 立体声", codec, sample_rate, channels);

        Ok(Self {
            codec,
            channels,
            sample_rate,
            packets,
            eos_fill_samples: config.eos_fill_bytes / std::mem::size_of::<f32>(),
            state: Mutex::new(AssemblerState {
                pipeline,
                samples: VecDeque::new(),
                ended: false,
                packets: 0,
            }),
            served_samples: AtomicU64::new(0),
            drained: AtomicBool::new(false),
            failure: Mutex::new(None),
            scratch: Mutex::new(Vec::new()),
        })
    }

    /// 填充交错立体声 f32 样本，返回写入的样本数
    ///
    /// - 缓冲足够：直接从缓冲区取
    /// - 不够：取包解码直到足够
    /// - 流结束且缓冲为空：写入不超过上限的静音
    /// - 解码出错：之后每次调用都返回同一个错误
    pub fn fill(&self, out: &mut [f32]) -> Result<usize> {
        let mut state = self.state.lock();
        if let Some(e) = self.error() {
            return Err(e);
        }
        let wanted = out.len();
        if wanted == 0 {
            return Ok(0);
        }

        while state.samples.len() < wanted && !state.ended {
            let packet = match self.packets.recv() {
                Ok(packet) => packet,
                Err(_) => {
                    info!("{} 🔊 音频队列已关闭，剩余 {} 个样本", log_ctx(), state.samples.len());
                    state.ended = true;
                    break;
                }
            };
            if packet.payload.is_empty() {
                continue;
            }
            state.packets += 1;

            let st = &mut *state;
            match st.pipeline.feed(&packet.payload, self.channels as usize, &mut st.samples) {
                Ok(n) => {
                    if st.packets <= 5 || st.packets % 100 == 0 {
                        debug!("{} 🔊 音频包 #{} ts={:?} → {} 个样本", log_ctx(), st.packets, packet.timestamp, n);
                    }
                }
                Err(e) => {
                    error!("{} ❌ 音频解码失败 ts={:?}: {}，音频停止", log_ctx(), packet.timestamp, e);
                    *self.failure.lock() = Some(e.clone());
                    return Err(e);
                }
            }
        }

        if state.samples.is_empty() {
            // 流结束：短静音，通知输出端播放完毕
            self.drained.store(true, Ordering::Release);
            let n = wanted.min(self.eos_fill_samples);
            out[..n].fill(0.0);
            return Ok(n);
        }

        let n = wanted.min(state.samples.len());
        for (dst, src) in out.iter_mut().zip(state.samples.drain(..n)) {
            *dst = src;
        }
        self.served_samples.fetch_add(n as u64, Ordering::Release);
        if state.ended && state.samples.is_empty() {
            self.drained.store(true, Ordering::Release);
        }
        Ok(n)
    }

    /// 字节接口：写入本机字节序的 f32 样本，返回字节数
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len() - buf.len() % std::mem::size_of::<f32>();
        if let Ok(samples) = bytemuck::try_cast_slice_mut::<u8, f32>(&mut buf[..len]) {
            let n = self.fill(samples)?;
            return Ok(n * std::mem::size_of::<f32>());
        }

        // 缓冲未按 f32 对齐：先解到暂存区再复制
        let mut scratch = self.scratch.lock();
        scratch.resize(len / std::mem::size_of::<f32>(), 0.0);
        let n = self.fill(&mut scratch[..])?;
        let bytes: &[u8] = bytemuck::cast_slice(&scratch[..n]);
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    /// 根据已交付的样本数推算播放位置
    pub fn position(&self) -> Duration {
        let frames = self.served_samples.load(Ordering::Acquire) / OUTPUT_CHANNELS as u64;
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    /// 已保存的终止错误
    pub fn error(&self) -> Option<PlayerError> {
        self.failure.lock().clone()
    }

    /// 流已结束且缓冲已耗尽
    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::Acquire)
    }

    pub fn codec(&self) -> AudioCodec {
        self.codec
    }

    /// 源声道数（输出始终为立体声）
    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for AudioFrameAssembler {
    fn drop(&mut self) {
        if let Some(e) = self.failure.get_mut() {
            warn!("{} 音频组装器释放时仍有错误: {}", log_ctx(), e);
        }
    }
}
