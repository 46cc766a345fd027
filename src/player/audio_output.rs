use crate::core::{Clock, PlayerError, Result, OUTPUT_CHANNELS};
use crate::player::audio_assembler::AudioFrameAssembler;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 音频输出 - 使用 cpal 播放，设备回调直接从组装器拉取样本
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    assembler: Arc<AudioFrameAssembler>,
    volume: Arc<Mutex<f32>>,
    queued_us: Arc<AtomicU64>, // 已交给设备、尚未播出的时长
}

// cpal::Stream 本身不是 Send，但 AudioOutput 只在创建它的 UI 线程中使用
unsafe impl Send for AudioOutput {}

impl AudioOutput {
    /// 创建音频输出（立体声，采样率与音频轨道一致）
    pub fn new(assembler: Arc<AudioFrameAssembler>) -> Result<Self> {
        let sample_rate = assembler.sample_rate();
        info!("初始化音频输出: {} Hz, {} 声道", sample_rate, OUTPUT_CHANNELS);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        let config = StreamConfig {
            channels: OUTPUT_CHANNELS as u16,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // 样本缓冲区没有重采样，设备必须直接支持轨道采样率
        let mut supported_configs = device
            .supported_output_configs()
            .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?;
        if !supported_configs.any(|s| Self::is_config_compatible(&config, &s)) {
            return Err(PlayerError::AudioError(format!(
                "音频设备不支持 {} Hz, {} 声道",
                sample_rate, OUTPUT_CHANNELS
            )));
        }

        Ok(Self {
            device,
            config,
            stream: None,
            assembler,
            volume: Arc::new(Mutex::new(1.0)),
            queued_us: Arc::new(AtomicU64::new(0)),
        })
    }

    /// 检查配置是否兼容
    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;

        let channels_match = config.channels == supported.channels();

        rate_in_range && channels_match
    }

    /// 开始播放
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let assembler = self.assembler.clone();
        let volume = self.volume.clone();
        let queued_us = self.queued_us.clone();
        let sample_rate = self.config.sample_rate.0;
        let reported = AtomicBool::new(false);

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                    let ts = info.timestamp();
                    let latency = ts.playback.duration_since(&ts.callback);
                    let queued = queued_duration(latency, data.len(), sample_rate);
                    queued_us.store(queued.as_micros() as u64, Ordering::Relaxed);
                    let written = pull(&assembler, data, &reported);
                    data[written..].fill(0.0);
                    let vol = *volume.lock();
                    for sample in data[..written].iter_mut() {
                        *sample *= vol;
                    }
                },
                move |err| {
                    error!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("音频输出已启动");

        Ok(())
    }

    /// 停止播放
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("音频输出已停止");
        }
    }

    /// 设置音量 (0.0 - 1.0)
    pub fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }

    /// 音频流已播放完毕
    pub fn finished(&self) -> bool {
        self.assembler.is_drained()
    }
}

impl Clock for AudioOutput {
    /// 听到的位置：已交付样本对应的时长减去还在设备缓冲里的部分
    ///
    /// 设备没有报告播放时间戳时只扣除当前回调缓冲区。
    fn position(&self) -> Duration {
        let queued = Duration::from_micros(self.queued_us.load(Ordering::Relaxed));
        self.assembler.position().saturating_sub(queued)
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 一次回调交付的样本在播出前还要等的时长：设备延迟 + 缓冲区本身
fn queued_duration(latency: Option<Duration>, buffer_samples: usize, sample_rate: u32) -> Duration {
    let frames = (buffer_samples / OUTPUT_CHANNELS) as f64;
    let buffer = if sample_rate == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(frames / sample_rate as f64)
    };
    latency.unwrap_or_default() + buffer
}

/// 从组装器拉满设备缓冲区，返回真实写入的样本数
///
/// 流结束或出错时提前返回，剩余部分由调用方补静音。
fn pull(assembler: &AudioFrameAssembler, data: &mut [f32], reported: &AtomicBool) -> usize {
    let mut written = 0;
    while written < data.len() {
        match assembler.fill(&mut data[written..]) {
            Ok(n) => {
                written += n;
                if n == 0 || assembler.is_drained() {
                    break;
                }
            }
            Err(e) => {
                if !reported.swap(true, Ordering::Relaxed) {
                    error!("❌ 音频停止: {}", e);
                }
                break;
            }
        }
    }
    written.min(data.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queued_duration_adds_latency_and_buffer() {
        // 960 个交错样本 = 480 帧 = 10ms @ 48kHz
        assert_eq!(
            queued_duration(Some(Duration::from_millis(20)), 960, 48000),
            Duration::from_millis(30)
        );
        assert_eq!(queued_duration(None, 960, 48000), Duration::from_millis(10));
        assert_eq!(queued_duration(None, 960, 0), Duration::ZERO);
    }
}
