use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 播放器配置（构造时显式传入，不使用全局默认值）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 每条轨道的数据包队列容量（背压阈值）
    pub queue_capacity: usize,

    /// 迟到阈值：数据包时间戳早于 `clock - 阈值` 时整包丢弃
    ///
    /// 默认按 60Hz 一帧计算，与源帧率无关。
    pub late_drop_threshold: Duration,

    /// 流结束后每次 fill 返回的静音字节数上限
    pub eos_fill_bytes: usize,

    /// Opus 单包最大样本数（每声道，120ms @ 48kHz）
    pub max_opus_frame_samples: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            late_drop_threshold: Duration::from_secs(1) / 60,
            eos_fill_bytes: 256,
            max_opus_frame_samples: 5760,
        }
    }
}

impl PlayerConfig {
    /// 从 JSON 读取配置，缺省字段使用默认值
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(crate::core::PlayerError::ConfigError(
                "queue_capacity 必须大于 0".to_string(),
            ));
        }
        if self.max_opus_frame_samples == 0 {
            return Err(crate::core::PlayerError::ConfigError(
                "max_opus_frame_samples 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}
