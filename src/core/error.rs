use std::sync::Arc;
use thiserror::Error;

/// 播放器错误
///
/// 实现了 `Clone`：轨道级的终止错误会被保存下来，之后每次轮询都返回同一个错误。
#[derive(Error, Debug, Clone)]
pub enum PlayerError {
    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(Arc<std::io::Error>),

    #[error("没有提供任何输入流")]
    NoStreams,

    #[error("没有可播放的音视频轨道")]
    NothingToPlay,

    #[error("无法打开输入: {0}")]
    OpenError(String),

    #[error("不支持的编解码器: {0}")]
    UnsupportedCodec(String),

    #[error("{what} 不一致: 轨道声明 {declared}，编解码器头部 {header}")]
    ConfigMismatch {
        what: &'static str,
        declared: u32,
        header: u32,
    },

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("其他错误: {0}")]
    Other(String),
}

impl From<std::io::Error> for PlayerError {
    fn from(e: std::io::Error) -> Self {
        PlayerError::IoError(Arc::new(e))
    }
}

impl From<serde_json::Error> for PlayerError {
    fn from(e: serde_json::Error) -> Self {
        PlayerError::ConfigError(e.to_string())
    }
}

impl PlayerError {
    /// 是否为轨道级错误（只禁用该轨道，另一条轨道可以继续播放）
    pub fn is_track_level(&self) -> bool {
        matches!(
            self,
            PlayerError::UnsupportedCodec(_)
                | PlayerError::ConfigMismatch { .. }
                | PlayerError::DecodeError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
