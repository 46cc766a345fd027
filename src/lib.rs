// WebM 播放核心：轨道发现、数据包路由、音频组装、视频呈现调度

pub mod core;
pub mod player;

pub use crate::core::{PlayerConfig, PlayerError, Result};
pub use crate::player::Player;
