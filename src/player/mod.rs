// 播放器核心模块

pub mod audio_assembler;
pub mod codec;
pub mod demuxer_source; // Demuxer 抽象接口
pub mod demuxer_thread; // 数据包路由线程
pub mod discovery;
pub mod frame_slot;
pub mod manager;
pub mod video_scheduler;

#[cfg(feature = "audio-output")]
pub mod audio_output;
#[cfg(feature = "ffmpeg")]
pub mod decoder;
#[cfg(feature = "ffmpeg")]
pub mod demuxer;

#[cfg(test)]
pub(crate) mod test_support;

use std::{process, thread};

pub use audio_assembler::AudioFrameAssembler;
pub use codec::{CodecProvider, OpusDecode, VideoDecode, VorbisHeaders, VorbisSynthesis};
pub use demuxer_source::{DemuxerSource, MediaInput, MemorySource};
pub use demuxer_thread::{DemuxerThread, PacketQueues, RouterStats};
pub use discovery::{discover_streams, Discovery, SelectedSource};
pub use frame_slot::{FrameSink, FrameSlot};
pub use manager::Player;
pub use video_scheduler::{SchedulerStats, VideoPresentationScheduler};

#[cfg(feature = "audio-output")]
pub use audio_output::AudioOutput;
#[cfg(feature = "ffmpeg")]
pub use decoder::FfmpegCodecs;
#[cfg(feature = "ffmpeg")]
pub use demuxer::{FfmpegInput, FfmpegSource};

/// 日志前缀：进程号与线程号
pub(crate) fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}
