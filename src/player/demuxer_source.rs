use crate::core::{Packet, Result, TrackList};
use std::time::Duration;

/// Demuxer 数据源抽象接口
///
/// 已经打开的容器：轨道列表在打开时确定，之后按容器顺序逐个读出数据包。
/// 不同的实现（FFmpeg、内存流、测试桩）都实现这个接口。
pub trait DemuxerSource: Send {
    /// 打开时发现的轨道
    fn tracks(&self) -> &TrackList;

    /// 读取下一个数据包
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个包
    /// - Ok(None): 到达文件末尾
    /// - Err(e): 读取错误
    fn read_packet(&mut self) -> Result<Option<Packet>>;

    /// 容器时长（Segment Duration）
    fn duration(&self) -> Option<Duration> {
        None
    }

    /// 释放底层资源（数据包读完后由路由线程调用）
    fn shutdown(&mut self) {}

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;
}

/// 尚未打开的输入
///
/// 轨道发现阶段按需打开，第一个输入同时包含音视频时第二个输入不会被打开。
pub trait MediaInput: Send {
    fn open(self: Box<Self>) -> Result<Box<dyn DemuxerSource>>;

    fn description(&self) -> String;
}

/// 已打开的内存数据源（测试与合成流使用）
pub struct MemorySource {
    name: String,
    tracks: TrackList,
    packets: std::vec::IntoIter<Packet>,
    duration: Option<Duration>,
}

impl MemorySource {
    pub fn new(name: &str, tracks: TrackList, packets: Vec<Packet>) -> Self {
        Self {
            name: name.to_string(),
            tracks,
            packets: packets.into_iter(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

impl DemuxerSource for MemorySource {
    fn tracks(&self) -> &TrackList {
        &self.tracks
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        Ok(self.packets.next())
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn description(&self) -> String {
        format!("内存数据源: {}", self.name)
    }
}

impl MediaInput for MemorySource {
    fn open(self: Box<Self>) -> Result<Box<dyn DemuxerSource>> {
        Ok(self)
    }

    fn description(&self) -> String {
        DemuxerSource::description(self)
    }
}
