use crate::core::{PlayerError, Result, Track};
use crate::player::demuxer_source::{DemuxerSource, MediaInput};
use log::{debug, info, warn};

/// 轨道发现最多使用的输入数
pub const MAX_INPUTS: usize = 2;

/// 被选中的数据源及其负责的轨道
pub struct SelectedSource {
    /// 在输入列表中的位置
    pub input_index: usize,
    pub source: Box<dyn DemuxerSource>,
    pub video: Option<Track>,
    pub audio: Option<Track>,
}

impl SelectedSource {
    pub fn description(&self) -> String {
        self.source.description()
    }
}

/// 轨道发现结果：视频、音频可能来自同一个源、两个不同的源，或者都没有
#[derive(Default)]
pub struct Discovery {
    pub sources: Vec<SelectedSource>,
}

impl Discovery {
    /// 提供视频的输入序号
    pub fn video_input(&self) -> Option<usize> {
        self.sources.iter().find(|s| s.video.is_some()).map(|s| s.input_index)
    }

    /// 提供音频的输入序号
    pub fn audio_input(&self) -> Option<usize> {
        self.sources.iter().find(|s| s.audio.is_some()).map(|s| s.input_index)
    }

    pub fn video_track(&self) -> Option<&Track> {
        self.sources.iter().find_map(|s| s.video.as_ref())
    }

    pub fn audio_track(&self) -> Option<&Track> {
        self.sources.iter().find_map(|s| s.audio.as_ref())
    }

    /// 没有任何可播放轨道
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// 已打开（或打开失败）的输入
struct Probe {
    index: usize,
    source: Option<Box<dyn DemuxerSource>>,
}

impl Probe {
    fn open(index: usize, input: Box<dyn MediaInput>) -> Result<Self> {
        let desc = input.description();
        info!("📂 打开输入 #{}: {}", index, desc);
        let source = input.open()?;
        if source.tracks().is_empty() {
            warn!("⚠️ 输入 #{} ({}) 没有任何轨道", index, desc);
        }
        for track in source.tracks().iter() {
            debug!("   轨道 #{} {:?} {}", track.id, track.kind, track.codec_id);
        }
        Ok(Self {
            index,
            source: Some(source),
        })
    }

    /// 打开失败只记录警告，当作没有任何轨道
    fn open_lenient(index: usize, input: Box<dyn MediaInput>) -> Self {
        let desc = input.description();
        match Self::open(index, input) {
            Ok(probe) => probe,
            Err(e) => {
                warn!("⚠️ 输入 #{} ({}) 打开失败，视为无轨道: {}", index, desc, e);
                Self {
                    index,
                    source: None,
                }
            }
        }
    }

    fn has_video(&self) -> bool {
        self.source
            .as_ref()
            .map_or(false, |s| s.tracks().find_first_video_track().is_some())
    }

    fn has_audio(&self) -> bool {
        self.source
            .as_ref()
            .map_or(false, |s| s.tracks().find_first_audio_track().is_some())
    }

    /// 选中这个源，只负责指定的轨道
    fn select(self, video: bool, audio: bool) -> Option<SelectedSource> {
        let source = self.source?;
        let video = if video {
            source.tracks().find_first_video_track().cloned()
        } else {
            None
        };
        let audio = if audio {
            source.tracks().find_first_audio_track().cloned()
        } else {
            None
        };
        if video.is_none() && audio.is_none() {
            return None;
        }
        Some(SelectedSource {
            input_index: self.index,
            source,
            video,
            audio,
        })
    }
}

/// 从 1~2 个输入中决定视频和音频分别来自哪个源
///
/// 第一个输入同时包含音视频时直接使用它，第二个输入不会被打开。
/// 未被选中的源在返回前释放。
pub fn discover_streams(inputs: Vec<Box<dyn MediaInput>>) -> Result<Discovery> {
    if inputs.is_empty() {
        return Err(PlayerError::NoStreams);
    }
    if inputs.len() > MAX_INPUTS {
        warn!("⚠️ 提供了 {} 个输入，只使用前 {} 个", inputs.len(), MAX_INPUTS);
    }

    let mut inputs = inputs.into_iter();
    let (first, second) = match (inputs.next(), inputs.next()) {
        (Some(first), Some(second)) => (first, second),
        (Some(only), None) => {
            // 唯一的输入：打开失败直接返回错误
            let probe = Probe::open(0, only)?;
            let sources = probe.select(true, true).into_iter().collect();
            return Ok(Discovery { sources });
        }
        _ => return Err(PlayerError::NoStreams),
    };

    let probe1 = Probe::open_lenient(0, first);
    let (v1, a1) = (probe1.has_video(), probe1.has_audio());
    if v1 && a1 {
        info!("✅ 输入 #0 同时包含音视频，跳过输入 #1");
        let sources = probe1.select(true, true).into_iter().collect();
        return Ok(Discovery { sources });
    }

    let probe2 = Probe::open_lenient(1, second);
    let (v2, a2) = (probe2.has_video(), probe2.has_audio());

    let sources: Vec<SelectedSource> = if v1 && a2 {
        // 视频取自第一个输入，音频取自第二个
        [probe1.select(true, false), probe2.select(false, true)]
            .into_iter()
            .flatten()
            .collect()
    } else if a1 && v2 {
        // 视频取自第二个输入，音频取自第一个
        [probe2.select(true, false), probe1.select(false, true)]
            .into_iter()
            .flatten()
            .collect()
    } else if v1 {
        probe1.select(true, false).into_iter().collect()
    } else if v2 {
        probe2.select(true, false).into_iter().collect()
    } else if a1 {
        probe1.select(false, true).into_iter().collect()
    } else if a2 {
        probe2.select(false, true).into_iter().collect()
    } else {
        warn!("⚠️ 两个输入中都没有找到音视频轨道");
        Vec::new()
    };

    Ok(Discovery { sources })
}
