use crate::core::{Packet, Result, Track, TrackId, TrackKind};
use crate::player::demuxer_source::DemuxerSource;
use crate::player::log_ctx;
use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError};
use log::{debug, error, info, warn};
use std::thread::{self, JoinHandle};

/// 路由线程输出的两条轨道队列
///
/// 两条队列总是同时创建、同时关闭（即使其中一条没有用到）。
/// 发送端全部 drop 后，接收端 recv() 返回 Err，即流结束。
pub struct PacketQueues {
    pub video: Receiver<Packet>,
    pub audio: Receiver<Packet>,
}

/// 路由统计（线程退出时返回）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub total: usize,
    pub video: usize,
    pub audio: usize,
    pub dropped: usize,
}

/// 路由规则：打开时已知的轨道编号
#[derive(Debug, Clone, Copy)]
struct Routes {
    video: Option<TrackId>,
    audio: Option<TrackId>,
    // 源里还有其它轨道时必须按编号过滤
    filter: bool,
}

impl Routes {
    fn route(&self, packet: &Packet) -> Option<TrackKind> {
        match (self.video, self.audio) {
            (Some(_), None) if !self.filter => Some(TrackKind::Video),
            (None, Some(_)) if !self.filter => Some(TrackKind::Audio),
            (video, audio) => {
                if video == Some(packet.track_id) {
                    Some(TrackKind::Video)
                } else if audio == Some(packet.track_id) {
                    Some(TrackKind::Audio)
                } else {
                    None
                }
            }
        }
    }
}

enum SendOutcome {
    Sent,
    Disconnected,
    Shutdown,
}

/// Demuxer 线程 - 数据包路由器
/// - 把一个源的数据包按轨道分发到两条有界 channel
/// - 通道满时 send 阻塞（背压），不丢包
/// - 源读完后关闭两条通道并释放源
pub struct DemuxerThread {
    thread_handle: Option<JoinHandle<RouterStats>>,
    description: String,
}

impl DemuxerThread {
    /// 启动路由线程
    ///
    /// `shutdown` 的发送端被 drop 时线程尽快退出。
    pub fn start(
        source: Box<dyn DemuxerSource>,
        video: Option<&Track>,
        audio: Option<&Track>,
        capacity: usize,
        shutdown: Receiver<()>,
    ) -> Result<(Self, PacketQueues)> {
        let routes = Routes {
            video: video.map(|t| t.id),
            audio: audio.map(|t| t.id),
            filter: source.tracks().len() > 1,
        };
        let description = source.description();

        // 有界 packet 通道（背压）
        let (video_tx, video_rx) = bounded::<Packet>(capacity);
        let (audio_tx, audio_rx) = bounded::<Packet>(capacity);

        let handle = thread::Builder::new()
            .name("packet-router".to_string())
            .spawn(move || Self::demux_loop(source, routes, video_tx, audio_tx, shutdown))?;

        Ok((
            Self {
                thread_handle: Some(handle),
                description,
            },
            PacketQueues {
                video: video_rx,
                audio: audio_rx,
            },
        ))
    }

    /// Demuxer 循环（在独立线程中运行）
    fn demux_loop(
        mut source: Box<dyn DemuxerSource>,
        routes: Routes,
        video_tx: Sender<Packet>,
        audio_tx: Sender<Packet>,
        shutdown: Receiver<()>,
    ) -> RouterStats {
        info!("{} 🎬 路由线程启动: {}", log_ctx(), source.description());

        // 阈值（仅用于日志）
        const LOG_FIRST_N: usize = 5;

        let mut stats = RouterStats::default();
        // 消费端退出后对应的发送端置为 None，后续包直接丢弃
        let mut video_tx = routes.video.map(|_| video_tx);
        let mut audio_tx = routes.audio.map(|_| audio_tx);

        loop {
            if matches!(shutdown.try_recv(), Err(TryRecvError::Disconnected)) {
                info!("{} ⏹ 路由线程收到停止信号", log_ctx());
                break;
            }
            if video_tx.is_none() && audio_tx.is_none() {
                info!("{} ⏹ 所有消费端已退出，停止读包", log_ctx());
                break;
            }

            let packet = match source.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    info!("{} 📄 数据源读取完毕", log_ctx());
                    break;
                }
                Err(e) => {
                    error!("{} ❌ 读取包失败: {}，按流结束处理", log_ctx(), e);
                    break;
                }
            };
            stats.total += 1;

            let (slot, kind) = match routes.route(&packet) {
                Some(TrackKind::Video) => (&mut video_tx, TrackKind::Video),
                Some(TrackKind::Audio) => (&mut audio_tx, TrackKind::Audio),
                None => {
                    stats.dropped += 1;
                    continue;
                }
            };
            let Some(tx) = slot.as_ref() else {
                stats.dropped += 1;
                continue;
            };

            let count = match kind {
                TrackKind::Video => {
                    stats.video += 1;
                    stats.video
                }
                TrackKind::Audio => {
                    stats.audio += 1;
                    stats.audio
                }
            };
            if count <= LOG_FIRST_N || count % 100 == 0 {
                debug!(
                    "{} 📦 路由 {:?} 包 #{} ts={:?}（total packets {}）",
                    log_ctx(),
                    kind,
                    count,
                    packet.timestamp,
                    stats.total
                );
            }

            match Self::send(tx, packet, &shutdown) {
                SendOutcome::Sent => {}
                SendOutcome::Disconnected => {
                    warn!("{} ⚠️ {:?} 消费端已关闭，后续包丢弃", log_ctx(), kind);
                    *slot = None;
                }
                SendOutcome::Shutdown => {
                    info!("{} ⏹ 等待队列时收到停止信号", log_ctx());
                    break;
                }
            }
        }

        // 关闭两条队列，再释放数据源
        drop(video_tx);
        drop(audio_tx);
        source.shutdown();

        info!(
            "{} 🛑 路由线程退出（共读取 {} 个包：{} 视频，{} 音频，{} 丢弃）",
            log_ctx(),
            stats.total,
            stats.video,
            stats.audio,
            stats.dropped
        );
        stats
    }

    /// 发送到有界通道，队列满时阻塞，同时响应停止信号
    fn send(tx: &Sender<Packet>, packet: Packet, shutdown: &Receiver<()>) -> SendOutcome {
        select! {
            send(tx, packet) -> res => match res {
                Ok(()) => SendOutcome::Sent,
                Err(_) => SendOutcome::Disconnected,
            },
            recv(shutdown) -> _ => SendOutcome::Shutdown,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// 等待线程结束，返回路由统计
    pub fn join(&mut self) -> Option<RouterStats> {
        let handle = self.thread_handle.take()?;
        match handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                error!("{} ❌ 路由线程 panic: {}", log_ctx(), self.description);
                None
            }
        }
    }
}

impl Drop for DemuxerThread {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!("{} DemuxerThread 被 drop，等待路由线程退出: {}", log_ctx(), self.description);
            self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Track, TrackList};
    use crate::player::demuxer_source::MemorySource;
    use std::time::Duration;

    fn alternating(n: usize) -> Vec<Packet> {
        (0..n)
            .map(|i| Packet::new(if i % 2 == 0 { 1 } else { 2 }, Duration::from_millis(i as u64 * 10), vec![i as u8]))
            .collect()
    }

    #[test]
    fn test_alternating_packets_split_in_order() {
        let video = Track::video(1, "V_VP8", 320, 240);
        let audio = Track::audio(2, "A_OPUS", 2, 48000);
        let source = MemorySource::new("av", TrackList::new(vec![video.clone(), audio.clone()]), alternating(20));
        let (_keep, shutdown) = bounded::<()>(0);
        let (mut router, queues) =
            DemuxerThread::start(Box::new(source), Some(&video), Some(&audio), 4, shutdown).unwrap();

        // 交替消费，确保有界队列不会死锁
        let mut videos = Vec::new();
        let mut audios = Vec::new();
        loop {
            let v = queues.video.recv();
            let a = queues.audio.recv();
            if let Ok(p) = &v {
                videos.push(p.payload[0]);
            }
            if let Ok(p) = &a {
                audios.push(p.payload[0]);
            }
            if v.is_err() && a.is_err() {
                break;
            }
        }
        assert_eq!(videos, (0..20).step_by(2).collect::<Vec<u8>>());
        assert_eq!(audios, (1..20).step_by(2).collect::<Vec<u8>>());

        let stats = router.join().unwrap();
        assert_eq!(stats.total, 20);
        assert_eq!((stats.video, stats.audio, stats.dropped), (10, 10, 0));
    }

    #[test]
    fn test_single_track_source_is_not_filtered() {
        let video = Track::video(7, "V_VP9", 320, 240);
        // 包的轨道编号与轨道不一致也照单全收
        let packets = vec![Packet::new(99, Duration::ZERO, vec![1]), Packet::new(7, Duration::ZERO, vec![2])];
        let source = MemorySource::new("v", TrackList::new(vec![video.clone()]), packets);
        let (_keep, shutdown) = bounded::<()>(0);
        let (mut router, queues) = DemuxerThread::start(Box::new(source), Some(&video), None, 4, shutdown).unwrap();
        let got: Vec<u8> = queues.video.iter().map(|p| p.payload[0]).collect();
        assert_eq!(got, vec![1, 2]);
        // 未使用的音频队列同样关闭
        assert!(queues.audio.recv().is_err());
        router.join();
    }

    #[test]
    fn test_unselected_track_packets_are_dropped() {
        let video = Track::video(1, "V_VP9", 320, 240);
        let audio = Track::audio(2, "A_OPUS", 2, 48000);
        let source = MemorySource::new("av", TrackList::new(vec![video.clone(), audio]), alternating(6));
        let (_keep, shutdown) = bounded::<()>(0);
        let (mut router, queues) = DemuxerThread::start(Box::new(source), Some(&video), None, 8, shutdown).unwrap();
        assert_eq!(queues.video.iter().count(), 3);
        let stats = router.join().unwrap();
        assert_eq!(stats.dropped, 3);
    }

    #[test]
    fn test_router_blocks_on_full_queue() {
        let video = Track::video(1, "V_VP8", 320, 240);
        let packets = (0..10).map(|i| Packet::new(1, Duration::ZERO, vec![i])).collect();
        let source = MemorySource::new("v", TrackList::new(vec![video.clone()]), packets);
        let (_keep, shutdown) = bounded::<()>(0);
        let (mut router, queues) = DemuxerThread::start(Box::new(source), Some(&video), None, 2, shutdown).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        // 背压：队列里最多 capacity 个包
        assert_eq!(queues.video.len(), 2);
        assert_eq!(queues.video.iter().count(), 10);
        router.join();
    }

    #[test]
    fn test_shutdown_releases_blocked_router() {
        let video = Track::video(1, "V_VP8", 320, 240);
        let packets = (0..10).map(|i| Packet::new(1, Duration::ZERO, vec![i])).collect();
        let source = MemorySource::new("v", TrackList::new(vec![video.clone()]), packets);
        let (stop, shutdown) = bounded::<()>(0);
        let (mut router, queues) = DemuxerThread::start(Box::new(source), Some(&video), None, 1, shutdown).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        drop(stop);
        let stats = router.join().unwrap();
        assert!(stats.video < 10);
        drop(queues);
    }
}
