use crate::core::{Packet, PlayerError, Result, SharedPosition};
use crate::player::codec::VideoDecode;
use crate::player::frame_slot::FrameSlot;
use crate::player::log_ctx;
use crossbeam_channel::{select, Receiver, RecvTimeoutError};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 视频呈现统计
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub decoded_packets: AtomicU64,
    pub presented_frames: AtomicU64,
    pub late_packets: AtomicU64,
    pub late_frames: AtomicU64,
}

/// 视频呈现调度器
///
/// 独立线程不断从视频队列取包、解码，并按音频时钟决定每一帧：
/// - 包时间戳早于 `clock - 阈值`：整包的帧全部丢弃（迟到丢弃）
/// - 帧时间戳晚于 clock：先睡眠差值再呈现（提前等待）
/// - 否则立即写入 FrameSlot
///
/// 解码错误是终止性的：错误被保存，线程退出，FrameSlot 停在最后一帧，
/// 之后每次 `update` 都返回同一个错误。
pub struct VideoPresentationScheduler {
    clock: SharedPosition,
    slot: FrameSlot,
    error: Arc<Mutex<Option<PlayerError>>>,
    stats: Arc<SchedulerStats>,
    finished: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl VideoPresentationScheduler {
    /// 启动调度线程
    ///
    /// `shutdown` 的发送端被 drop 时，阻塞中的取包和睡眠都会立即返回。
    pub fn start(
        decoder: Box<dyn VideoDecode>,
        packets: Receiver<Packet>,
        late_drop_threshold: Duration,
        shutdown: Receiver<()>,
    ) -> Result<Self> {
        let clock = SharedPosition::new();
        let slot = FrameSlot::new();
        let error = Arc::new(Mutex::new(None));
        let stats = Arc::new(SchedulerStats::default());
        let finished = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            decoder,
            packets,
            shutdown,
            late_drop_threshold,
            clock: clock.clone(),
            slot: slot.clone(),
            error: error.clone(),
            stats: stats.clone(),
        };
        let done = finished.clone();
        let handle = thread::Builder::new()
            .name("video-scheduler".to_string())
            .spawn(move || {
                worker.run();
                done.store(true, Ordering::SeqCst);
            })?;

        Ok(Self {
            clock,
            slot,
            error,
            stats,
            finished,
            thread_handle: Some(handle),
        })
    }

    /// 保存最新音频位置；不解码、不阻塞。解码线程出错后返回保存的错误
    pub fn update(&self, position: Duration) -> Result<()> {
        self.clock.store(position);
        match &*self.error.lock() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    pub fn frame_slot(&self) -> &FrameSlot {
        &self.slot
    }

    pub fn error(&self) -> Option<PlayerError> {
        self.error.lock().clone()
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// 调度线程是否已经退出（流结束、出错或停止）
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("{} ❌ 视频调度线程 panic", log_ctx());
            }
        }
    }
}

impl Drop for VideoPresentationScheduler {
    fn drop(&mut self) {
        self.join();
    }
}

/// 包时间戳早于 `clock - threshold` 即为迟到
fn is_late(timestamp: Duration, clock: Duration, threshold: Duration) -> bool {
    clock
        .checked_sub(threshold)
        .map_or(false, |limit| timestamp < limit)
}

/// 调度线程状态
struct Worker {
    decoder: Box<dyn VideoDecode>,
    packets: Receiver<Packet>,
    shutdown: Receiver<()>,
    late_drop_threshold: Duration,
    clock: SharedPosition,
    slot: FrameSlot,
    error: Arc<Mutex<Option<PlayerError>>>,
    stats: Arc<SchedulerStats>,
}

impl Worker {
    fn run(mut self) {
        info!("{} 🎬 视频调度线程启动", log_ctx());

        while let Some(packet) = self.next_packet() {
            if let Err(e) = self.decoder.decode(&packet) {
                error!("{} ❌ 视频解码失败 ts={:?}: {}，视频停止", log_ctx(), packet.timestamp, e);
                *self.error.lock() = Some(e);
                break;
            }
            self.stats.decoded_packets.fetch_add(1, Ordering::Relaxed);

            let clock = self.clock.load();
            if is_late(packet.timestamp, clock, self.late_drop_threshold) {
                // 迟到：丢掉这个包产出的所有帧
                let mut dropped = 0u64;
                while self.decoder.next_frame().is_some() {
                    dropped += 1;
                }
                self.stats.late_packets.fetch_add(1, Ordering::Relaxed);
                self.stats.late_frames.fetch_add(dropped, Ordering::Relaxed);
                debug!(
                    "{} 🎬 丢弃迟到包: ts={:?} < clock={:?} - {:?}（{} 帧）",
                    log_ctx(),
                    packet.timestamp,
                    clock,
                    self.late_drop_threshold,
                    dropped
                );
                continue;
            }

            while let Some(frame) = self.decoder.next_frame() {
                let now = self.clock.load();
                if frame.timestamp > now && !self.wait(frame.timestamp - now) {
                    info!("{} ⏹ 等待呈现时收到停止信号", log_ctx());
                    return;
                }
                self.slot.publish(frame);
                self.stats.presented_frames.fetch_add(1, Ordering::Relaxed);
            }
        }

        info!(
            "{} 🛑 视频调度线程结束（呈现 {} 帧，迟到丢弃 {} 包）",
            log_ctx(),
            self.stats.presented_frames.load(Ordering::Relaxed),
            self.stats.late_packets.load(Ordering::Relaxed)
        );
    }

    /// 阻塞取包；队列关闭或收到停止信号时返回 None
    fn next_packet(&self) -> Option<Packet> {
        select! {
            recv(self.packets) -> msg => msg.ok(),
            recv(self.shutdown) -> _ => None,
        }
    }

    /// 提前到达的帧：睡眠到呈现时间。被停止时返回 false
    fn wait(&self, delay: Duration) -> bool {
        matches!(self.shutdown.recv_timeout(delay), Err(RecvTimeoutError::Timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::test_support::{ScriptedVideoDecoder, VideoScript};
    use crossbeam_channel::bounded;
    use std::time::Instant;

    fn packet(ms: u64, tag: u8) -> Packet {
        Packet::new(1, Duration::from_millis(ms), vec![tag])
    }

    fn wait_finished(s: &VideoPresentationScheduler) {
        let start = Instant::now();
        while !s.is_finished() && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_is_late_threshold() {
        let t = Duration::from_millis;
        let budget = Duration::from_secs(1) / 60;
        assert!(!is_late(t(0), t(10), budget));
        assert!(is_late(t(0), t(20), budget));
        assert!(!is_late(t(990), t(1000), budget));
        assert!(is_late(t(980), t(1000), budget));
    }

    #[test]
    fn test_late_packet_contributes_no_frames() {
        let (tx, rx) = bounded(8);
        let (_keep, shutdown) = bounded::<()>(0);
        let decoder = ScriptedVideoDecoder::new(VideoScript::default());
        let s = VideoPresentationScheduler::start(Box::new(decoder), rx, Duration::from_secs(1) / 60, shutdown).unwrap();
        s.update(Duration::from_secs(10)).unwrap();
        tx.send(packet(1_000, 1)).unwrap();
        tx.send(packet(9_990, 2)).unwrap();
        drop(tx);
        wait_finished(&s);

        assert_eq!(s.stats().late_packets.load(Ordering::Relaxed), 1);
        assert_eq!(s.stats().presented_frames.load(Ordering::Relaxed), 1);
        let frame = s.frame_slot().snapshot().unwrap();
        assert_eq!(frame.pixels[0], 2);
    }

    #[test]
    fn test_early_frame_waits_before_publish() {
        let (tx, rx) = bounded(8);
        let (_keep, shutdown) = bounded::<()>(0);
        let decoder = ScriptedVideoDecoder::new(VideoScript::default());
        let s = VideoPresentationScheduler::start(Box::new(decoder), rx, Duration::from_secs(1) / 60, shutdown).unwrap();
        s.update(Duration::from_secs(1)).unwrap();

        let start = Instant::now();
        tx.send(packet(1_080, 7)).unwrap();
        thread::sleep(Duration::from_millis(30));
        // 还没到呈现时间，FrameSlot 不应被更新
        assert_eq!(s.frame_slot().generation(), 0);
        drop(tx);
        wait_finished(&s);
        assert!(start.elapsed() >= Duration::from_millis(80));
        assert_eq!(s.frame_slot().generation(), 1);
    }

    #[test]
    fn test_multiple_frames_per_packet_and_resize() {
        let (tx, rx) = bounded(8);
        let (_keep, shutdown) = bounded::<()>(0);
        let script = VideoScript {
            frames_per_packet: 2,
            size_after: Some((3, (16, 8))),
            ..VideoScript::default()
        };
        let s = VideoPresentationScheduler::start(Box::new(ScriptedVideoDecoder::new(script)), rx, Duration::from_secs(1) / 60, shutdown)
            .unwrap();
        for i in 0..4 {
            tx.send(packet(0, i)).unwrap();
        }
        drop(tx);
        wait_finished(&s);
        assert_eq!(s.stats().presented_frames.load(Ordering::Relaxed), 8);
        assert_eq!(s.frame_slot().size(), Some((16, 8)));
    }

    #[test]
    fn test_decode_error_is_sticky() {
        let (tx, rx) = bounded(16);
        let (_keep, shutdown) = bounded::<()>(0);
        let script = VideoScript {
            fail_on_packet: Some(3),
            ..VideoScript::default()
        };
        let s = VideoPresentationScheduler::start(Box::new(ScriptedVideoDecoder::new(script)), rx, Duration::from_secs(1) / 60, shutdown)
            .unwrap();
        for i in 0..6 {
            // 出错后调度线程退出，后续发送可能失败
            let _ = tx.send(packet(0, i));
        }
        wait_finished(&s);
        assert_eq!(s.stats().presented_frames.load(Ordering::Relaxed), 2);
        assert!(matches!(s.update(Duration::ZERO), Err(PlayerError::DecodeError(_))));
        assert!(matches!(s.update(Duration::from_secs(1)), Err(PlayerError::DecodeError(_))));
        // 最后一帧保持不变
        assert_eq!(s.frame_slot().snapshot().unwrap().pixels[0], 1);
    }

    #[test]
    fn test_shutdown_interrupts_wait() {
        let (tx, rx) = bounded(8);
        let (stop, shutdown) = bounded::<()>(0);
        let s = VideoPresentationScheduler::start(
            Box::new(ScriptedVideoDecoder::new(VideoScript::default())),
            rx,
            Duration::from_secs(1) / 60,
            shutdown,
        )
        .unwrap();
        tx.send(packet(60_000, 1)).unwrap();
        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        drop(stop);
        wait_finished(&s);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(s.frame_slot().generation(), 0);
    }
}
