use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 播放位置来源（音频输出或墙上时钟）
pub trait Clock: Send + Sync {
    fn position(&self) -> Duration;
}

/// 共享的播放位置 - 外部单写者，调度线程单读者
///
/// 只是一个标量，原子读写即可，不需要加锁。
#[derive(Clone, Default)]
pub struct SharedPosition {
    nanos: Arc<AtomicU64>,
}

impl SharedPosition {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存最新的音频位置（不阻塞）
    pub fn store(&self, position: Duration) {
        let nanos = u64::try_from(position.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.store(nanos, Ordering::Release);
    }

    pub fn load(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

impl Clock for SharedPosition {
    fn position(&self) -> Duration {
        self.load()
    }
}

/// 播放时钟 - 没有音频轨道时用墙上时间驱动视频
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<Mutex<ClockInner>>,
}

struct ClockInner {
    base: Duration,        // 基准位置
    base_instant: Instant, // 基准时刻
    paused: bool,
    paused_at: Duration, // 暂停时的位置
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                base: Duration::ZERO,
                base_instant: Instant::now(),
                paused: true,
                paused_at: Duration::ZERO,
            })),
        }
    }

    /// 获取当前播放时间
    pub fn now(&self) -> Duration {
        Self::now_unlocked(&self.inner.lock())
    }

    /// 设置播放位置
    pub fn set_time(&self, position: Duration) {
        let mut inner = self.inner.lock();
        inner.base = position;
        inner.base_instant = Instant::now();
        inner.paused_at = position;
    }

    /// 开始播放
    pub fn play(&self) {
        let mut inner = self.inner.lock();
        if inner.paused {
            inner.base = inner.paused_at;
            inner.base_instant = Instant::now();
            inner.paused = false;
        }
    }

    /// 暂停播放
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if !inner.paused {
            inner.paused_at = Self::now_unlocked(&inner);
            inner.paused = true;
        }
    }

    /// 是否暂停
    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    fn now_unlocked(inner: &ClockInner) -> Duration {
        if inner.paused {
            inner.paused_at
        } else {
            inner.base + inner.base_instant.elapsed()
        }
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for PlaybackClock {
    fn position(&self) -> Duration {
        self.now()
    }
}
