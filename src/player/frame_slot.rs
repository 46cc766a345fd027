use crate::core::VideoFrame;
use parking_lot::Mutex;
use std::sync::Arc;

/// 帧输出接口（纹理上传、截图等）
pub trait FrameSink {
    fn present(&mut self, pixels: &[u8], width: u32, height: u32);
}

/// 最近一次呈现的帧
///
/// 写者（调度线程）在锁外准备好完整的帧，再在锁内整体替换；
/// 读者只会看到旧帧或新帧，不会看到写到一半的数据。
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<SlotState>>,
}

#[derive(Default)]
struct SlotState {
    front: Option<VideoFrame>,
    generation: u64, // 每次发布 +1，绘制端据此跳过重复上传
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发布新帧（所有权转移，分辨率变化时缓冲区随之替换），返回被替换下来的旧帧
    pub fn publish(&self, frame: VideoFrame) -> Option<VideoFrame> {
        let mut state = self.inner.lock();
        state.generation += 1;
        state.front.replace(frame)
    }

    /// 在锁内把当前帧交给 sink，没有帧时返回 false
    pub fn present_into(&self, sink: &mut dyn FrameSink) -> bool {
        let state = self.inner.lock();
        match &state.front {
            Some(frame) => {
                sink.present(&frame.pixels, frame.width, frame.height);
                true
            }
            None => false,
        }
    }

    /// 复制当前帧
    pub fn snapshot(&self) -> Option<VideoFrame> {
        self.inner.lock().front.clone()
    }

    /// 当前帧尺寸
    pub fn size(&self) -> Option<(u32, u32)> {
        self.inner.lock().front.as_ref().map(|f| (f.width, f.height))
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }
}
