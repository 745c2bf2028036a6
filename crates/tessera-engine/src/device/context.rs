use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Submission serials on the GPU timeline.
///
/// `submitted` counts queue submissions made by the renderer; `completed` is
/// advanced from `Queue::on_submitted_work_done` callbacks, which fire during
/// device polling. Serials start at 1; serial 0 is always complete.
#[derive(Debug, Clone, Default)]
pub struct GpuTimeline {
    submitted: Arc<AtomicU64>,
    completed: Arc<AtomicU64>,
}

impl GpuTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serial of the latest submission.
    #[inline]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    /// Highest serial known to have finished executing.
    #[inline]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Serial of the next submission. Work recorded or enqueued now is
    /// carried by it at the earliest.
    #[inline]
    pub fn next_serial(&self) -> u64 {
        self.submitted() + 1
    }

    #[inline]
    pub fn is_retired(&self, serial: u64) -> bool {
        self.completed() >= serial
    }

    pub(crate) fn record_submission(&self) -> u64 {
        self.submitted.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn mark_completed(&self, serial: u64) {
        self.completed.fetch_max(serial, Ordering::AcqRel);
    }
}

/// Clonable handle to the device, queue and timeline owned by a `Renderer`.
///
/// Components that allocate GPU objects receive one at construction; there is
/// no global GPU state.
#[derive(Debug, Clone)]
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    timeline: GpuTimeline,
}

impl GpuContext {
    pub(crate) fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            timeline: GpuTimeline::new(),
        }
    }

    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    #[inline]
    pub fn timeline(&self) -> &GpuTimeline {
        &self.timeline
    }

    /// Submits command buffers and registers completion tracking.
    pub(crate) fn submit<I>(&self, buffers: I) -> u64
    where
        I: IntoIterator<Item = wgpu::CommandBuffer>,
    {
        self.queue.submit(buffers);
        let serial = self.timeline.record_submission();

        let timeline = self.timeline.clone();
        self.queue
            .on_submitted_work_done(move || timeline.mark_completed(serial));

        serial
    }

    /// Fires pending callbacks without blocking.
    pub(crate) fn poll(&self) {
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {e}");
        }
    }

    /// Blocks until all submitted work has finished.
    pub(crate) fn wait_idle(&self) {
        let wait = wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        };
        if let Err(e) = self.device.poll(wait) {
            log::warn!("device wait failed: {e}");
        }
    }
}
