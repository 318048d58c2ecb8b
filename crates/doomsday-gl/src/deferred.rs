//! Deferred GL task queue and reserved texture name pool.
//!
//! Any thread may enqueue tasks or take a reserved texture name. Only the GL
//! thread, the one that called [`DeferredGl::init`], drains the queue and
//! refills the pool. Tasks run outside the queue lock so producers are never
//! blocked behind a slow upload.

use std::collections::VecDeque;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use doomsday_core::constants::RESERVED_TEXTURE_NAMES;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::driver::{GlDriver, TextureContent};
use crate::error::{DeferError, Result};
use crate::task::{DeferredTask, GlCall};

/// Deferred queue configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredConfig {
    /// Names kept pre-generated for threads without a GL context.
    pub reserved_name_capacity: usize,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            reserved_name_capacity: RESERVED_TEXTURE_NAMES,
        }
    }
}

impl DeferredConfig {
    #[must_use]
    pub const fn with_reserved_name_capacity(mut self, capacity: usize) -> Self {
        self.reserved_name_capacity = capacity;
        self
    }
}

/// Lifecycle of the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueState {
    Uninitialized,
    Initialized,
    ShuttingDown,
}

#[derive(Debug)]
struct Lifecycle {
    state: QueueState,
    gl_thread: Option<ThreadId>,
    /// Bumped on shutdown so waiters can tell they outlived their session.
    epoch: u64,
}

/// Report programmer misuse: panic in debug builds, log and fail otherwise.
fn misuse(err: DeferError) -> DeferError {
    error!(%err, "Deferred GL misuse");
    if cfg!(debug_assertions) {
        panic!("deferred GL misuse: {err}");
    }
    err
}

/// Queue of GL work to run on the GL thread, plus reserved texture names.
#[derive(Debug)]
pub struct DeferredGl {
    config: DeferredConfig,
    lifecycle: Mutex<Lifecycle>,
    tasks: Mutex<VecDeque<DeferredTask>>,
    names: Mutex<VecDeque<u32>>,
    names_ready: Condvar,
}

impl Default for DeferredGl {
    fn default() -> Self {
        Self::new(DeferredConfig::default())
    }
}

impl DeferredGl {
    pub fn new(config: DeferredConfig) -> Self {
        let capacity = config.reserved_name_capacity;
        Self {
            config,
            lifecycle: Mutex::new(Lifecycle {
                state: QueueState::Uninitialized,
                gl_thread: None,
                epoch: 0,
            }),
            tasks: Mutex::new(VecDeque::new()),
            names: Mutex::new(VecDeque::with_capacity(capacity)),
            names_ready: Condvar::new(),
        }
    }

    pub const fn config(&self) -> &DeferredConfig {
        &self.config
    }

    /// Start a session, making the calling thread the GL thread.
    pub fn init(&self) -> Result<()> {
        let mut life = self.lifecycle.lock();
        if life.state != QueueState::Uninitialized {
            return Err(misuse(DeferError::AlreadyInitialized));
        }
        life.state = QueueState::Initialized;
        life.gl_thread = Some(thread::current().id());
        info!(
            capacity = self.config.reserved_name_capacity,
            "Deferred GL queue initialized"
        );
        Ok(())
    }

    pub fn state(&self) -> QueueState {
        self.lifecycle.lock().state
    }

    /// Whether the calling thread is the GL thread.
    pub fn is_gl_thread(&self) -> bool {
        self.lifecycle.lock().gl_thread == Some(thread::current().id())
    }

    fn check_gl_thread(&self) -> Result<()> {
        let life = self.lifecycle.lock();
        if life.state != QueueState::Initialized {
            return Err(misuse(DeferError::NotInitialized));
        }
        if life.gl_thread != Some(thread::current().id()) {
            return Err(misuse(DeferError::WrongThread));
        }
        Ok(())
    }

    /// Append a task. Callable from any thread.
    ///
    /// Fails with [`DeferError::ShutDown`] once the session has ended.
    pub fn enqueue(&self, task: DeferredTask) -> Result<()> {
        // Held across the push so shutdown's purge can't run in between.
        let life = self.lifecycle.lock();
        match life.state {
            QueueState::Initialized => {}
            QueueState::ShuttingDown => return Err(DeferError::ShutDown),
            QueueState::Uninitialized if life.epoch > 0 => return Err(DeferError::ShutDown),
            QueueState::Uninitialized => return Err(misuse(DeferError::NotInitialized)),
        }
        self.tasks.lock().push_back(task);
        Ok(())
    }

    /// Queue an upload of a copy of `content`.
    pub fn enqueue_texture_upload(&self, content: &TextureContent) -> Result<()> {
        self.enqueue(DeferredTask::UploadTexture(Box::new(content.clone())))
    }

    pub fn enqueue_set_vsync(&self, on: bool) -> Result<()> {
        self.enqueue(DeferredTask::SetVsync(on))
    }

    pub fn enqueue_call(&self, call: GlCall) -> Result<()> {
        self.enqueue(DeferredTask::Call(call))
    }

    pub fn enqueue_enum(&self, f: fn(u32), value: u32) -> Result<()> {
        self.enqueue_call(GlCall::Enum(f, value))
    }

    pub fn enqueue_int(&self, f: fn(i32), value: i32) -> Result<()> {
        self.enqueue_call(GlCall::Int(f, value))
    }

    pub fn enqueue_enum_float(&self, f: fn(u32, f32), e: u32, value: f32) -> Result<()> {
        self.enqueue_call(GlCall::EnumFloat(f, e, value))
    }

    /// Queue a call taking an enum and a float array; `values` is copied.
    pub fn enqueue_enum_float_array(
        &self,
        f: fn(u32, &[f32]),
        e: u32,
        values: &[f32],
    ) -> Result<()> {
        self.enqueue_call(GlCall::EnumFloatArray(f, e, values.to_vec()))
    }

    /// Queue a call taking a uint array; `values` is copied.
    pub fn enqueue_uint_array(&self, f: fn(&[u32]), values: &[u32]) -> Result<()> {
        self.enqueue_call(GlCall::UintArray(f, values.to_vec()))
    }

    /// Run queued tasks in FIFO order on the GL thread.
    ///
    /// Stops when the queue is empty or `budget` has elapsed; a zero budget
    /// drains everything. The name pool is refilled before the first task
    /// and after each one. Returns the number of tasks run.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn drain(&self, driver: &mut dyn GlDriver, budget: Duration) -> Result<usize> {
        self.check_gl_thread()?;
        let started = Instant::now();
        self.refill_names(driver);

        let mut executed = 0;
        while budget.is_zero() || started.elapsed() < budget {
            let Some(task) = self.tasks.lock().pop_front() else {
                break;
            };
            task.execute(driver);
            executed += 1;
            self.refill_names(driver);
        }

        if executed > 0 {
            debug!(
                executed,
                remaining = self.pending_count(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "Drained deferred GL tasks"
            );
        }
        Ok(executed)
    }

    /// Top the reserved pool up to capacity. Returns how many names were added.
    pub fn reserve_names(&self, driver: &mut dyn GlDriver) -> Result<usize> {
        self.check_gl_thread()?;
        Ok(self.refill_names(driver))
    }

    fn refill_names(&self, driver: &mut dyn GlDriver) -> usize {
        let shortfall = self
            .config
            .reserved_name_capacity
            .saturating_sub(self.names.lock().len());
        if shortfall == 0 {
            return 0;
        }
        // Only the GL thread adds names, so the shortfall can't shrink meanwhile.
        let fresh = driver.generate_texture_names(shortfall);
        let added = fresh.len();
        self.names.lock().extend(fresh);
        self.names_ready.notify_all();
        added
    }

    /// Take the oldest reserved name, waiting for the GL thread to refill an
    /// empty pool.
    ///
    /// Fails with [`DeferError::WouldDeadlock`] on the GL thread itself and
    /// with [`DeferError::ShutDown`] if the queue shuts down while waiting.
    pub fn take_reserved_name(&self) -> Result<u32> {
        self.take_name(None)?.ok_or(DeferError::ShutDown)
    }

    /// Like [`take_reserved_name`](Self::take_reserved_name) but gives up
    /// after `timeout`, returning `None`.
    pub fn take_reserved_name_timeout(&self, timeout: Duration) -> Result<Option<u32>> {
        self.take_name(Some(Instant::now() + timeout))
    }

    fn take_name(&self, deadline: Option<Instant>) -> Result<Option<u32>> {
        let (epoch, on_gl_thread) = {
            let life = self.lifecycle.lock();
            match life.state {
                QueueState::Initialized => {}
                QueueState::ShuttingDown => return Err(DeferError::ShutDown),
                // A session existed and has ended.
                QueueState::Uninitialized if life.epoch > 0 => return Err(DeferError::ShutDown),
                QueueState::Uninitialized => return Err(misuse(DeferError::NotInitialized)),
            }
            (life.epoch, life.gl_thread == Some(thread::current().id()))
        };

        let mut names = self.names.lock();
        loop {
            if let Some(name) = names.pop_front() {
                return Ok(Some(name));
            }
            if self.lifecycle.lock().epoch != epoch {
                return Err(DeferError::ShutDown);
            }
            if on_gl_thread {
                return Err(DeferError::WouldDeadlock);
            }
            match deadline {
                None => self.names_ready.wait(&mut names),
                Some(deadline) => {
                    if self.names_ready.wait_until(&mut names, deadline).timed_out() {
                        return Ok(names.pop_front());
                    }
                }
            }
        }
    }

    /// Drop every pending task without running it. Returns how many were
    /// dropped.
    pub fn purge(&self) -> usize {
        let purged = std::mem::take(&mut *self.tasks.lock());
        if !purged.is_empty() {
            debug!(count = purged.len(), "Purged deferred GL tasks");
        }
        purged.len()
    }

    /// Give unused reserved names back to the driver.
    pub fn release_reserved_names(&self, driver: &mut dyn GlDriver) -> Result<usize> {
        self.check_gl_thread()?;
        Ok(self.delete_names(driver))
    }

    fn delete_names(&self, driver: &mut dyn GlDriver) -> usize {
        let names: Vec<u32> = self.names.lock().drain(..).collect();
        if !names.is_empty() {
            driver.delete_texture_names(&names);
        }
        names.len()
    }

    /// End the session: wake waiting takers, purge tasks and release names.
    pub fn shutdown(&self, driver: &mut dyn GlDriver) -> Result<()> {
        self.check_gl_thread()?;
        let stale = {
            let mut life = self.lifecycle.lock();
            life.state = QueueState::ShuttingDown;
            life.epoch += 1;
            // Enqueue pushes under the lifecycle lock, so nothing lands after this.
            std::mem::take(&mut *self.tasks.lock())
        };
        {
            let _names = self.names.lock();
            self.names_ready.notify_all();
        }

        let purged = stale.len();
        drop(stale);
        let released = self.delete_names(driver);

        let mut life = self.lifecycle.lock();
        life.state = QueueState::Uninitialized;
        life.gl_thread = None;
        info!(purged, released, "Deferred GL queue shut down");
        Ok(())
    }

    /// Tasks waiting to run.
    pub fn pending_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Names currently in the reserved pool.
    pub fn reserved_count(&self) -> usize {
        self.names.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::PixelFormat;

    #[derive(Default)]
    struct CountingDriver {
        next: u32,
        uploads: Vec<u32>,
        vsync: Vec<bool>,
        deleted: Vec<u32>,
    }

    impl GlDriver for CountingDriver {
        fn upload_texture(&mut self, content: &TextureContent) {
            self.uploads.push(content.name);
        }

        fn set_vsync(&mut self, on: bool) {
            self.vsync.push(on);
        }

        fn generate_texture_names(&mut self, count: usize) -> Vec<u32> {
            let start = self.next + 1;
            self.next += count as u32;
            (start..=self.next).collect()
        }

        fn delete_texture_names(&mut self, names: &[u32]) {
            self.deleted.extend_from_slice(names);
        }
    }

    fn small() -> DeferredGl {
        DeferredGl::new(DeferredConfig::default().with_reserved_name_capacity(4))
    }

    #[test]
    fn drain_runs_tasks_in_order() {
        let gl = small();
        gl.init().unwrap();
        let mut driver = CountingDriver::default();
        for name in [10, 11, 12] {
            let content = TextureContent::from_pixels(name, PixelFormat::Luminance, 1, 1, &[0u8]);
            gl.enqueue_texture_upload(&content).unwrap();
        }
        gl.enqueue_set_vsync(true).unwrap();
        assert_eq!(gl.pending_count(), 4);

        assert_eq!(gl.drain(&mut driver, Duration::ZERO).unwrap(), 4);
        assert_eq!(driver.uploads, vec![10, 11, 12]);
        assert_eq!(driver.vsync, vec![true]);
        assert_eq!(gl.pending_count(), 0);
        assert_eq!(gl.reserved_count(), 4);
    }

    #[test]
    fn names_come_out_in_allocation_order() {
        let gl = small();
        gl.init().unwrap();
        let mut driver = CountingDriver::default();
        assert_eq!(gl.reserve_names(&mut driver).unwrap(), 4);
        assert_eq!(gl.reserve_names(&mut driver).unwrap(), 0);

        let taken: Vec<u32> = (0..4).map(|_| gl.take_reserved_name().unwrap()).collect();
        assert_eq!(taken, vec![1, 2, 3, 4]);
        assert_eq!(gl.reserve_names(&mut driver).unwrap(), 4);
        assert_eq!(gl.take_reserved_name().unwrap(), 5);
    }

    #[test]
    fn gl_thread_cannot_wait_on_itself() {
        let gl = small();
        gl.init().unwrap();
        assert_eq!(gl.take_reserved_name(), Err(DeferError::WouldDeadlock));
    }

    #[test]
    fn timeout_returns_none() {
        let gl = small();
        gl.init().unwrap();
        std::thread::scope(|s| {
            s.spawn(|| {
                let got = gl.take_reserved_name_timeout(Duration::from_millis(5));
                assert_eq!(got, Ok(None));
            });
        });
    }

    #[test]
    fn purge_is_idempotent() {
        let gl = small();
        gl.init().unwrap();
        assert_eq!(gl.purge(), 0);
        gl.enqueue_set_vsync(false).unwrap();
        gl.enqueue_set_vsync(true).unwrap();
        assert_eq!(gl.purge(), 2);
        assert_eq!(gl.purge(), 0);
        assert_eq!(gl.pending_count(), 0);
    }

    #[test]
    fn shutdown_releases_names_and_allows_reinit() {
        let gl = small();
        gl.init().unwrap();
        let mut driver = CountingDriver::default();
        gl.reserve_names(&mut driver).unwrap();
        gl.take_reserved_name_timeout(Duration::ZERO).unwrap();
        gl.enqueue_set_vsync(true).unwrap();

        gl.shutdown(&mut driver).unwrap();
        assert_eq!(gl.state(), QueueState::Uninitialized);
        assert_eq!(driver.deleted, vec![2, 3, 4]);
        assert!(driver.vsync.is_empty());
        assert_eq!(gl.pending_count(), 0);

        gl.init().unwrap();
        assert_eq!(gl.state(), QueueState::Initialized);
    }

    #[test]
    fn enqueue_after_shutdown_reports_shut_down() {
        let gl = small();
        gl.init().unwrap();
        let mut driver = CountingDriver::default();
        gl.shutdown(&mut driver).unwrap();

        assert_eq!(gl.enqueue_set_vsync(true), Err(DeferError::ShutDown));
        assert_eq!(gl.pending_count(), 0);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "before init"))]
    fn enqueue_before_init_is_misuse() {
        let gl = small();
        assert_eq!(gl.enqueue_set_vsync(true), Err(DeferError::NotInitialized));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "GL thread"))]
    fn drain_off_thread_is_misuse() {
        let gl = small();
        gl.init().unwrap();
        let result = std::thread::scope(|s| {
            s.spawn(|| gl.drain(&mut CountingDriver::default(), Duration::ZERO))
                .join()
        });
        match result {
            Ok(r) => assert_eq!(r, Err(DeferError::WrongThread)),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
