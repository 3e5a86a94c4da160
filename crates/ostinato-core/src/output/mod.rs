//! Hardware-synchronized output driver.
//!
//! The driver owns a ring of four hardware-sized buffers. Every cycle it
//! hands a gate through the [`GateQueue`], renders the next buffer through
//! the [`RenderCallback`], writes the current buffer to the [`PcmSink`] and
//! rotates the ring.
//!
//! Cycles can be driven by hand with [`OutputDriver::prime`] and
//! [`OutputDriver::step`], or by the play thread started with
//! [`OutputDriver::run`].

mod callback;
mod gate;
mod ring;
mod sink;
mod state;
mod tempo;

#[cfg(feature = "cpal")]
mod cpal_sink;

pub use callback::{f32_to_i16, CycleInfo, RenderCallback, TicInfo};
pub use gate::{Gate, GateQueue, GateRequest, GateWorkers, GATE_CHANNEL_CAPACITY};
pub use ring::{BufferFlag, BufferRing};
pub use sink::{CaptureSink, NullSink, PcmSink, WriteError};
pub use state::{PlaybackEvent, PlaybackState};
pub use tempo::TempoClock;

#[cfg(feature = "cpal")]
pub use cpal_sink::CpalSink;

use crate::compat::{Arc, AtomicU64, Mutex, MutexGuard, Ordering, Weak};
use crate::config::{DriverConfig, HardwareParams};
use crate::lockfree::AtomicFlag;
use crate::{Error, Result};
use std::thread::{self, JoinHandle};
use thread_priority::ThreadPriority;

struct DriverState {
    /// Parameters granted by the sink.
    params: HardwareParams,
    playback: PlaybackState,
    ring: BufferRing,
    sink: Box<dyn PcmSink>,
    clock: TempoClock,
    cycle: u64,
    last_tic: Option<TicInfo>,
}

pub struct OutputDriver {
    config: DriverConfig,
    state: Mutex<DriverState>,
    callback: Mutex<Option<Box<dyn RenderCallback>>>,
    queue: Arc<GateQueue>,
    gates: GateWorkers,
    shutdown: AtomicFlag,
    underruns: AtomicU64,
    play_thread: Mutex<Option<JoinHandle<()>>>,
}

impl OutputDriver {
    /// Validates `config` and starts the gate threads. The device is opened
    /// later by [`prime`](Self::prime) or [`run`](Self::run).
    pub fn new(config: DriverConfig, sink: Box<dyn PcmSink>) -> Result<Arc<Self>> {
        config.validate()?;

        let params = config.hardware.clone();
        let queue = GateQueue::new();
        let gates = GateWorkers::spawn(Arc::clone(&queue))?;

        Ok(Arc::new(Self {
            state: Mutex::new(DriverState {
                ring: BufferRing::new(params.samples_per_buffer()),
                clock: TempoClock::new(
                    config.bpm,
                    config.tact,
                    params.sample_rate,
                    params.buffer_size,
                ),
                params,
                playback: PlaybackState::Stopped,
                sink,
                cycle: 0,
                last_tic: None,
            }),
            config,
            callback: Mutex::new(None),
            queue,
            gates,
            shutdown: AtomicFlag::new(false),
            underruns: AtomicU64::new(0),
            play_thread: Mutex::new(None),
        }))
    }

    pub fn with_sink(config: DriverConfig, sink: impl PcmSink + 'static) -> Result<Arc<Self>> {
        Self::new(config, Box::new(sink))
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Parameters in effect: the requested ones until the device has been
    /// opened, the negotiated ones after.
    pub fn params(&self) -> HardwareParams {
        self.state.lock().params.clone()
    }

    pub fn sink_name(&self) -> String {
        self.state.lock().sink.name().to_string()
    }

    pub fn set_callback(&self, callback: impl RenderCallback + 'static) {
        *self.callback.lock() = Some(Box::new(callback));
    }

    pub fn clear_callback(&self) {
        *self.callback.lock() = None;
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.state.lock().playback
    }

    pub fn is_playing(&self) -> bool {
        self.playback_state().is_playing()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.get()
    }

    /// Number of buffers written since the device was opened.
    pub fn cycle(&self) -> u64 {
        self.state.lock().cycle
    }

    pub fn current_buffer(&self) -> BufferFlag {
        self.state.lock().ring.current()
    }

    pub fn last_tic(&self) -> Option<TicInfo> {
        self.state.lock().last_tic
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn bpm(&self) -> f64 {
        self.state.lock().clock.bpm()
    }

    /// Buffers per tic at the current tempo.
    pub fn delay(&self) -> f64 {
        self.state.lock().clock.delay()
    }

    pub fn set_bpm(&self, bpm: f64) -> Result<()> {
        self.state.lock().clock.set_bpm(bpm)
    }

    pub fn gate_queue(&self) -> &Arc<GateQueue> {
        &self.queue
    }

    pub fn submit_push(&self, gate: Arc<Gate>) -> Result<()> {
        self.gates.submit_push(gate)
    }

    pub fn submit_pop(&self) -> Result<()> {
        self.gates.submit_pop()
    }

    /// Submits a pop if `want_pop`, then a push of `gate` (a fresh gate if
    /// `None`) if `want_push`, and waits for the pushed gate to be ready.
    pub fn gate_control(
        &self,
        gate: Option<Arc<Gate>>,
        want_push: bool,
        want_pop: bool,
    ) -> Result<()> {
        if self.shutdown.get() {
            return Err(Error::Shutdown);
        }
        self.gates.gate_control(gate, want_push, want_pop)
    }

    /// Opens the device and enters `Playing`. A no-op if already playing.
    pub fn prime(&self) -> Result<()> {
        if self.shutdown.get() {
            return Err(Error::Shutdown);
        }

        let mut state = self.state.lock();
        let Some(next) = state.playback.transition(PlaybackEvent::Start) else {
            tracing::debug!(state = ?state.playback, "already started");
            return Ok(());
        };
        state.playback = next;

        let requested = &self.config.hardware;
        let granted = match state.sink.open(requested) {
            Ok(granted) => granted,
            Err(e) => {
                state.playback = open_failed(state.playback);
                return Err(e);
            }
        };

        let mismatch = if granted.sample_rate != requested.sample_rate {
            Some(Error::SampleRateNotAvailable {
                requested: requested.sample_rate,
                actual: granted.sample_rate,
            })
        } else if granted.channels != requested.channels {
            Some(Error::ChannelsNotAvailable(requested.channels))
        } else if granted.format != requested.format {
            Some(Error::SampleFormatNotAvailable(requested.format))
        } else {
            None
        };
        if let Some(e) = mismatch {
            state.sink.close();
            state.playback = open_failed(state.playback);
            return Err(e);
        }

        if granted.buffer_size != requested.buffer_size {
            tracing::debug!(
                requested = requested.buffer_size,
                granted = granted.buffer_size,
                "device chose a different buffer size"
            );
        }

        state.ring = BufferRing::new(granted.samples_per_buffer());
        state.clock.set_format(granted.sample_rate, granted.buffer_size);
        state.clock.reset();
        state.cycle = 0;
        state.last_tic = None;
        state.params = granted;
        if let Some(next) = state.playback.transition(PlaybackEvent::Opened) {
            state.playback = next;
        }

        tracing::info!(
            sink = state.sink.name(),
            device = %state.params.device,
            sample_rate = state.params.sample_rate,
            buffer_size = state.params.buffer_size,
            channels = state.params.channels,
            "playback started"
        );
        Ok(())
    }

    /// Runs one cycle: gate handoff, render of the next buffer, tick.
    ///
    /// Returns the rendered cycle, or `None` if the driver is not playing.
    pub fn step(&self) -> Result<Option<CycleInfo>> {
        if self.shutdown.get() {
            return Err(Error::Shutdown);
        }
        if !self.is_playing() {
            tracing::debug!("step while not playing");
            return Ok(None);
        }

        let want_pop = !self.queue.is_empty();
        self.gates.gate_control(Some(Gate::new()), true, want_pop)?;

        let (mut buffer, info) = {
            let mut state = self.state.lock();
            if !state.playback.is_playing() {
                return Ok(None);
            }
            let tic = state.clock.advance();
            if tic.is_some() {
                state.last_tic = tic;
            }
            let info = CycleInfo::for_params(&state.params, state.cycle, tic);
            (state.ring.take_fill(), info)
        };

        self.render(&mut buffer, &info);

        let mut state = self.state.lock();
        if buffer.len() == state.ring.samples() {
            state.ring.restore_fill(buffer);
        }
        self.tick_locked(&mut state)?;
        Ok(Some(info))
    }

    fn render(&self, buffer: &mut [i16], info: &CycleInfo) {
        let mut callback = self.callback.lock();
        let Some(callback) = callback.as_mut() else {
            return;
        };

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            callback.render(buffer, info);
        }));
        if result.is_err() {
            tracing::warn!(cycle = info.cycle, "render callback panicked, writing silence");
            buffer.fill(0);
        }
    }

    /// Writes the current buffer, zeroes the buffer after next and rotates.
    /// Returns `false` if not playing.
    pub fn tick(&self) -> Result<bool> {
        let mut state = self.state.lock();
        self.tick_locked(&mut state)
    }

    fn tick_locked(&self, state: &mut MutexGuard<'_, DriverState>) -> Result<bool> {
        if !state.playback.is_playing() {
            tracing::debug!("tick while not playing");
            return Ok(false);
        }

        let DriverState { ring, sink, .. } = &mut **state;
        ring.zero_next();

        match sink.write(ring.current_buffer()) {
            Ok(_) => {}
            Err(WriteError::Underrun) => {
                self.underruns.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("underrun occurred");
                if let Err(e) = sink.prepare() {
                    tracing::warn!(error = %e, "can't recover from underrun");
                }
            }
            Err(WriteError::Suspended) => {
                tracing::debug!("device suspended");
                if sink.resume().is_err() {
                    if let Err(e) = sink.prepare() {
                        tracing::warn!(error = %e, "can't recover from suspend");
                    }
                }
            }
            Err(WriteError::Other(message)) => {
                tracing::warn!(error = %message, "write to pcm device failed");
            }
        }

        ring.rotate();
        state.cycle += 1;
        Ok(true)
    }

    /// Primes the device and starts the play thread.
    pub fn run(self: &Arc<Self>) -> Result<()> {
        self.prime()?;

        let mut handle = self.play_thread.lock();
        if handle.is_some() {
            return Ok(());
        }

        let weak = Arc::downgrade(self);
        let spawned = thread::Builder::new()
            .name("ostinato-play".into())
            .spawn(move || {
                let _ = thread_priority::set_current_thread_priority(ThreadPriority::Max);
                play_loop(weak);
            });

        match spawned {
            Ok(thread) => {
                *handle = Some(thread);
                Ok(())
            }
            Err(source) => {
                drop(handle);
                self.stop();
                Err(Error::ThreadSpawn {
                    name: "ostinato-play",
                    source,
                })
            }
        }
    }

    /// Leaves `Playing`, drains and closes the device and joins the play
    /// thread. A no-op if not playing.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            match state.playback.transition(PlaybackEvent::Stop) {
                Some(next) => {
                    state.playback = next;
                    state.sink.drain();
                    state.sink.close();
                    tracing::info!(cycles = state.cycle, "playback stopped");
                }
                None => tracing::debug!("stop while not playing"),
            }
        }
        self.join_play_thread();
    }

    fn join_play_thread(&self) {
        let Some(handle) = self.play_thread.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        let _ = handle.join();
    }

    /// Stops playback and terminates the gate threads. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true) {
            return;
        }
        self.stop();
        self.gates.stop();
        tracing::debug!("output driver shut down");
    }
}

impl Drop for OutputDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn play_loop(driver: Weak<OutputDriver>) {
    loop {
        let Some(driver) = driver.upgrade() else {
            break;
        };
        if driver.is_shutdown() || !driver.is_playing() {
            break;
        }

        match driver.step() {
            Ok(Some(_)) => {}
            Ok(None) | Err(Error::Shutdown) => break,
            Err(e) => tracing::warn!(error = %e, "cycle failed"),
        }
    }
    tracing::debug!("play thread stopped");
}

fn open_failed(state: PlaybackState) -> PlaybackState {
    state
        .transition(PlaybackEvent::OpenFailed)
        .unwrap_or(PlaybackState::Stopped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::time::Duration;

    fn small_config() -> DriverConfig {
        let mut config = DriverConfig::default();
        config.hardware.buffer_size = 4;
        config.hardware.channels = 1;
        config.hardware.sample_rate = 8000;
        config
    }

    fn driver(sink: &CaptureSink) -> Arc<OutputDriver> {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        OutputDriver::with_sink(small_config(), sink.clone()).unwrap()
    }

    #[test]
    fn test_step_before_prime_is_noop() {
        let sink = CaptureSink::new();
        let driver = driver(&sink);
        assert_eq!(driver.step().unwrap(), None);
        assert!(!driver.tick().unwrap());
        assert_eq!(sink.write_count(), 0);
    }

    #[test]
    fn test_writes_lag_render_by_one_cycle() {
        let sink = CaptureSink::new();
        let driver = driver(&sink);
        driver.set_callback(|buffer: &mut [i16], cycle: &CycleInfo| {
            buffer.fill(cycle.cycle as i16 + 1);
        });
        driver.prime().unwrap();

        for _ in 0..6 {
            driver.step().unwrap();
        }

        let writes = sink.writes();
        assert_eq!(writes.len(), 6);
        assert_eq!(writes[0], vec![0; 4]);
        for (i, write) in writes.iter().enumerate().skip(1) {
            assert_eq!(write, &vec![i as i16; 4]);
        }
        assert_eq!(driver.cycle(), 6);
        assert_eq!(driver.current_buffer(), BufferFlag::Buffer2);
        assert_eq!(driver.gate_queue().len(), 1);
    }

    #[test]
    fn test_recycled_buffers_are_zeroed() {
        let sink = CaptureSink::new();
        let driver = driver(&sink);
        driver.prime().unwrap();
        let dirty = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&dirty);
        driver.set_callback(move |buffer: &mut [i16], _: &CycleInfo| {
            if buffer.iter().any(|&s| s != 0) {
                seen.fetch_add(1, Ordering::Relaxed);
            }
            buffer.fill(7);
        });

        for _ in 0..9 {
            driver.step().unwrap();
        }
        assert_eq!(dirty.load(Ordering::Relaxed), 0);
        assert!(sink.writes()[1..].iter().all(|w| w == &vec![7; 4]));
    }

    #[test]
    fn test_underrun_is_recovered() {
        let sink = CaptureSink::new();
        let driver = driver(&sink);
        driver.prime().unwrap();

        sink.inject_underrun();
        driver.step().unwrap();
        driver.step().unwrap();

        assert_eq!(driver.underruns(), 1);
        assert_eq!(sink.prepare_count(), 1);
        assert_eq!(sink.write_count(), 1);
        assert!(driver.is_playing());
    }

    #[test]
    fn test_suspend_falls_back_to_prepare() {
        let sink = CaptureSink::new();
        let driver = driver(&sink);
        driver.prime().unwrap();

        sink.inject_suspend();
        driver.step().unwrap();
        assert_eq!(sink.resume_count(), 1);
        assert_eq!(sink.prepare_count(), 0);

        sink.fail_resume(true);
        sink.inject_suspend();
        driver.step().unwrap();
        assert_eq!(sink.prepare_count(), 1);
    }

    #[test]
    fn test_locked_device() {
        let sink = CaptureSink::new();
        sink.lock_device();
        let driver = driver(&sink);
        let err = driver.prime().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockedSoundcard);
        assert_eq!(driver.playback_state(), PlaybackState::Stopped);

        sink.unlock_device();
        driver.prime().unwrap();
        assert_eq!(driver.playback_state(), PlaybackState::Playing);
    }

    #[test]
    fn test_stop() {
        let sink = CaptureSink::new();
        let driver = driver(&sink);
        driver.stop();
        assert!(!sink.was_closed());

        driver.prime().unwrap();
        driver.step().unwrap();
        driver.stop();
        assert!(sink.was_drained());
        assert!(sink.was_closed());
        assert!(!driver.is_playing());
    }

    #[test]
    fn test_tics_reach_callback() {
        let sink = CaptureSink::new();
        let mut config = small_config();
        config.bpm = 60.0;
        // one tic per buffer: 8000 Hz / 2000 frames at 60 BPM, tact 0.25
        config.hardware.buffer_size = 2000;
        let driver = OutputDriver::with_sink(config, sink.clone()).unwrap();
        let tics = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&tics);
        driver.set_callback(move |_: &mut [i16], cycle: &CycleInfo| {
            seen.lock().push(cycle.tic.map(|t| t.tic));
        });
        driver.prime().unwrap();

        for _ in 0..3 {
            driver.step().unwrap();
        }
        assert_eq!(driver.delay(), 4.0);
        assert_eq!(*tics.lock(), vec![Some(0), None, None]);
        assert_eq!(driver.last_tic(), Some(TicInfo { tic: 0, attack: 0 }));
    }

    #[test]
    fn test_panicking_callback_writes_silence() {
        let sink = CaptureSink::new();
        let driver = driver(&sink);
        driver.set_callback(|buffer: &mut [i16], _: &CycleInfo| {
            buffer.fill(3);
            panic!("render failed");
        });
        driver.prime().unwrap();
        driver.step().unwrap();
        driver.step().unwrap();
        assert_eq!(sink.writes()[1], vec![0; 4]);
    }

    #[test]
    fn test_run_and_stop_play_thread() {
        let sink = CaptureSink::new();
        let driver = driver(&sink);
        driver.run().unwrap();

        let mut waited = 0;
        while sink.write_count() < 10 && waited < 200 {
            std::thread::sleep(Duration::from_millis(5));
            waited += 1;
        }
        driver.stop();
        assert!(sink.write_count() >= 10);

        let count = sink.write_count();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(sink.write_count(), count);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let sink = CaptureSink::new();
        let driver = driver(&sink);
        driver.prime().unwrap();
        driver.shutdown();
        driver.shutdown();
        assert!(matches!(driver.step(), Err(Error::Shutdown)));
        assert!(driver.gate_queue().is_shutdown());
    }
}
