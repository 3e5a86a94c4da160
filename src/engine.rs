//! OstinatoEngine that runs recall trees against the output driver.

use crate::{Error, Result};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use ostinato_core::compat::{Arc, AtomicU64, Ordering};
use ostinato_core::{
    f32_to_i16, scheduler, AtomicDouble, AtomicFlag, ContextRef, CycleInfo, GroupId,
    HardwareParams, OutputDriver, RecallContainer, RecallId, RecallRef, RenderCallback, SoundScope,
};

/// Where a [`Playback`] is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// Instantiated, waiting for its first cycle.
    Pending,
    Running,
    /// Every root finished on its own.
    Finished,
    Cancelled,
}

/// One execution pass of a container: the instances created for a single
/// recall id and the recycling context they read and write.
pub struct Playback {
    recall_id: RecallId,
    context: ContextRef,
    container: Arc<RecallContainer>,
    roots: Vec<RecallRef>,
    initialized: AtomicFlag,
    finished: AtomicFlag,
    cancelled: AtomicFlag,
    cycles: AtomicU64,
}

impl Playback {
    pub fn recall_id(&self) -> RecallId {
        self.recall_id
    }

    pub fn context(&self) -> &ContextRef {
        &self.context
    }

    pub fn container(&self) -> &Arc<RecallContainer> {
        &self.container
    }

    pub fn roots(&self) -> &[RecallRef] {
        &self.roots
    }

    pub fn status(&self) -> PlaybackStatus {
        if self.cancelled.get() {
            PlaybackStatus::Cancelled
        } else if self.finished.get() {
            PlaybackStatus::Finished
        } else if self.initialized.get() {
            PlaybackStatus::Running
        } else {
            PlaybackStatus::Pending
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.status(),
            PlaybackStatus::Pending | PlaybackStatus::Running
        )
    }

    /// Cycles this playback has been ticked for.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    fn roots_done(&self) -> bool {
        self.roots
            .iter()
            .all(|root| root.is_done() || root.is_removed())
    }

    fn process(&self, info: &CycleInfo) {
        if !self.initialized.swap(true) {
            for root in &self.roots {
                scheduler::run_init(root, info);
            }
        }
        for root in &self.roots {
            scheduler::tick(root, info);
        }
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }
}

impl core::fmt::Debug for Playback {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Playback")
            .field("recall_id", &self.recall_id)
            .field("container", &self.container.name())
            .field("roots", &self.roots.len())
            .field("status", &self.status())
            .finish()
    }
}

type PlaybackList = Arc<ArcSwap<Vec<Arc<Playback>>>>;

/// Render callback: ticks every active playback, then mixes the recyclings
/// of their contexts into the interleaved output buffer.
///
/// Recycling slot `n` of a context plays on channel `n % channels`.
struct Renderer {
    playbacks: PlaybackList,
    peak: Arc<AtomicDouble>,
    mix: Vec<f32>,
}

impl Renderer {
    fn mix_into(&mut self, out: &mut [i16], info: &CycleInfo, playbacks: &[Arc<Playback>]) {
        let channels = info.channels.max(1) as usize;
        let frames = out.len() / channels;

        self.mix.clear();
        self.mix.resize(out.len(), 0.0);

        for playback in playbacks.iter().filter(|p| !p.cancelled.get()) {
            let context = &playback.context;
            for slot in 0..context.len() {
                let Some(recycling) = context.get(slot) else {
                    continue;
                };
                let channel = slot % channels;
                let signal = recycling.signal();
                for (frame, sample) in signal.iter().take(frames).enumerate() {
                    self.mix[frame * channels + channel] += *sample;
                }
            }
        }

        let mut peak = 0.0f32;
        for (dst, src) in out.iter_mut().zip(&self.mix) {
            peak = peak.max(src.abs());
            *dst = f32_to_i16(*src);
        }
        self.peak.set(peak as f64);
    }
}

impl RenderCallback for Renderer {
    fn render(&mut self, out: &mut [i16], info: &CycleInfo) {
        let playbacks = self.playbacks.load_full();

        let mut retired = false;
        for playback in playbacks.iter() {
            if playback.cancelled.get() || playback.finished.get() {
                retired = true;
                continue;
            }

            playback.process(info);

            if playback.roots_done() {
                playback.finished.set(true);
                playback.container.prune();
                retired = true;
                tracing::debug!(
                    recall_id = playback.recall_id.id(),
                    cycles = playback.cycles(),
                    "playback finished"
                );
            }
        }

        self.mix_into(out, info, &playbacks);

        if retired {
            self.playbacks.rcu(|list| {
                list.iter()
                    .filter(|p| p.is_active())
                    .cloned()
                    .collect::<Vec<_>>()
            });
        }
    }
}

/// Main engine: a registry of recall containers and the playbacks running
/// on one output driver.
///
/// # Example
///
/// ```ignore
/// use ostinato::prelude::*;
///
/// let engine = OstinatoEngine::builder()
///     .sample_rate(44100)
///     .buffer_size(944)
///     .build()?;
///
/// let container = RecallContainer::new("drums");
/// container.attach_template(RecallNode::template(CountBeats::new(16, false)))?;
///
/// let context = context_over_chain(2, 944);
/// let playback = engine.play(&container, &context, SoundScope::Sequencer);
/// engine.start()?;
/// ```
pub struct OstinatoEngine {
    driver: Arc<OutputDriver>,
    containers: DashMap<String, Arc<RecallContainer>>,
    playbacks: PlaybackList,
    peak: Arc<AtomicDouble>,
}

impl std::fmt::Debug for OstinatoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OstinatoEngine").finish_non_exhaustive()
    }
}

impl OstinatoEngine {
    pub fn builder() -> crate::EngineBuilder {
        crate::EngineBuilder::default()
    }

    pub(crate) fn from_driver(driver: Arc<OutputDriver>) -> Self {
        let playbacks: PlaybackList = Arc::new(ArcSwap::from_pointee(Vec::new()));
        let peak = Arc::new(AtomicDouble::new(0.0));

        driver.set_callback(Renderer {
            playbacks: Arc::clone(&playbacks),
            peak: Arc::clone(&peak),
            mix: Vec::new(),
        });

        Self {
            driver,
            containers: DashMap::new(),
            playbacks,
            peak,
        }
    }

    pub fn driver(&self) -> &Arc<OutputDriver> {
        &self.driver
    }

    /// Parameters granted by the device, or the requested ones before start.
    pub fn params(&self) -> HardwareParams {
        self.driver.params()
    }

    pub fn sample_rate(&self) -> u32 {
        self.params().sample_rate
    }

    pub fn buffer_size(&self) -> usize {
        self.params().buffer_size
    }

    pub fn channels(&self) -> u16 {
        self.params().channels
    }

    /// Registers `container` under its name.
    pub fn register_container(&self, container: Arc<RecallContainer>) -> Result<()> {
        let name = container.name().to_string();
        if self.containers.contains_key(&name) {
            return Err(Error::DuplicateContainer(name));
        }
        self.containers.insert(name, container);
        Ok(())
    }

    pub fn unregister_container(&self, name: &str) -> Option<Arc<RecallContainer>> {
        self.containers.remove(name).map(|(_, container)| container)
    }

    pub fn container(&self, name: &str) -> Option<Arc<RecallContainer>> {
        self.containers.get(name).map(|c| Arc::clone(c.value()))
    }

    pub fn container_names(&self) -> Vec<String> {
        self.containers.iter().map(|c| c.key().clone()).collect()
    }

    /// Instantiates every template of `container` for a fresh recall id bound
    /// to `context`. The instances start on the next cycle.
    pub fn play(
        &self,
        container: &Arc<RecallContainer>,
        context: &ContextRef,
        scope: SoundScope,
    ) -> Arc<Playback> {
        let recall_id = RecallId::new(GroupId::new(), Some(scope));
        context.set_recall_id(Some(recall_id));
        context.set_sound_scope(Some(scope));

        let roots = container.instantiate(&recall_id, Some(context));
        let playback = Arc::new(Playback {
            recall_id,
            context: Arc::clone(context),
            container: Arc::clone(container),
            roots,
            initialized: AtomicFlag::new(false),
            finished: AtomicFlag::new(false),
            cancelled: AtomicFlag::new(false),
            cycles: AtomicU64::new(0),
        });

        self.playbacks.rcu(|list| {
            let mut list = Vec::clone(list);
            list.push(Arc::clone(&playback));
            list
        });

        tracing::debug!(
            container = container.name(),
            recall_id = recall_id.id(),
            scope = %scope,
            roots = playback.roots.len(),
            "playback queued"
        );
        playback
    }

    /// [`play`](Self::play) for a registered container.
    pub fn play_named(
        &self,
        name: &str,
        context: &ContextRef,
        scope: SoundScope,
    ) -> Result<Arc<Playback>> {
        let container = self
            .container(name)
            .ok_or_else(|| Error::UnknownContainer(name.to_string()))?;
        Ok(self.play(&container, context, scope))
    }

    /// Cancels every instance of `playback`. Returns the number of root
    /// instances removed, zero if it had already ended.
    pub fn cancel(&self, playback: &Playback) -> usize {
        if !playback.is_active() {
            tracing::debug!(recall_id = playback.recall_id.id(), "cancel of ended playback");
            return 0;
        }
        playback.cancelled.set(true);

        let removed = playback.container.remove_instances(&playback.recall_id);
        self.playbacks.rcu(|list| {
            list.iter()
                .filter(|p| !core::ptr::eq(Arc::as_ptr(p), playback))
                .cloned()
                .collect::<Vec<_>>()
        });
        removed
    }

    /// Playbacks that have not finished or been cancelled.
    pub fn playbacks(&self) -> Vec<Arc<Playback>> {
        self.playbacks
            .load()
            .iter()
            .filter(|p| p.is_active())
            .cloned()
            .collect()
    }

    /// Opens the device and starts the play thread.
    pub fn start(&self) -> Result<()> {
        Ok(self.driver.run()?)
    }

    /// Opens the device without a play thread; cycles are then driven with
    /// [`process_cycles`](Self::process_cycles).
    pub fn start_manual(&self) -> Result<()> {
        Ok(self.driver.prime()?)
    }

    /// Runs up to `count` cycles on the calling thread. Returns how many ran.
    pub fn process_cycles(&self, count: usize) -> Result<usize> {
        let mut ran = 0;
        for _ in 0..count {
            if self.driver.step()?.is_none() {
                break;
            }
            ran += 1;
        }
        Ok(ran)
    }

    pub fn stop(&self) {
        self.driver.stop();
    }

    pub fn is_running(&self) -> bool {
        self.driver.is_playing()
    }

    pub fn cycle(&self) -> u64 {
        self.driver.cycle()
    }

    pub fn bpm(&self) -> f64 {
        self.driver.bpm()
    }

    pub fn set_bpm(&self, bpm: f64) -> Result<()> {
        Ok(self.driver.set_bpm(bpm)?)
    }

    /// Peak absolute sample of the last rendered buffer, before conversion.
    pub fn peak(&self) -> f64 {
        self.peak.get()
    }
}
