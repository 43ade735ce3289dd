// src/loader.rs
//! Progressive texture loading.
//!
//! A request returns a cheap low-resolution placeholder immediately and
//! schedules the expensive high-resolution version as a [`Synthesis`] job.
//! Jobs run cooperatively inside [`ProgressiveLoader::pump`], which the frame
//! loop calls once per frame with a [`FrameBudget`]. Requests for a key that
//! already has a job attach to it instead of creating another.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use web_time::Instant;

use crate::cache::{CacheStats, Footprint, ResolutionTier, TextureCache};
use crate::cancel::CancellationToken;
use crate::descriptor::CacheKey;
use crate::error::{Error, Result};
use crate::registry::TeardownHook;
use crate::scheduler::{Priority, PriorityQueue};
use crate::synthesis::{Step, Synthesis};

/// Per-request options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub priority: Priority,
    /// Edge length handed to the low-resolution producer.
    pub low_res_size: u32,
    /// Edge length handed to the high-resolution producer.
    pub high_res_size: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Medium,
            low_res_size: 128,
            high_res_size: 1024,
        }
    }
}

impl LoadOptions {
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_sizes(mut self, low_res_size: u32, high_res_size: u32) -> Self {
        self.low_res_size = low_res_size;
        self.high_res_size = high_res_size;
        self
    }
}

/// A texture handed to a caller, with the tier it was produced at.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub resource: T,
    pub tier: ResolutionTier,
    pub size_bytes: u64,
}

/// Lifecycle of the job behind a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Queued; no placeholder could be produced.
    Pending,
    /// Placeholder cached; high-resolution job queued or running.
    LowResReady,
    HighResReady,
    /// High-resolution production failed. The placeholder, if any, stays.
    Failed,
    /// Dropped by a context teardown.
    Cancelled,
}

/// Resolves to the high-resolution texture.
///
/// Await it, or poll it without blocking from the frame loop via
/// [`Upgrade::try_take`].
pub struct Upgrade<T> {
    key: CacheKey,
    rx: oneshot::Receiver<Result<Loaded<T>>>,
    taken: bool,
}

impl<T> Upgrade<T> {
    fn resolved(key: CacheKey, value: Result<Loaded<T>>) -> Self {
        let (tx, rx) = oneshot::channel();
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(value);
        Self { key, rx, taken: false }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// The result if it has arrived. Yields it at most once.
    pub fn try_take(&mut self) -> Option<Result<Loaded<T>>> {
        if self.taken {
            return None;
        }
        match self.rx.try_recv() {
            Ok(value) => {
                self.taken = true;
                Some(value)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.taken = true;
                Some(Err(Error::Abandoned(self.key.to_string())))
            }
        }
    }
}

impl<T> Future for Upgrade<T> {
    type Output = Result<Loaded<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.taken {
            return Poll::Ready(Err(Error::Abandoned(this.key.to_string())));
        }
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(value)) => {
                this.taken = true;
                Poll::Ready(value)
            }
            Poll::Ready(Err(_)) => {
                this.taken = true;
                Poll::Ready(Err(Error::Abandoned(this.key.to_string())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// What a caller gets back from [`ProgressiveLoader::load_progressive`].
pub struct Progressive<T> {
    /// Immediately usable texture: the cached high-resolution version, or the
    /// low-resolution placeholder. `None` if the low producer failed.
    pub placeholder: Option<Loaded<T>>,
    pub upgrade: Upgrade<T>,
}

impl<T> Progressive<T> {
    /// True when the placeholder already is the final texture.
    pub fn is_final(&self) -> bool {
        matches!(
            self.placeholder,
            Some(Loaded {
                tier: ResolutionTier::High,
                ..
            })
        )
    }
}

/// Work allowed in one [`ProgressiveLoader::pump`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBudget {
    pub max_steps: u32,
    pub max_duration: Option<Duration>,
}

impl FrameBudget {
    pub fn steps(max_steps: u32) -> Self {
        Self {
            max_steps,
            max_duration: None,
        }
    }

    pub fn time(max_duration: Duration) -> Self {
        Self {
            max_steps: u32::MAX,
            max_duration: Some(max_duration),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            max_steps: u32::MAX,
            max_duration: None,
        }
    }

    fn exhausted(&self, steps: u32, elapsed: Duration) -> bool {
        steps >= self.max_steps || self.max_duration.is_some_and(|d| elapsed >= d)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub steps: u32,
    pub completed: u32,
    pub failed: u32,
    /// Nothing queued or running after this pump.
    pub idle: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    pub requests: u64,
    pub coalesced: u64,
    pub promoted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

type StartFn<T> = Box<dyn FnOnce() -> Result<Box<dyn Synthesis<T> + Send>> + Send>;

enum Work<T> {
    /// Not started yet; building the synthesis may allocate.
    Pending(StartFn<T>),
    Running(Box<dyn Synthesis<T> + Send>),
}

struct Job<T> {
    priority: Priority,
    waiters: Vec<oneshot::Sender<Result<Loaded<T>>>>,
    /// `None` while a pump has it checked out.
    work: Option<Work<T>>,
}

struct LoaderState<T> {
    cache: TextureCache<T>,
    queue: PriorityQueue<CacheKey>,
    jobs: HashMap<CacheKey, Job<T>>,
    in_flight: Option<CacheKey>,
    /// Live jobs, plus outcomes of keys that are still cached.
    states: HashMap<CacheKey, LoadState>,
    token: CancellationToken,
    /// Bumped by every cancellation; results from older epochs are dropped.
    epoch: u64,
    stats: LoaderStats,
}

impl<T: Clone> LoaderState<T> {
    fn forget_settled(&mut self) {
        let LoaderState { states, jobs, cache, .. } = self;
        states.retain(|key, _| jobs.contains_key(key) || cache.peek(key).is_some());
    }
}

/// Two-tier texture loader with request coalescing and priority scheduling.
pub struct ProgressiveLoader<T> {
    state: Mutex<LoaderState<T>>,
}

impl<T> ProgressiveLoader<T>
where
    T: Clone + Footprint + Send + 'static,
{
    pub fn new(cache: TextureCache<T>) -> Self {
        Self {
            state: Mutex::new(LoaderState {
                cache,
                queue: PriorityQueue::new(),
                jobs: HashMap::new(),
                in_flight: None,
                states: HashMap::new(),
                token: CancellationToken::new(),
                epoch: 0,
                stats: LoaderStats::default(),
            }),
        }
    }

    /// Loader with an LRU cache of the given limits.
    pub fn with_limits(max_entries: NonZeroUsize, max_bytes: u64) -> Self {
        Self::new(TextureCache::new(max_entries, max_bytes))
    }

    /// Returns a placeholder now and schedules the high-resolution version.
    ///
    /// `low` runs synchronously inside this call. `high` builds the deferred
    /// job and is only called if no job for `key` exists yet; coalesced
    /// callers share the first caller's job.
    pub fn load_progressive<L, H, S>(
        &self,
        key: CacheKey,
        low: L,
        high: H,
        options: LoadOptions,
    ) -> Progressive<T>
    where
        L: FnOnce(u32) -> Result<T>,
        H: FnOnce(u32) -> Result<S> + Send + 'static,
        S: Synthesis<T> + Send + 'static,
    {
        let cached_low = {
            let mut st = self.state.lock();
            st.stats.requests += 1;
            match st.cache.get_entry(&key) {
                Some(entry) if entry.tier == ResolutionTier::High => {
                    trace!("{key}: high-resolution cache hit");
                    let loaded = Loaded {
                        resource: entry.resource.clone(),
                        tier: ResolutionTier::High,
                        size_bytes: entry.size_bytes,
                    };
                    return Progressive {
                        placeholder: Some(loaded.clone()),
                        upgrade: Upgrade::resolved(key, Ok(loaded)),
                    };
                }
                Some(entry) => Some(Loaded {
                    resource: entry.resource.clone(),
                    tier: entry.tier,
                    size_bytes: entry.size_bytes,
                }),
                None => None,
            }
        };

        // User code runs outside the lock.
        let fresh_low = match cached_low {
            Some(_) => None,
            None => match low(options.low_res_size) {
                Ok(resource) => Some(Loaded {
                    size_bytes: resource.footprint(),
                    resource,
                    tier: ResolutionTier::Low,
                }),
                Err(err) => {
                    warn!("{key}: low-resolution producer failed: {err}");
                    None
                }
            },
        };

        let mut guard = self.state.lock();
        let st = &mut *guard;
        if let Some(low) = &fresh_low {
            if st.cache.tier_of(&key) != Some(ResolutionTier::High) {
                st.cache
                    .put(key.clone(), low.resource.clone(), ResolutionTier::Low, low.size_bytes);
            }
        }
        let placeholder = cached_low.or(fresh_low);

        let (tx, rx) = oneshot::channel();
        let priority = options.priority;
        if let Some(job) = st.jobs.get_mut(&key) {
            job.waiters.push(tx);
            st.stats.coalesced += 1;
            let running = st.in_flight.as_ref() == Some(&key);
            if priority > job.priority && !running && st.queue.promote(&key, priority) {
                debug!("{key}: promoted {} -> {priority}", job.priority);
                job.priority = priority;
                st.stats.promoted += 1;
            }
            trace!("{key}: coalesced onto existing job ({} waiters)", job.waiters.len());
        } else {
            let size = options.high_res_size;
            let start: StartFn<T> = Box::new(move || {
                high(size).map(|s| Box::new(s) as Box<dyn Synthesis<T> + Send>)
            });
            st.jobs.insert(
                key.clone(),
                Job {
                    priority,
                    waiters: vec![tx],
                    work: Some(Work::Pending(start)),
                },
            );
            st.queue.push(key.clone(), priority);
            let state = if placeholder.is_some() {
                LoadState::LowResReady
            } else {
                LoadState::Pending
            };
            st.states.insert(key.clone(), state);
            st.forget_settled();
            debug!("{key}: queued high-resolution job at {priority}");
        }

        Progressive {
            placeholder,
            upgrade: Upgrade {
                key,
                rx,
                taken: false,
            },
        }
    }

    /// Advances queued work until the budget is spent or nothing is left.
    ///
    /// Jobs are not preempted: once started, a job runs to completion before
    /// the next one is popped, whatever its priority.
    pub fn pump(&self, budget: FrameBudget) -> PumpReport {
        let started = Instant::now();
        let mut report = PumpReport::default();

        while !budget.exhausted(report.steps, started.elapsed()) {
            let Some((key, work, token, epoch)) = self.checkout() else {
                break;
            };
            let mut synthesis = match work {
                Work::Pending(start) => match start() {
                    Ok(s) => s,
                    Err(err) => {
                        if self.finish(&key, epoch, Err(err)) {
                            report.failed += 1;
                        }
                        continue;
                    }
                },
                Work::Running(s) => s,
            };

            report.steps += 1;
            match synthesis.step(&token) {
                Ok(Step::Yield) => self.check_in(&key, epoch, synthesis),
                Ok(Step::Done(resource)) => {
                    if self.finish(&key, epoch, Ok(resource)) {
                        report.completed += 1;
                    }
                }
                Err(err) => {
                    if self.finish(&key, epoch, Err(err)) {
                        report.failed += 1;
                    }
                }
            }
        }

        report.idle = self.is_idle();
        report
    }

    fn checkout(&self) -> Option<(CacheKey, Work<T>, CancellationToken, u64)> {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        loop {
            let key = match &st.in_flight {
                Some(key) => key.clone(),
                None => {
                    let (key, priority) = st.queue.pop()?;
                    debug!("{key}: starting high-resolution job ({priority})");
                    st.in_flight = Some(key.clone());
                    key
                }
            };
            match st.jobs.get_mut(&key) {
                // `None` work means another pump holds it.
                Some(job) => return job.work.take().map(|w| (key, w, st.token.clone(), st.epoch)),
                None => {
                    warn!("{key}: dropping queue entry without a job");
                    st.in_flight = None;
                }
            }
        }
    }

    fn check_in(&self, key: &CacheKey, epoch: u64, synthesis: Box<dyn Synthesis<T> + Send>) {
        let mut st = self.state.lock();
        if st.epoch != epoch {
            trace!("{key}: discarding synthesis from a cancelled epoch");
            return;
        }
        if let Some(job) = st.jobs.get_mut(key) {
            job.work = Some(Work::Running(synthesis));
        }
    }

    /// Resolves a job. Returns false if the result was stale and dropped.
    fn finish(&self, key: &CacheKey, epoch: u64, outcome: Result<T>) -> bool {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        if st.epoch != epoch {
            trace!("{key}: discarding result from a cancelled epoch");
            return false;
        }
        if st.in_flight.as_ref() == Some(key) {
            st.in_flight = None;
        }
        let Some(job) = st.jobs.remove(key) else {
            return false;
        };

        match outcome {
            Ok(resource) => {
                let loaded = Loaded {
                    size_bytes: resource.footprint(),
                    resource,
                    tier: ResolutionTier::High,
                };
                st.cache.put(
                    key.clone(),
                    loaded.resource.clone(),
                    ResolutionTier::High,
                    loaded.size_bytes,
                );
                st.states.insert(key.clone(), LoadState::HighResReady);
                st.stats.completed += 1;
                debug!("{key}: high resolution ready for {} caller(s)", job.waiters.len());
                for waiter in job.waiters {
                    let _ = waiter.send(Ok(loaded.clone()));
                }
            }
            Err(err) => {
                let (err, state) = if err.is_cancelled() {
                    st.stats.cancelled += 1;
                    (err, LoadState::Cancelled)
                } else {
                    st.stats.failed += 1;
                    warn!("{key}: high-resolution job failed: {err}");
                    (Error::producer(key, &err), LoadState::Failed)
                };
                st.states.insert(key.clone(), state);
                for waiter in job.waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
            }
        }
        st.forget_settled();
        true
    }

    /// Cancels every queued and running job, rejects their waiters and
    /// clears the cache.
    pub fn cancel_all(&self) {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        st.token.cancel();
        st.token = CancellationToken::new();
        st.epoch += 1;

        let jobs = st.jobs.len();
        // Only this round's cancellations are remembered, until the next job settles.
        st.states.clear();
        for (key, job) in st.jobs.drain() {
            for waiter in job.waiters {
                let _ = waiter.send(Err(Error::Cancelled(key.to_string())));
            }
            st.states.insert(key, LoadState::Cancelled);
        }
        st.stats.cancelled += jobs as u64;
        st.queue.clear();
        st.in_flight = None;
        let dropped = st.cache.clear();
        info!("loader reset: cancelled {jobs} job(s), dropped {dropped} cached texture(s)");
    }

    /// `None` once the key has neither a job nor a cache entry.
    pub fn state(&self, key: &CacheKey) -> Option<LoadState> {
        self.state.lock().states.get(key).copied()
    }

    #[cfg(test)]
    fn tracked_states(&self) -> usize {
        self.state.lock().states.len()
    }

    /// Cached texture for `key`, if any, without scheduling anything.
    pub fn cached(&self, key: &CacheKey) -> Option<Loaded<T>> {
        self.state.lock().cache.get_entry(key).map(|e| Loaded {
            resource: e.resource.clone(),
            tier: e.tier,
            size_bytes: e.size_bytes,
        })
    }

    /// Jobs queued or running.
    pub fn pending(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub fn is_idle(&self) -> bool {
        let st = self.state.lock();
        st.jobs.is_empty() && st.in_flight.is_none()
    }

    pub fn stats(&self) -> LoaderStats {
        self.state.lock().stats
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.state.lock().cache.stats()
    }
}

impl<T> TeardownHook for ProgressiveLoader<T>
where
    T: Clone + Footprint + Send + 'static,
{
    fn on_teardown(&self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::once;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    struct Tex {
        size: u32,
        label: &'static str,
    }

    impl Footprint for Tex {
        fn footprint(&self) -> u64 {
            self.size as u64 * self.size as u64 * 4
        }
    }

    type Loader = ProgressiveLoader<Arc<Tex>>;

    fn loader() -> Loader {
        ProgressiveLoader::with_limits(NonZeroUsize::new(64).unwrap(), u64::MAX)
    }

    fn low(size: u32) -> Result<Arc<Tex>> {
        Ok(Arc::new(Tex { size, label: "low" }))
    }

    fn opts(priority: Priority) -> LoadOptions {
        LoadOptions::default().with_priority(priority).with_sizes(4, 16)
    }

    /// High producer that completes in one step and records its key.
    fn recording(
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    ) -> impl FnOnce(u32) -> Result<crate::synthesis::Once<Box<dyn FnOnce() -> Result<Arc<Tex>> + Send>>> + Send + 'static
    {
        move |size| {
            let f: Box<dyn FnOnce() -> Result<Arc<Tex>> + Send> = Box::new(move || {
                log.lock().push(label);
                Ok(Arc::new(Tex { size, label }))
            });
            Ok(once(f))
        }
    }

    struct Slow {
        remaining: u32,
        size: u32,
    }

    impl Synthesis<Arc<Tex>> for Slow {
        fn step(&mut self, cancel: &CancellationToken) -> Result<Step<Arc<Tex>>> {
            cancel.check("slow")?;
            if self.remaining == 0 {
                return Ok(Step::Done(Arc::new(Tex {
                    size: self.size,
                    label: "slow",
                })));
            }
            self.remaining -= 1;
            Ok(Step::Yield)
        }
    }

    #[test]
    fn placeholder_is_returned_synchronously_then_upgraded() {
        let loader = loader();
        let key = CacheKey::from("metal/albedo");
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut p = loader.load_progressive(key.clone(), low, recording("high", log), opts(Priority::Medium));

        let placeholder = p.placeholder.as_ref().unwrap();
        assert_eq!(placeholder.tier, ResolutionTier::Low);
        assert_eq!(placeholder.resource.size, 4);
        assert_eq!(loader.state(&key), Some(LoadState::LowResReady));
        assert!(p.upgrade.try_take().is_none());

        let report = loader.pump(FrameBudget::unlimited());
        assert_eq!(report.completed, 1);
        assert!(report.idle);

        let upgraded = p.upgrade.try_take().unwrap().unwrap();
        assert_eq!(upgraded.tier, ResolutionTier::High);
        assert_eq!(upgraded.resource.size, 16);
        assert!(p.upgrade.try_take().is_none());
        assert_eq!(loader.state(&key), Some(LoadState::HighResReady));

        let cached = loader.cached(&key).unwrap();
        assert!(Arc::ptr_eq(&cached.resource, &upgraded.resource));
    }

    #[test]
    fn high_tier_hit_returns_final_texture_without_scheduling() {
        let loader = loader();
        let key = CacheKey::from("sand/albedo");
        let log = Arc::new(Mutex::new(Vec::new()));
        loader.load_progressive(key.clone(), low, recording("first", log.clone()), opts(Priority::Low));
        loader.pump(FrameBudget::unlimited());

        let low_calls = AtomicUsize::new(0);
        let mut again = loader.load_progressive(
            key,
            |s| {
                low_calls.fetch_add(1, Ordering::SeqCst);
                low(s)
            },
            recording("second", log.clone()),
            opts(Priority::High),
        );
        assert!(again.is_final());
        assert_eq!(low_calls.load(Ordering::SeqCst), 0);
        assert!(again.upgrade.try_take().unwrap().is_ok());
        assert!(loader.is_idle());
        assert_eq!(*log.lock(), vec!["first"]);
    }

    #[test]
    fn drains_high_then_medium_then_low() {
        let loader = loader();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (name, priority) in [("low", Priority::Low), ("high", Priority::High), ("medium", Priority::Medium)] {
            loader.load_progressive(CacheKey::from(name), low, recording(name, log.clone()), opts(priority));
        }
        loader.pump(FrameBudget::unlimited());
        assert_eq!(*log.lock(), vec!["high", "medium", "low"]);
    }

    #[test]
    fn coalesced_requests_share_one_job() {
        let loader = loader();
        let key = CacheKey::from("rust/normal");
        let starts = Arc::new(AtomicUsize::new(0));
        let low_calls = AtomicUsize::new(0);
        let mut upgrades = Vec::new();
        for priority in [Priority::Low, Priority::Medium, Priority::High] {
            let starts = starts.clone();
            let p = loader.load_progressive(
                key.clone(),
                |size| {
                    low_calls.fetch_add(1, Ordering::SeqCst);
                    low(size)
                },
                move |size| {
                    starts.fetch_add(1, Ordering::SeqCst);
                    Ok(Slow { remaining: 2, size })
                },
                opts(priority),
            );
            assert_eq!(p.placeholder.unwrap().resource.size, 4);
            upgrades.push(p.upgrade);
        }
        assert_eq!(low_calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.pending(), 1);

        loader.pump(FrameBudget::unlimited());
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        let results: Vec<_> = upgrades.iter_mut().map(|u| u.try_take().unwrap().unwrap()).collect();
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0].resource, &w[1].resource)));
        let stats = loader.stats();
        assert_eq!((stats.requests, stats.coalesced, stats.completed), (3, 2, 1));
    }

    #[test]
    fn higher_priority_request_promotes_queued_job() {
        let loader = loader();
        let log = Arc::new(Mutex::new(Vec::new()));
        loader.load_progressive(CacheKey::from("a"), low, recording("a", log.clone()), opts(Priority::Low));
        loader.load_progressive(CacheKey::from("b"), low, recording("b", log.clone()), opts(Priority::Low));
        loader.load_progressive(CacheKey::from("b"), low, recording("b-dup", log.clone()), opts(Priority::High));

        loader.pump(FrameBudget::unlimited());
        assert_eq!(*log.lock(), vec!["b", "a"]);
        assert_eq!(loader.stats().promoted, 1);
    }

    #[test]
    fn budget_spreads_work_over_frames() {
        let loader = loader();
        let key = CacheKey::from("concrete/albedo");
        let mut p = loader.load_progressive(
            key.clone(),
            low,
            |size| Ok(Slow { remaining: 9, size }),
            opts(Priority::Medium),
        );
        let mut frames = 0;
        loop {
            frames += 1;
            let report = loader.pump(FrameBudget::steps(3));
            assert!(report.steps <= 3);
            if report.completed == 1 {
                break;
            }
            assert!(p.upgrade.try_take().is_none());
        }
        // Ten steps at three per frame.
        assert_eq!(frames, 4);
        assert!(p.upgrade.try_take().unwrap().is_ok());
    }

    #[test]
    fn failure_rejects_waiters_and_keeps_placeholder() {
        let loader = loader();
        let key = CacheKey::from("metal/roughness");
        let mut p = loader.load_progressive(
            key.clone(),
            low,
            |_| Ok(once(|| Err::<Arc<Tex>, _>(Error::custom("out of memory")))),
            opts(Priority::High),
        );
        let report = loader.pump(FrameBudget::unlimited());
        assert_eq!(report.failed, 1);

        let err = p.upgrade.try_take().unwrap().unwrap_err();
        assert!(matches!(err, Error::ProducerFailed { .. }), "{err}");
        assert_eq!(loader.state(&key), Some(LoadState::Failed));
        assert_eq!(loader.cached(&key).unwrap().tier, ResolutionTier::Low);
    }

    #[test]
    fn failed_low_producer_still_schedules_high() {
        let loader = loader();
        let key = CacheKey::from("sand/normal");
        let mut p = loader.load_progressive(
            key.clone(),
            |_| Err::<Arc<Tex>, _>(Error::custom("no placeholder")),
            |size| Ok(Slow { remaining: 0, size }),
            opts(Priority::Medium),
        );
        assert!(p.placeholder.is_none());
        assert_eq!(loader.state(&key), Some(LoadState::Pending));
        loader.pump(FrameBudget::unlimited());
        assert!(p.upgrade.try_take().unwrap().is_ok());
    }

    #[test]
    fn cancel_all_rejects_waiters_and_clears_cache() {
        let loader = loader();
        let running = CacheKey::from("running");
        let queued = CacheKey::from("queued");
        let mut a = loader.load_progressive(
            running.clone(),
            low,
            |size| Ok(Slow { remaining: 50, size }),
            opts(Priority::High),
        );
        let mut b = loader.load_progressive(
            queued.clone(),
            low,
            |size| Ok(Slow { remaining: 0, size }),
            opts(Priority::Low),
        );
        loader.pump(FrameBudget::steps(2));

        loader.cancel_all();
        assert!(a.upgrade.try_take().unwrap().unwrap_err().is_cancelled());
        assert!(b.upgrade.try_take().unwrap().unwrap_err().is_cancelled());
        assert_eq!(loader.state(&running), Some(LoadState::Cancelled));
        assert!(loader.cached(&running).is_none());
        assert_eq!(loader.cache_stats().entries, 0);

        let report = loader.pump(FrameBudget::unlimited());
        assert_eq!((report.steps, report.completed), (0, 0));
        assert!(report.idle);
    }

    #[test]
    fn loader_is_usable_after_cancellation() {
        let loader = loader();
        let key = CacheKey::from("again");
        loader.load_progressive(key.clone(), low, |size| Ok(Slow { remaining: 5, size }), opts(Priority::Low));
        loader.cancel_all();

        let mut p = loader.load_progressive(key.clone(), low, |size| Ok(Slow { remaining: 1, size }), opts(Priority::Low));
        loader.pump(FrameBudget::unlimited());
        assert!(p.upgrade.try_take().unwrap().is_ok());
        assert_eq!(loader.state(&key), Some(LoadState::HighResReady));
    }

    #[test]
    fn dropped_loader_abandons_upgrades() {
        let loader = loader();
        let mut p = loader.load_progressive(
            CacheKey::from("orphan"),
            low,
            |size| Ok(Slow { remaining: 1, size }),
            opts(Priority::Low),
        );
        drop(loader);
        assert!(matches!(p.upgrade.try_take(), Some(Err(Error::Abandoned(_)))));
    }

    #[test]
    fn settled_keys_are_forgotten_with_their_cache_entries() {
        let loader: Loader = ProgressiveLoader::with_limits(NonZeroUsize::new(2).unwrap(), u64::MAX);
        let keys: Vec<_> = (0..20).map(|i| CacheKey::from(format!("tile/{i}").as_str())).collect();
        for key in &keys {
            loader.load_progressive(key.clone(), low, |size| Ok(Slow { remaining: 0, size }), opts(Priority::Low));
            loader.pump(FrameBudget::unlimited());
        }
        assert!(loader.tracked_states() <= 2, "{}", loader.tracked_states());
        assert_eq!(loader.state(&keys[0]), None);
        assert_eq!(loader.state(&keys[19]), Some(LoadState::HighResReady));

        loader.load_progressive(CacheKey::from("late"), low, |size| Ok(Slow { remaining: 0, size }), opts(Priority::Low));
        loader.cancel_all();
        assert_eq!(loader.tracked_states(), 1);
        loader.load_progressive(CacheKey::from("next"), low, |size| Ok(Slow { remaining: 0, size }), opts(Priority::Low));
        loader.pump(FrameBudget::unlimited());
        assert_eq!(loader.state(&CacheKey::from("late")), None);
    }

    #[tokio::test]
    async fn awaiting_a_taken_upgrade_resolves_abandoned() {
        let loader = loader();
        let mut p = loader.load_progressive(
            CacheKey::from("twice"),
            low,
            |size| Ok(Slow { remaining: 0, size }),
            opts(Priority::Medium),
        );
        loader.pump(FrameBudget::unlimited());
        assert!(p.upgrade.try_take().unwrap().is_ok());
        assert!(matches!(p.upgrade.await, Err(Error::Abandoned(_))));
    }

    #[tokio::test]
    async fn upgrade_can_be_awaited() {
        let loader = loader();
        let p = loader.load_progressive(
            CacheKey::from("await"),
            low,
            |size| Ok(Slow { remaining: 3, size }),
            opts(Priority::Medium),
        );
        loader.pump(FrameBudget::unlimited());
        let loaded = p.upgrade.await.unwrap();
        assert_eq!(loaded.tier, ResolutionTier::High);
        assert_eq!(loaded.resource.label, "slow");
    }
}
