//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` / atomics for interior mutability,
//! allowing test assertions on recorded calls.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use crate::error::AppError;
use crate::progress::{ProgressObserver, ProgressSnapshot};
use crate::task::TaskResult;
use crate::traits::{Extractor, Resource, ResourceFactory};

// ---------------------------------------------------------------------------
// MockResource
// ---------------------------------------------------------------------------

/// Mock resource whose health and closed state are externally observable.
pub struct MockResource {
    id: Uuid,
    healthy: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl Resource for MockResource {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn close(self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockResourceFactory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FactoryState {
    /// Scripted creation outcomes, consumed front to back. When empty,
    /// creation succeeds (unless `fail_all` is set).
    script: Mutex<VecDeque<Result<(), AppError>>>,
    fail_all: AtomicBool,
    created: AtomicUsize,
    closed_flags: Mutex<Vec<Arc<AtomicBool>>>,
}

/// Mock factory producing [`MockResource`]s.
///
/// Every resource it builds shares one health flag, so tests can flip
/// all outstanding resources to unhealthy with [`set_healthy`].
///
/// [`set_healthy`]: MockResourceFactory::set_healthy
#[derive(Clone)]
pub struct MockResourceFactory {
    state: Arc<FactoryState>,
    healthy: Arc<AtomicBool>,
}

impl MockResourceFactory {
    /// Factory whose creations always succeed and stay healthy.
    pub fn healthy() -> Self {
        Self {
            state: Arc::new(FactoryState::default()),
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Factory with scripted creation outcomes; succeeds once the script
    /// is exhausted.
    pub fn with_script(outcomes: Vec<Result<(), AppError>>) -> Self {
        let factory = Self::healthy();
        *factory.state.script.lock().unwrap() = outcomes.into();
        factory
    }

    /// Factory for which every creation attempt fails.
    pub fn always_failing() -> Self {
        let factory = Self::healthy();
        factory.state.fail_all.store(true, Ordering::SeqCst);
        factory
    }

    /// Flip the health flag shared by all resources built so far.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Make all further creation attempts fail.
    pub fn fail_further_creations(&self) {
        self.state.fail_all.store(true, Ordering::SeqCst);
    }

    pub fn created_count(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    /// Number of resources built by this factory that have been closed.
    pub fn closed_count(&self) -> usize {
        self.state
            .closed_flags
            .lock()
            .unwrap()
            .iter()
            .filter(|flag| flag.load(Ordering::SeqCst))
            .count()
    }
}

impl ResourceFactory for MockResourceFactory {
    type Resource = MockResource;

    async fn create(&self) -> Result<MockResource, AppError> {
        if self.state.fail_all.load(Ordering::SeqCst) {
            return Err(AppError::ResourceCreation(
                "mock factory configured to fail".into(),
            ));
        }
        if let Some(outcome) = self.state.script.lock().unwrap().pop_front() {
            outcome?;
        }

        let closed = Arc::new(AtomicBool::new(false));
        self.state.closed_flags.lock().unwrap().push(closed.clone());
        self.state.created.fetch_add(1, Ordering::SeqCst);

        Ok(MockResource {
            id: Uuid::new_v4(),
            healthy: Arc::clone(&self.healthy),
            closed,
        })
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ExtractorState {
    /// Per-target scripted outcomes. A target with no script (or an
    /// exhausted one) succeeds with a default payload.
    scripts: Mutex<HashMap<String, VecDeque<Result<serde_json::Value, AppError>>>>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Mock extractor with per-target scripted outcomes and call recording.
///
/// Tracks peak concurrent invocations, which equals peak concurrent
/// resource checkouts since extraction always holds a resource.
#[derive(Clone, Default)]
pub struct MockExtractor {
    state: Arc<ExtractorState>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcomes for one target, consumed front to back.
    pub fn script_target(
        &self,
        target: &str,
        outcomes: Vec<Result<serde_json::Value, AppError>>,
    ) {
        self.state
            .scripts
            .lock()
            .unwrap()
            .insert(target.to_string(), outcomes.into());
    }

    /// Make every extraction take this long (simulates slow pages).
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = delay;
    }

    /// Targets passed to `extract`, in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Number of `extract` invocations for one target.
    pub fn calls_for(&self, target: &str) -> usize {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.as_str() == target)
            .count()
    }

    /// Highest number of concurrently running extractions observed.
    pub fn peak_concurrency(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }
}

impl<R: Resource> Extractor<R> for MockExtractor {
    async fn extract(&self, _resource: &R, target: &str) -> Result<serde_json::Value, AppError> {
        self.state.calls.lock().unwrap().push(target.to_string());

        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak.fetch_max(now, Ordering::SeqCst);

        let delay = *self.state.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .state
            .scripts
            .lock()
            .unwrap()
            .get_mut(target)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(serde_json::json!({ "target": target })));

        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

// ---------------------------------------------------------------------------
// RecordingObserver
// ---------------------------------------------------------------------------

/// Observer that records every notification it receives.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(ProgressSnapshot, Option<TaskResult>)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(ProgressSnapshot, Option<TaskResult>)> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_task(&self, snapshot: &ProgressSnapshot, result: Option<&TaskResult>) {
        self.events
            .lock()
            .unwrap()
            .push((*snapshot, result.cloned()));
    }
}
