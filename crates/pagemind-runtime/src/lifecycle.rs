//! Model lifecycle management
//!
//! [`ModelManager`] is the only owner of [`ModelState`]. It loads the model
//! at most once at a time, forwards engine progress as notifications, falls
//! back to a smaller model when the primary fails to load, and mediates every
//! generation call.

use std::sync::Arc;

use parking_lot::Mutex;
use pagemind_engine::{
    ChatTemplate, GenerationParams, Generator, InferenceEngine, LoadProgress, ModelSpec,
    ProgressReporter, SamplingParams, models,
};
use serde::{Deserialize, Serialize};

use crate::{
    bus::{NotificationBus, Subscription},
    error::{Error, Result},
    events::Notification,
    protocol::DEFAULT_MAX_TOKENS,
};

/// Stage of the model lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

/// Snapshot of the model lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelState {
    pub phase: Phase,
    /// Display name of the active (or about to be active) model
    pub model_name: String,
    /// Percent complete; only meaningful while loading, 100 once ready
    pub progress: u8,
    /// Set only when `phase` is `Failed`
    pub last_error: Option<String>,
}

impl ModelState {
    fn unloaded(model_name: &str) -> Self {
        Self {
            phase: Phase::Unloaded,
            model_name: model_name.to_string(),
            progress: 0,
            last_error: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }
}

/// Manager configuration
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Model to load
    pub model: ModelSpec,
    /// Smaller model tried once if `model` fails to load
    pub fallback: Option<ModelSpec>,
    /// Upper bound applied to every requested token budget
    pub max_tokens_ceiling: u32,
    /// Fixed sampling parameters
    pub sampling: SamplingParams,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            model: models::default_model(),
            fallback: Some(models::default_fallback()),
            max_tokens_ceiling: DEFAULT_MAX_TOKENS,
            sampling: SamplingParams::default(),
        }
    }
}

struct Active {
    spec: ModelSpec,
    generator: Arc<dyn Generator>,
}

struct Slot {
    state: ModelState,
    /// Bumped for every engine load (primary and fallback) so stale
    /// callbacks from an earlier load are ignored.
    load_seq: u64,
    active: Option<Active>,
}

struct Inner {
    config: ManagerConfig,
    engine: Arc<dyn InferenceEngine>,
    bus: NotificationBus,
    slot: Mutex<Slot>,
    /// Held from a state change until its notification is published, so
    /// listeners see transitions in the order they happened.
    transitions: Mutex<()>,
}

/// Owner of the inference engine's load state.
///
/// Cloning is cheap and every clone refers to the same manager.
#[derive(Clone)]
pub struct ModelManager {
    inner: Arc<Inner>,
}

impl ModelManager {
    /// Create a manager in the `Unloaded` phase
    pub fn new(config: ManagerConfig, engine: Arc<dyn InferenceEngine>, bus: NotificationBus) -> Self {
        let state = ModelState::unloaded(&config.model.name);
        Self {
            inner: Arc::new(Inner {
                config,
                engine,
                bus,
                slot: Mutex::new(Slot {
                    state,
                    load_seq: 0,
                    active: None,
                }),
                transitions: Mutex::new(()),
            }),
        }
    }

    /// Listen to lifecycle notifications
    pub fn subscribe(&self) -> Subscription {
        self.inner.bus.subscribe()
    }

    /// Current lifecycle snapshot
    pub fn status(&self) -> ModelState {
        self.inner.slot.lock().state.clone()
    }

    /// Start loading unless a load is in flight or the model is ready.
    ///
    /// Returns the state right after the call. The load itself runs on a
    /// spawned task, so this must be called within a Tokio runtime.
    pub fn request_load(&self) -> ModelState {
        let _order = self.inner.transitions.lock();
        let (seq, snapshot) = {
            let mut slot = self.inner.slot.lock();
            if matches!(slot.state.phase, Phase::Loading | Phase::Ready) {
                return slot.state.clone();
            }
            slot.load_seq += 1;
            slot.state = ModelState {
                phase: Phase::Loading,
                model_name: self.inner.config.model.name.clone(),
                progress: 0,
                last_error: None,
            };
            (slot.load_seq, slot.state.clone())
        };

        tracing::info!("Loading model {}", self.inner.config.model.id);
        self.inner.bus.publish(&Notification::ModelLoading);

        let manager = self.clone();
        tokio::spawn(async move { manager.run_load(seq).await });

        snapshot
    }

    async fn run_load(&self, seq: u64) {
        let primary = self.inner.config.model.clone();
        let primary_err = match self.load_model(&primary, seq).await {
            Ok(generator) => return self.finish_ready(seq, primary, generator),
            Err(e) => e,
        };

        let fallback = self
            .inner
            .config
            .fallback
            .clone()
            .filter(|f| f.id != primary.id);
        let Some(fallback) = fallback else {
            return self.finish_failed(seq, Error::load(primary_err));
        };
        // Another model on the same engine would fail the same way
        if primary_err.is_unreachable() {
            return self.finish_failed(seq, Error::load(primary_err));
        }

        tracing::warn!(
            "Loading {} failed ({}), falling back to {}",
            primary.id,
            primary_err,
            fallback.id
        );
        let Some(seq) = self.begin_fallback(seq, &fallback) else {
            return;
        };

        match self.load_model(&fallback, seq).await {
            Ok(generator) => self.finish_ready(seq, fallback, generator),
            Err(fallback_err) => self.finish_failed(
                seq,
                Error::LoadFailed(format!(
                    "{}: {}; fallback {}: {}",
                    primary.name, primary_err, fallback.name, fallback_err
                )),
            ),
        }
    }

    async fn load_model(
        &self,
        spec: &ModelSpec,
        seq: u64,
    ) -> pagemind_engine::Result<Arc<dyn Generator>> {
        let manager = self.clone();
        let reporter = ProgressReporter::new(move |p| manager.on_progress(seq, p));
        self.inner.engine.load(spec, reporter).await
    }

    fn on_progress(&self, seq: u64, report: LoadProgress) {
        let Some(percent) = report.percent() else {
            return;
        };
        let _order = self.inner.transitions.lock();
        let progress = {
            let mut slot = self.inner.slot.lock();
            if slot.load_seq != seq || slot.state.phase != Phase::Loading {
                return;
            }
            // Never move backwards within one load, even when the engine
            // restarts its count for another file.
            slot.state.progress = slot.state.progress.max(percent);
            slot.state.progress
        };
        self.inner
            .bus
            .publish(&Notification::DownloadProgress { progress });
    }

    /// Switch the in-flight load over to the fallback model. Returns the new sequence.
    fn begin_fallback(&self, seq: u64, fallback: &ModelSpec) -> Option<u64> {
        let _order = self.inner.transitions.lock();
        let next = {
            let mut slot = self.inner.slot.lock();
            if slot.load_seq != seq {
                return None;
            }
            slot.load_seq += 1;
            slot.state.model_name = fallback.name.clone();
            slot.state.progress = 0;
            slot.load_seq
        };
        self.inner.bus.publish(&Notification::ModelLoading);
        Some(next)
    }

    fn finish_ready(&self, seq: u64, spec: ModelSpec, generator: Arc<dyn Generator>) {
        let model_name = spec.name.clone();
        let _order = self.inner.transitions.lock();
        {
            let mut slot = self.inner.slot.lock();
            if slot.load_seq != seq {
                return;
            }
            slot.state = ModelState {
                phase: Phase::Ready,
                model_name: model_name.clone(),
                progress: 100,
                last_error: None,
            };
            slot.active = Some(Active { spec, generator });
        }
        tracing::info!("Model {} ready", model_name);
        self.inner
            .bus
            .publish(&Notification::ModelReady { model_name });
    }

    fn finish_failed(&self, seq: u64, error: Error) {
        let message = error.to_string();
        let _order = self.inner.transitions.lock();
        {
            let mut slot = self.inner.slot.lock();
            if slot.load_seq != seq {
                return;
            }
            slot.state.phase = Phase::Failed;
            slot.state.progress = 0;
            slot.state.last_error = Some(message.clone());
        }
        tracing::error!("{}", message);
        self.inner
            .bus
            .publish(&Notification::ModelError { error: message });
    }

    /// Token budget actually sent to the engine
    pub fn clamp_tokens(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(DEFAULT_MAX_TOKENS)
            .min(self.inner.config.max_tokens_ceiling)
            .max(1)
    }

    /// Generate a reply to `prompt` with the active model.
    ///
    /// Fails with [`Error::NotReady`] without touching the engine unless the
    /// model is ready. Concurrent calls are dispatched independently.
    pub async fn generate(&self, prompt: &str, max_tokens: Option<u32>) -> Result<String> {
        let (spec, generator) = {
            let slot = self.inner.slot.lock();
            match (&slot.state.phase, &slot.active) {
                (Phase::Ready, Some(active)) => (active.spec.clone(), active.generator.clone()),
                _ => return Err(Error::NotReady),
            }
        };

        let formatted = spec.template.format(prompt);
        let params = GenerationParams {
            max_new_tokens: self.clamp_tokens(max_tokens),
            sampling: self.inner.config.sampling,
        };
        tracing::debug!(
            "Generating with {} ({} prompt chars, {} max tokens)",
            spec.id,
            formatted.len(),
            params.max_new_tokens
        );

        let raw = generator
            .generate(&formatted, &params)
            .await
            .map_err(Error::generation)?;
        Ok(clean_output(&raw, &formatted, spec.template))
    }
}

/// Strip an echoed prompt and any trailing special tokens from engine output.
pub fn clean_output(raw: &str, formatted_prompt: &str, template: ChatTemplate) -> String {
    let mut text = raw.strip_prefix(formatted_prompt).unwrap_or(raw);
    for marker in template.stop_markers() {
        if let Some(pos) = text.find(marker) {
            text = &text[..pos];
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Generator that records prompts and replies with a canned answer.
    ///
    /// Prompts mentioning "slow" take longer to answer.
    struct MockGenerator {
        calls: Arc<AtomicU32>,
        prompts: Arc<Mutex<Vec<(String, GenerationParams)>>>,
        finished: Arc<Mutex<Vec<String>>>,
        reply: String,
        fail: bool,
    }

    #[async_trait]
    impl Generator for MockGenerator {
        async fn generate(
            &self,
            prompt: &str,
            params: &GenerationParams,
        ) -> pagemind_engine::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().push((prompt.to_string(), *params));
            if self.fail {
                return Err(pagemind_engine::Error::Generation("out of memory".into()));
            }
            if prompt.contains("slow") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.finished.lock().push(prompt.to_string());
            Ok(format!("{}{}", self.reply, prompt.len()))
        }
    }

    #[derive(Default)]
    struct MockEngine {
        load_calls: AtomicU32,
        loaded_ids: Mutex<Vec<String>>,
        failing_ids: HashSet<String>,
        unreachable: bool,
        progress: Vec<LoadProgress>,
        gate: Option<Arc<Notify>>,
        generate_calls: Arc<AtomicU32>,
        prompts: Arc<Mutex<Vec<(String, GenerationParams)>>>,
        finished: Arc<Mutex<Vec<String>>>,
        reply: String,
        fail_generation: bool,
    }

    /// A real connection failure: nothing listens on port 1.
    async fn connect_error() -> pagemind_engine::Error {
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:1/")
            .send()
            .await
            .unwrap_err();
        pagemind_engine::Error::Http(err)
    }

    #[async_trait]
    impl InferenceEngine for MockEngine {
        async fn load(
            &self,
            model: &ModelSpec,
            progress: ProgressReporter,
        ) -> pagemind_engine::Result<Arc<dyn Generator>> {
            self.load_calls.fetch_add(1, Ordering::SeqCst);
            self.loaded_ids.lock().push(model.id.clone());
            for p in &self.progress {
                progress.report(*p);
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.unreachable {
                return Err(connect_error().await);
            }
            if self.failing_ids.contains(&model.id) {
                return Err(pagemind_engine::Error::Load(format!("{} unavailable", model.id)));
            }
            Ok(Arc::new(MockGenerator {
                calls: self.generate_calls.clone(),
                prompts: self.prompts.clone(),
                finished: self.finished.clone(),
                reply: self.reply.clone(),
                fail: self.fail_generation,
            }))
        }
    }

    fn spec(id: &str, template: ChatTemplate) -> ModelSpec {
        ModelSpec {
            id: id.into(),
            name: format!("{id}-name"),
            template,
        }
    }

    fn config(fallback: bool) -> ManagerConfig {
        ManagerConfig {
            model: spec("primary", ChatTemplate::Zephyr),
            fallback: fallback.then(|| spec("small", ChatTemplate::ChatMl)),
            max_tokens_ceiling: 256,
            sampling: SamplingParams::default(),
        }
    }

    fn make_manager(config: ManagerConfig, engine: MockEngine) -> (ModelManager, Arc<MockEngine>) {
        let engine = Arc::new(engine);
        let manager = ModelManager::new(config, engine.clone(), NotificationBus::new());
        (manager, engine)
    }

    /// Collect notifications until a terminal one arrives.
    async fn until_terminal(sub: &mut Subscription) -> Vec<Notification> {
        let mut seen = Vec::new();
        loop {
            let n = tokio::time::timeout(Duration::from_secs(5), sub.recv())
                .await
                .expect("timed out waiting for notification")
                .expect("bus closed");
            let done = n.is_terminal();
            seen.push(n);
            if done {
                return seen;
            }
        }
    }

    #[tokio::test]
    async fn test_fresh_manager_is_unloaded() {
        let (manager, _) = make_manager(config(false), MockEngine::default());
        let status = manager.status();
        assert_eq!(status.phase, Phase::Unloaded);
        assert!(!status.is_loading());
        assert!(!status.is_ready());
        assert_eq!(status.model_name, "primary-name");
    }

    #[tokio::test]
    async fn test_single_flight_load() {
        let gate = Arc::new(Notify::new());
        let (manager, engine) = make_manager(
            config(false),
            MockEngine {
                gate: Some(gate.clone()),
                ..Default::default()
            },
        );
        let mut sub = manager.subscribe();

        for _ in 0..5 {
            let state = manager.request_load();
            assert_eq!(state.phase, Phase::Loading);
        }
        tokio::task::yield_now().await;
        assert!(manager.status().is_loading());

        gate.notify_one();
        let events = until_terminal(&mut sub).await;
        assert_eq!(events.first(), Some(&Notification::ModelLoading));
        assert_eq!(
            events.last(),
            Some(&Notification::ModelReady {
                model_name: "primary-name".into()
            })
        );

        // Ready is sticky: further requests are no-ops
        assert!(manager.request_load().is_ready());
        assert_eq!(engine.load_calls.load(Ordering::SeqCst), 1);

        let status = manager.status();
        assert_eq!(status.progress, 100);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_forwarded_every_time() {
        let (manager, _) = make_manager(
            config(false),
            MockEngine {
                progress: vec![
                    LoadProgress::Fraction(0.1),
                    LoadProgress::Fraction(0.5),
                    LoadProgress::Bytes {
                        loaded: 3,
                        total: 10,
                    },
                    LoadProgress::Bytes { loaded: 0, total: 0 },
                    LoadProgress::Fraction(0.8),
                ],
                ..Default::default()
            },
        );
        let mut sub = manager.subscribe();
        manager.request_load();
        let events = until_terminal(&mut sub).await;

        let progress: Vec<u8> = events
            .iter()
            .filter_map(|n| match n {
                Notification::DownloadProgress { progress } => Some(*progress),
                _ => None,
            })
            .collect();
        // The 30% report is clamped; the unknown-total report carries no percent
        assert_eq!(progress, vec![10, 50, 50, 80]);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_failure_then_rearm_resets_progress() {
        let mut failing = HashSet::new();
        failing.insert("primary".to_string());
        let (manager, engine) = make_manager(
            config(false),
            MockEngine {
                failing_ids: failing,
                progress: vec![LoadProgress::Fraction(0.6)],
                ..Default::default()
            },
        );
        let mut sub = manager.subscribe();

        manager.request_load();
        let events = until_terminal(&mut sub).await;
        assert!(matches!(events.last(), Some(Notification::ModelError { error }) if error.contains("primary unavailable")));

        let failed = manager.status();
        assert_eq!(failed.phase, Phase::Failed);
        assert_eq!(failed.progress, 0);
        assert!(failed.last_error.as_deref().unwrap().starts_with("Model loading failed"));

        // Failed re-arms
        let again = manager.request_load();
        assert_eq!(again.phase, Phase::Loading);
        assert_eq!(again.progress, 0);
        assert_eq!(again.last_error, None);
        until_terminal(&mut sub).await;
        assert_eq!(engine.load_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fallback_success() {
        let mut failing = HashSet::new();
        failing.insert("primary".to_string());
        let (manager, engine) = make_manager(
            config(true),
            MockEngine {
                failing_ids: failing,
                ..Default::default()
            },
        );
        let mut sub = manager.subscribe();
        manager.request_load();
        let events = until_terminal(&mut sub).await;

        assert_eq!(
            events,
            vec![
                Notification::ModelLoading,
                Notification::ModelLoading,
                Notification::ModelReady {
                    model_name: "small-name".into()
                },
            ]
        );
        assert_eq!(*engine.loaded_ids.lock(), vec!["primary", "small"]);
        let status = manager.status();
        assert!(status.is_ready());
        assert_eq!(status.model_name, "small-name");
    }

    #[tokio::test]
    async fn test_fallback_failure_reports_both() {
        let failing: HashSet<String> = ["primary", "small"].iter().map(|s| s.to_string()).collect();
        let (manager, engine) = make_manager(
            config(true),
            MockEngine {
                failing_ids: failing,
                ..Default::default()
            },
        );
        let mut sub = manager.subscribe();
        manager.request_load();
        until_terminal(&mut sub).await;

        let status = manager.status();
        assert_eq!(status.phase, Phase::Failed);
        let err = status.last_error.unwrap();
        assert!(err.contains("primary unavailable"));
        assert!(err.contains("small unavailable"));
        assert_eq!(engine.load_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_generate_before_ready_never_calls_engine() {
        let (manager, engine) = make_manager(config(false), MockEngine::default());
        let err = manager.generate("hi", None).await.unwrap_err();
        assert_eq!(err, Error::NotReady);
        assert_eq!(engine.load_calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generate_while_loading_is_not_ready() {
        let gate = Arc::new(Notify::new());
        let (manager, engine) = make_manager(
            config(false),
            MockEngine {
                gate: Some(gate.clone()),
                ..Default::default()
            },
        );
        manager.request_load();
        assert_eq!(manager.generate("hi", None).await, Err(Error::NotReady));
        assert_eq!(engine.generate_calls.load(Ordering::SeqCst), 0);
        gate.notify_one();
    }

    #[tokio::test]
    async fn test_generate_formats_and_clamps() {
        let (manager, engine) = make_manager(
            config(false),
            MockEngine {
                reply: "len=".into(),
                ..Default::default()
            },
        );
        let mut sub = manager.subscribe();
        manager.request_load();
        until_terminal(&mut sub).await;

        let out = manager.generate("hello", Some(4096)).await.unwrap();
        let expected_prompt = ChatTemplate::Zephyr.format("hello");
        assert_eq!(out, format!("len={}", expected_prompt.len()));

        let prompts = engine.prompts.lock();
        let (prompt, params) = &prompts[0];
        assert_eq!(prompt, &expected_prompt);
        assert_eq!(params.max_new_tokens, 256);
        assert_eq!(params.sampling, SamplingParams::default());
    }

    #[tokio::test]
    async fn test_clamp_tokens() {
        let (manager, _) = make_manager(config(false), MockEngine::default());
        assert_eq!(manager.clamp_tokens(None), 256);
        assert_eq!(manager.clamp_tokens(Some(100)), 100);
        assert_eq!(manager.clamp_tokens(Some(0)), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_propagates_message() {
        let (manager, _) = make_manager(
            config(false),
            MockEngine {
                fail_generation: true,
                ..Default::default()
            },
        );
        let mut sub = manager.subscribe();
        manager.request_load();
        until_terminal(&mut sub).await;

        let err = manager.generate("x", None).await.unwrap_err();
        assert_eq!(err, Error::GenerationFailed("out of memory".into()));
        // A failed generation leaves the model ready
        assert!(manager.status().is_ready());
    }

    #[tokio::test]
    async fn test_concurrent_generate_out_of_order() {
        let (manager, engine) = make_manager(
            config(false),
            MockEngine {
                reply: "r".into(),
                ..Default::default()
            },
        );
        let mut sub = manager.subscribe();
        manager.request_load();
        until_terminal(&mut sub).await;
        let before = manager.status();

        let slow = ChatTemplate::Zephyr.format("slow one");
        let fast = ChatTemplate::Zephyr.format("fast one");
        let (slow_out, fast_out) = tokio::join!(
            manager.generate("slow one", None),
            manager.generate("fast one", None)
        );

        // Issued slow then fast, finished fast then slow
        let issued: Vec<String> = engine.prompts.lock().iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(issued, vec![slow.clone(), fast.clone()]);
        assert_eq!(*engine.finished.lock(), vec![fast.clone(), slow.clone()]);

        // Each caller still gets its own reply
        assert_eq!(slow_out.unwrap(), format!("r{}", slow.len()));
        assert_eq!(fast_out.unwrap(), format!("r{}", fast.len()));
        assert_eq!(engine.generate_calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.status(), before);
    }

    #[tokio::test]
    async fn test_unreachable_engine_skips_fallback() {
        let (manager, engine) = make_manager(
            config(true),
            MockEngine {
                unreachable: true,
                ..Default::default()
            },
        );
        let mut sub = manager.subscribe();
        manager.request_load();
        let events = until_terminal(&mut sub).await;

        assert_eq!(events.first(), Some(&Notification::ModelLoading));
        assert!(matches!(events.last(), Some(Notification::ModelError { .. })));
        assert_eq!(*engine.loaded_ids.lock(), vec!["primary"]);
        assert_eq!(manager.status().phase, Phase::Failed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rearm_races_keep_notifications_in_order() {
        let mut failing = HashSet::new();
        failing.insert("primary".to_string());
        let (manager, engine) = make_manager(
            config(false),
            MockEngine {
                failing_ids: failing,
                ..Default::default()
            },
        );
        let mut sub = manager.subscribe();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    manager.request_load();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // Wait for the last load to fail and its notification to go out
        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.status().phase != Phase::Failed {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("last load never finished");
        drop(manager.inner.transitions.lock());

        let mut seen = Vec::new();
        while let Some(n) = sub.try_recv() {
            seen.push(n);
        }
        assert!(matches!(seen.last(), Some(Notification::ModelError { .. })));

        // Every load is announced, then ends, before the next one starts
        let mut loading = false;
        for n in &seen {
            match n {
                Notification::ModelLoading => {
                    assert!(!loading, "load started twice: {seen:?}");
                    loading = true;
                }
                Notification::ModelError { .. } => {
                    assert!(loading, "error without a load: {seen:?}");
                    loading = false;
                }
                other => panic!("unexpected notification {other:?}"),
            }
        }
        let loads = seen.iter().filter(|n| **n == Notification::ModelLoading).count();
        assert_eq!(loads as u32, engine.load_calls.load(Ordering::SeqCst));
    }

    #[test]
    fn test_clean_output_strips_echo_and_markers() {
        let formatted = ChatTemplate::Zephyr.format("q");
        let raw = format!("{formatted}  answer here<|endoftext|>junk");
        assert_eq!(
            clean_output(&raw, &formatted, ChatTemplate::Zephyr),
            "answer here"
        );
        assert_eq!(
            clean_output(" plain \n", "unrelated", ChatTemplate::Plain),
            "plain"
        );
    }
}
