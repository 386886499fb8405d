//! Shared test doubles

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pagemind_engine::{
    ChatTemplate, GenerationParams, Generator, InferenceEngine, ModelSpec, ProgressReporter,
    SamplingParams,
};
use tokio::sync::Notify;

use crate::bus::{NotificationBus, Subscription};
use crate::lifecycle::{ManagerConfig, ModelManager};

/// Engine whose generator answers `reply: <prompt>` and records every prompt.
#[derive(Default)]
pub(crate) struct ScriptedEngine {
    pub gate: Option<Arc<Notify>>,
    pub fail_load: bool,
    pub loads: AtomicU32,
    pub prompts: Arc<Mutex<Vec<(String, u32)>>>,
}

struct ScriptedGenerator {
    prompts: Arc<Mutex<Vec<(String, u32)>>>,
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> pagemind_engine::Result<String> {
        self.prompts
            .lock()
            .push((prompt.to_string(), params.max_new_tokens));
        Ok(format!("reply: {prompt}"))
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    async fn load(
        &self,
        _model: &ModelSpec,
        _progress: ProgressReporter,
    ) -> pagemind_engine::Result<Arc<dyn Generator>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_load {
            return Err(pagemind_engine::Error::Load("no such model".into()));
        }
        Ok(Arc::new(ScriptedGenerator {
            prompts: self.prompts.clone(),
        }))
    }
}

/// Manager over a plain-template test model, with no fallback
pub(crate) fn manager(engine: ScriptedEngine) -> (ModelManager, Arc<ScriptedEngine>) {
    let engine = Arc::new(engine);
    let config = ManagerConfig {
        model: ModelSpec {
            id: "test-model".into(),
            name: "Test Model".into(),
            template: ChatTemplate::Plain,
        },
        fallback: None,
        max_tokens_ceiling: 512,
        sampling: SamplingParams::default(),
    };
    let manager = ModelManager::new(config, engine.clone(), NotificationBus::new());
    (manager, engine)
}

/// Load the model and wait until it is ready
pub(crate) async fn ready_manager() -> (ModelManager, Arc<ScriptedEngine>) {
    let (manager, engine) = manager(ScriptedEngine::default());
    let mut sub = manager.subscribe();
    manager.request_load();
    wait_terminal(&mut sub).await;
    (manager, engine)
}

/// Wait for the next ready/error notification
pub(crate) async fn wait_terminal(sub: &mut Subscription) {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("timed out waiting for notification");
        match next {
            Some(n) if n.is_terminal() => return,
            Some(_) => continue,
            None => panic!("bus closed"),
        }
    }
}
