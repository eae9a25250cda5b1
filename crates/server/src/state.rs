//! Shared application state
//!
//! The engine slot starts empty so the socket can bind and answer probes
//! while the model loads; readiness flips once the engine is installed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use whisper_adapter_config::Config;
use whisper_adapter_engine::Engine;

use crate::telemetry::Recorder;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    recorder: Arc<Recorder>,
    engine: RwLock<Option<Arc<dyn Engine>>>,
    serving: AtomicBool,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                recorder: Arc::new(Recorder::new()),
                engine: RwLock::new(None),
                serving: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn recorder(&self) -> Arc<Recorder> {
        self.inner.recorder.clone()
    }

    pub fn engine(&self) -> Option<Arc<dyn Engine>> {
        self.inner.engine.read().clone()
    }

    pub fn set_engine(&self, engine: Arc<dyn Engine>) {
        *self.inner.engine.write() = Some(engine);
    }

    pub fn is_serving(&self) -> bool {
        self.inner.serving.load(Ordering::Relaxed)
    }

    pub fn set_serving(&self, serving: bool) {
        self.inner.serving.store(serving, Ordering::Relaxed);
    }
}
