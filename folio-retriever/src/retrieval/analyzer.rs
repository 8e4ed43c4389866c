use super::loader::Document;
use anyhow::Result;
use async_trait::async_trait;
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

/// Whatever consumes detected documents. Workers call it once per task and log
/// any error it returns; an error never stops the worker.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, document: &Document) -> Result<()>;
}

#[async_trait]
impl<A: Analyzer + ?Sized> Analyzer for Arc<A> {
    async fn analyze(&self, document: &Document) -> Result<()> {
        (**self).analyze(document).await
    }
}

/// A mock analyzer for testing.
/// It records every path passed to `analyze` and can be told to fail, stall
/// or panic on particular file names.
#[derive(Clone, Default)]
pub struct MockAnalyzer {
    pub calls: Arc<Mutex<Vec<PathBuf>>>,
    fail_on: Vec<String>,
    panic_on: Vec<String>,
    delay: Option<Duration>,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return an error for documents whose file name equals `name`
    pub fn failing_on(mut self, name: &str) -> Self {
        self.fail_on.push(name.to_string());
        self
    }

    /// Panic for documents whose file name equals `name`
    pub fn panicking_on(mut self, name: &str) -> Self {
        self.panic_on.push(name.to_string());
        self
    }

    /// Sleep before recording each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn recorded(&self) -> Vec<PathBuf> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(&self, document: &Document) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let name = document
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.panic_on.contains(&name) {
            panic!("mock analyzer panicked on {name}");
        }

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(document.path.clone());
        }

        if self.fail_on.contains(&name) {
            anyhow::bail!("mock analyzer failed on {name}");
        }
        Ok(())
    }
}
