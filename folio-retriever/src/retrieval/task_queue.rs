use super::analyzer::Analyzer;
use super::loader::Document;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, error};

/// A document waiting to be indexed
#[derive(Debug, Clone)]
pub struct IndexingTask {
    pub document: Document,
    pub queued_at: Instant,
}

impl IndexingTask {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            queued_at: Instant::now(),
        }
    }

    /// Time spent waiting in the queue so far
    pub fn wait_time(&self) -> Duration {
        self.queued_at.elapsed()
    }
}

/// Configuration for the task queue
#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    /// Tasks buffered before `submit` starts waiting
    pub capacity: usize,
    /// Maximum number of files indexed at the same time
    pub max_workers: usize,
    /// Upper bound on the time spent indexing one file
    pub file_timeout: Duration,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 128,
            max_workers: 4,
            file_timeout: Duration::from_secs(300), // 5 minutes
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("task queue is closed")]
pub struct QueueClosed;

/// Sending half of the indexing queue. Clone it freely; the workers stop once
/// every clone has been dropped and the backlog is empty.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<IndexingTask>,
}

/// The running workers behind a [`TaskQueue`].
pub struct WorkerPool {
    handle: JoinHandle<()>,
}

impl TaskQueue {
    /// Create the queue and start its workers on the current runtime.
    pub fn start(config: TaskQueueConfig, analyzer: Arc<dyn Analyzer>) -> (TaskQueue, WorkerPool) {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let handle = tokio::spawn(run_workers(receiver, config, analyzer).in_current_span());
        (TaskQueue { sender }, WorkerPool { handle })
    }

    /// Enqueue a document, waiting for room if the queue is full
    pub async fn submit(&self, document: Document) -> Result<(), QueueClosed> {
        debug!("Queueing {}", document.path.display());
        self.sender
            .send(IndexingTask::new(document))
            .await
            .map_err(|_| QueueClosed)
    }

    /// Number of tasks currently buffered
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl WorkerPool {
    /// Wait until every queued and in-flight task has finished. Only returns
    /// after all [`TaskQueue`] handles are dropped.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!("Indexing workers stopped unexpectedly: {}", e);
        }
    }

    /// Stop the workers immediately, abandoning queued tasks
    pub fn abort(&self) {
        self.handle.abort();
    }
}

async fn run_workers(
    receiver: mpsc::Receiver<IndexingTask>,
    config: TaskQueueConfig,
    analyzer: Arc<dyn Analyzer>,
) {
    let file_timeout = config.file_timeout;
    ReceiverStream::new(receiver)
        .for_each_concurrent(config.max_workers.max(1), |task| {
            let analyzer = Arc::clone(&analyzer);
            async move { process_task(task, analyzer, file_timeout).await }
        })
        .await;
    debug!("Task queue closed, workers finished");
}

/// Each task runs on its own tokio task so a panic in one file cannot take the
/// pool down with it.
async fn process_task(task: IndexingTask, analyzer: Arc<dyn Analyzer>, file_timeout: Duration) {
    let path = task.document.path.clone();
    debug!(
        "Processing {} after {:?} in queue",
        path.display(),
        task.wait_time()
    );

    let handle = tokio::spawn(
        async move { tokio::time::timeout(file_timeout, analyzer.analyze(&task.document)).await }
            .in_current_span(),
    );

    match handle.await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("Failed to index {}: {:#}", path.display(), e),
        Ok(Err(_)) => error!(
            "Timed out indexing {} after {:?}",
            path.display(),
            file_timeout
        ),
        Err(e) if e.is_panic() => error!("Indexing {} panicked", path.display()),
        Err(e) => error!("Indexing {} was cancelled: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::analyzer::MockAnalyzer;
    use std::path::PathBuf;
    use tracing_test::traced_test;

    fn start_with(analyzer: MockAnalyzer, config: TaskQueueConfig) -> (TaskQueue, WorkerPool) {
        TaskQueue::start(config, Arc::new(analyzer))
    }

    #[tokio::test]
    async fn test_join_drains_every_task() {
        let analyzer = MockAnalyzer::new().with_delay(Duration::from_millis(5));
        let config = TaskQueueConfig {
            capacity: 4,
            max_workers: 3,
            ..TaskQueueConfig::default()
        };
        let (queue, pool) = start_with(analyzer.clone(), config);

        for i in 0..20 {
            queue
                .submit(Document::from_path(format!("file{i}.txt")))
                .await
                .unwrap();
        }
        drop(queue);
        pool.join().await;

        let mut calls = analyzer.recorded();
        calls.sort();
        let mut expected: Vec<PathBuf> = (0..20).map(|i| format!("file{i}.txt").into()).collect();
        expected.sort();
        assert_eq!(calls, expected);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_failures_are_logged_and_contained() {
        let analyzer = MockAnalyzer::new()
            .failing_on("bad.txt")
            .panicking_on("boom.txt");
        let (queue, pool) = start_with(analyzer.clone(), TaskQueueConfig::default());

        for name in ["bad.txt", "boom.txt", "good.txt"] {
            queue.submit(Document::from_path(name)).await.unwrap();
        }
        drop(queue);
        pool.join().await;

        let calls = analyzer.recorded();
        assert!(calls.contains(&PathBuf::from("good.txt")));
        assert!(calls.contains(&PathBuf::from("bad.txt")));
        assert!(logs_contain("Failed to index bad.txt"));
        assert!(logs_contain("Indexing boom.txt panicked"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_slow_files_time_out() {
        let analyzer = MockAnalyzer::new().with_delay(Duration::from_secs(5));
        let config = TaskQueueConfig {
            file_timeout: Duration::from_millis(20),
            ..TaskQueueConfig::default()
        };
        let (queue, pool) = start_with(analyzer.clone(), config);

        queue.submit(Document::from_path("slow.txt")).await.unwrap();
        drop(queue);
        pool.join().await;

        assert!(analyzer.recorded().is_empty());
        assert!(logs_contain("Timed out indexing slow.txt"));
    }

    #[tokio::test]
    async fn test_submit_waits_when_full() {
        let analyzer = MockAnalyzer::new().with_delay(Duration::from_secs(2));
        let config = TaskQueueConfig {
            capacity: 1,
            max_workers: 1,
            ..TaskQueueConfig::default()
        };
        let (queue, pool) = start_with(analyzer, config);

        // One file in flight, one buffered
        queue.submit(Document::from_path("a.txt")).await.unwrap();
        queue.submit(Document::from_path("b.txt")).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            queue.submit(Document::from_path("c.txt")),
        )
        .await;
        assert!(blocked.is_err(), "submit should wait for a free slot");
        assert_eq!(queue.pending(), 1);

        pool.abort();
    }

    #[tokio::test]
    async fn test_submit_after_workers_stop() {
        let (queue, pool) = start_with(MockAnalyzer::new(), TaskQueueConfig::default());
        pool.abort();
        pool.join().await;

        assert!(queue.is_closed());
        assert!(queue.submit(Document::from_path("late.txt")).await.is_err());
    }
}
