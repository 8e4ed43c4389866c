use axum::{Json, Router, extract::State, routing::post};
use folio_retriever::config::AppConfig;
use folio_retriever::retrieval::indexing_mode::IndexingMode;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type Prompts = Arc<Mutex<Vec<String>>>;

/// Ollama stand-in that answers every prompt with a fixed reply.
async fn completion_stub(reply: &'static str) -> (SocketAddr, Prompts) {
    let prompts = Prompts::default();
    let router = Router::new()
        .route(
            "/api/generate",
            post(move |State(seen): State<Prompts>, Json(body): Json<Value>| async move {
                assert_eq!(body["stream"], false);
                seen.lock()
                    .unwrap()
                    .push(body["prompt"].as_str().unwrap_or_default().to_string());
                Json(json!({"response": reply, "done": true}))
            }),
        )
        .with_state(prompts.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    (addr, prompts)
}

fn config_in(root: &Path, completion: SocketAddr) -> AppConfig {
    let mut config = AppConfig::default();
    config.index.index_dir = root.join("index");
    config.index.embedding_model = "hashing".to_string();
    config.watcher.watch_dir = root.join("documents");
    config.watcher.settle_delay_ms = 100;
    config.completion.base_url = format!("http://{completion}");
    config.completion.timeout_secs = 5;
    config
}

struct RunningServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl RunningServer {
    async fn start(config: AppConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(folio_server::serve(config, listener, async move {
            let _ = stopped.await;
        }));
        Self { addr, stop, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn wait_for_chunks(&self, client: &reqwest::Client, at_least: u64) {
        for _ in 0..100 {
            if let Ok(response) = client.get(self.url("/health")).send().await {
                if let Ok(body) = response.json::<Value>().await {
                    if body["chunks"].as_u64().unwrap_or(0) >= at_least {
                        return;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("index never reached {at_least} chunks");
    }

    async fn stop(self) -> anyhow::Result<()> {
        let _ = self.stop.send(());
        self.handle.await?
    }
}

#[tokio::test]
async fn test_ask_answers_from_indexed_documents() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (completion, prompts) = completion_stub("Paris.").await;
    let mut config = config_in(temp_dir.path(), completion);
    config.watcher.mode = IndexingMode::FullReindex;

    let documents = temp_dir.path().join("documents");
    std::fs::create_dir_all(&documents).unwrap();
    std::fs::write(documents.join("france.txt"), "The capital of France is Paris.").unwrap();
    std::fs::write(documents.join("ignored.docx"), "not a supported document").unwrap();

    let server = RunningServer::start(config).await;
    let client = reqwest::Client::new();
    server.wait_for_chunks(&client, 1).await;

    // Dropped in after startup, picked up by the watcher.
    std::fs::write(
        documents.join("bread.txt"),
        "Bread needs flour, water, salt and yeast.",
    )
    .unwrap();
    server.wait_for_chunks(&client, 2).await;

    let response = client
        .post(server.url("/ask"))
        .json(&json!({"question": "What is the capital of France?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({"answer": "Paris."}));

    {
        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("The capital of France is Paris."));
        assert!(prompts[0].contains("Question: What is the capital of France?"));
    }

    let response = client
        .post(server.url("/retrieve"))
        .json(&json!({"question": "What is the capital of France?", "k": 1}))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["chunks"][0]["text"], "The capital of France is Paris.");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_completion_service_is_500() {
    let temp_dir = tempfile::tempdir().unwrap();
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let mut config = config_in(temp_dir.path(), closed);
    config.watcher.mode = IndexingMode::ReadOnly;

    let server = RunningServer::start(config).await;
    let client = reqwest::Client::new();
    server.wait_for_chunks(&client, 0).await;

    let response = client
        .post(server.url("/ask"))
        .json(&json!({"question": "Is anyone there?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Completion service call failed:"), "{detail}");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_read_only_server_answers_with_empty_context() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (completion, prompts) = completion_stub("I don't know.").await;
    let mut config = config_in(temp_dir.path(), completion);
    config.watcher.mode = IndexingMode::ReadOnly;

    let server = RunningServer::start(config).await;
    let client = reqwest::Client::new();
    server.wait_for_chunks(&client, 0).await;

    let response = client
        .post(server.url("/ask"))
        .json(&json!({"question": "What is in the folder?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"answer": "I don't know.", "warnings": ["empty_context"]})
    );
    assert_eq!(prompts.lock().unwrap().len(), 1);
    assert!(!temp_dir.path().join("documents").exists());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_startup_fails_for_unknown_embedding_model() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (completion, _) = completion_stub("unused").await;
    let mut config = config_in(temp_dir.path(), completion);
    config.index.embedding_model = "no-such-model".to_string();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let err = folio_server::serve(config, listener, std::future::pending())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("no-such-model"), "{err:#}");
}
