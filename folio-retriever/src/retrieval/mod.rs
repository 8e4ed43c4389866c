pub mod analyzer;
pub mod directory_watcher;
pub mod indexing_mode;
pub mod loader;
pub mod pipeline;
pub mod retriever;
pub mod task_queue;
pub mod vector_index;
