//! Local backend configuration.

/// Settings for the background thread used by `execute_async`.
#[derive(Debug, Clone)]
pub struct LocalJobConfig {
    /// Name given to the worker thread (shows up in logs and panics).
    pub thread_name: String,
    /// Stack size for the worker thread; platform default when `None`.
    pub stack_size: Option<usize>,
}

impl Default for LocalJobConfig {
    fn default() -> Self {
        Self {
            thread_name: "jobkit-local".to_string(),
            stack_size: None,
        }
    }
}

impl LocalJobConfig {
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}
