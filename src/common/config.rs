use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub page_size: usize,
    pub buffer_pool_size: usize,
    pub lock_timeout_min_ms: u64,
    pub lock_timeout_max_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            buffer_pool_size: 50,
            lock_timeout_min_ms: 50,
            lock_timeout_max_ms: 250,
        }
    }
}

impl DatabaseConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_buffer_pool_size(mut self, pages: usize) -> Self {
        self.buffer_pool_size = pages;
        self
    }

    pub fn with_lock_timeout(mut self, min: Duration, max: Duration) -> Self {
        self.lock_timeout_min_ms = min.as_millis() as u64;
        self.lock_timeout_max_ms = (max.as_millis() as u64).max(self.lock_timeout_min_ms);
        self
    }
}
