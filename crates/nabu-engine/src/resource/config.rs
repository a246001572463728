use crate::error::{Result, StreamError};
use crate::stream::DEFAULT_PAGE_SIZE;

/// How resource creation and destruction synchronize with the GPU.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum UploadMode {
    /// Submit and wait for the GPU after every upload and before every
    /// destroy. Simple and always safe; stalls the CPU.
    Blocking,
    /// Uploads ride along with the next submission and destroys are parked
    /// until the GPU has retired every command that could reference them.
    #[default]
    Deferred,
}

impl UploadMode {
    /// Parses `"blocking"` / `"deferred"`, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocking" => Some(UploadMode::Blocking),
            "deferred" => Some(UploadMode::Deferred),
            _ => None,
        }
    }
}

/// Sizing and policy for a [`StreamContext`](super::StreamContext).
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Default upload page size in bytes. Larger requests get a dedicated page.
    pub page_size: u64,

    /// Hard ceiling on bytes reserved by upload pages. `None` grows freely.
    pub max_stream_bytes: Option<u64>,

    /// Entries in the GPU-visible descriptor ring.
    pub ring_capacity: u32,

    /// Binding slots in the CPU-side staging table.
    pub staging_slots: u32,

    /// Frames the CPU may run ahead of the GPU before `present` blocks.
    pub frames_in_flight: u32,

    pub upload_mode: UploadMode,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_stream_bytes: None,
            ring_capacity: 5000,
            staging_slots: 16,
            frames_in_flight: 2,
            upload_mode: UploadMode::default(),
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size % 4 != 0 {
            return Err(StreamError::InvalidConfig("page size must be a non-zero multiple of 4"));
        }
        if self.staging_slots == 0 || self.staging_slots > self.ring_capacity {
            return Err(StreamError::InvalidConfig(
                "staging slots must be between 1 and the ring capacity",
            ));
        }
        if self.frames_in_flight == 0 {
            return Err(StreamError::InvalidConfig("at least one frame must be allowed in flight"));
        }
        if self.max_stream_bytes.is_some_and(|max| max < self.page_size) {
            return Err(StreamError::InvalidConfig("stream ceiling is smaller than one page"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        StreamConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_sizes() {
        let bad = [
            StreamConfig { page_size: 0, ..Default::default() },
            StreamConfig { page_size: 1022, ..Default::default() },
            StreamConfig { staging_slots: 0, ..Default::default() },
            StreamConfig { ring_capacity: 8, staging_slots: 9, ..Default::default() },
            StreamConfig { frames_in_flight: 0, ..Default::default() },
            StreamConfig { max_stream_bytes: Some(1024), ..Default::default() },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(StreamError::InvalidConfig(_))), "{config:?}");
        }
    }

    #[test]
    fn parses_modes() {
        assert_eq!(UploadMode::parse("Blocking"), Some(UploadMode::Blocking));
        assert_eq!(UploadMode::parse(" deferred "), Some(UploadMode::Deferred));
        assert_eq!(UploadMode::parse("lazy"), None);
    }
}
