use std::time::Instant;

/// Decoded camera image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Raw pixel bytes (format depends on the detector)
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Capture sequence number within the camera's stream
    pub sequence: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            sequence,
        }
    }
}

/// Scheduling hint carried with each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// One admitted frame waiting for a worker. Owned by exactly one worker once
/// dequeued; dropping it releases the frame.
#[derive(Debug)]
pub(crate) struct FrameTask<F> {
    pub camera_id: String,
    pub frame: F,
    pub priority: Priority,
    /// Position in the camera's admission order
    pub ticket: u64,
    pub enqueued_at: Instant,
}
