use std::time::SystemTime;

/// Frame and session counters for the capture controller
#[derive(Debug, Clone, Default)]
pub struct CaptureStats {
    pub frames_received: u64,
    pub frames_converted: u64,
    pub frames_malformed: u64,
    /// Frames that arrived after their session ended
    pub frames_discarded: u64,
    pub sessions_opened: u64,
    pub sessions_released: u64,
    pub last_frame_time: Option<SystemTime>,
}

impl CaptureStats {
    pub fn record_frame_received(&mut self) {
        self.frames_received += 1;
    }

    pub fn record_frame_converted(&mut self) {
        self.frames_converted += 1;
        self.last_frame_time = Some(SystemTime::now());
    }

    pub fn record_malformed_frame(&mut self) {
        self.frames_malformed += 1;
    }

    pub fn record_discarded_frame(&mut self) {
        self.frames_discarded += 1;
    }

    pub fn record_session_opened(&mut self) {
        self.sessions_opened += 1;
    }

    pub fn record_session_released(&mut self) {
        self.sessions_released += 1;
    }

    pub fn conversion_success_rate(&self) -> f64 {
        if self.frames_received == 0 {
            0.0
        } else {
            self.frames_converted as f64 / self.frames_received as f64
        }
    }
}
