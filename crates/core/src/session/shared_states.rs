//! Flags shared by every handler of one session
//!
//! Each field is a lock-free scalar with a documented writer; readers may
//! observe a slightly stale value.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Session-wide flags
#[derive(Debug)]
pub struct SharedStates {
    /// Written by `ChatSession::start`/`stop` only
    active: AtomicBool,
    /// Cleared by the voice-activity handler when human speech starts;
    /// re-armed by the avatar handler when the avatar stops speaking
    enable_vad: AtomicBool,
    /// Written by the voice-activity handler
    is_listening: AtomicBool,
    /// Incremented by the voice-activity handler per human turn
    speech_round: AtomicU64,
    /// Incremented by the voice-activity handler per speech segment
    human_speech_segment_num: AtomicU64,
}

impl Default for SharedStates {
    fn default() -> Self {
        Self {
            active: AtomicBool::new(false),
            enable_vad: AtomicBool::new(true),
            is_listening: AtomicBool::new(false),
            speech_round: AtomicU64::new(0),
            human_speech_segment_num: AtomicU64::new(0),
        }
    }
}

impl SharedStates {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn enable_vad(&self) -> bool {
        self.enable_vad.load(Ordering::Relaxed)
    }

    pub fn set_enable_vad(&self, enabled: bool) {
        self.enable_vad.store(enabled, Ordering::Relaxed);
    }

    pub fn is_listening(&self) -> bool {
        self.is_listening.load(Ordering::Relaxed)
    }

    pub fn set_listening(&self, listening: bool) {
        self.is_listening.store(listening, Ordering::Relaxed);
    }

    pub fn speech_round(&self) -> u64 {
        self.speech_round.load(Ordering::Relaxed)
    }

    /// Start a new speech round, returning its number
    pub fn next_speech_round(&self) -> u64 {
        self.speech_round.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn human_speech_segment_num(&self) -> u64 {
        self.human_speech_segment_num.load(Ordering::Relaxed)
    }

    pub fn next_human_speech_segment(&self) -> u64 {
        self.human_speech_segment_num.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_counters() {
        let states = SharedStates::default();
        assert!(!states.is_active());
        assert!(states.enable_vad());
        assert!(!states.is_listening());

        assert_eq!(states.next_speech_round(), 1);
        assert_eq!(states.next_speech_round(), 2);
        assert_eq!(states.speech_round(), 2);
        assert_eq!(states.next_human_speech_segment(), 1);

        states.set_enable_vad(false);
        assert!(!states.enable_vad());
    }
}
