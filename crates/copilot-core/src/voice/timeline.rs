//! Per-session stage-timestamp record (`spec.md` §3 `VoiceSessionTimeline`).
//!
//! Every `set_*` is idempotent first-writer-wins: once a stage timestamp
//! is recorded it can never be overwritten, which is what lets invariant 6
//! (`spec.md` §8) hold even if a collaborator's completion signal fires
//! more than once.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct VoiceSessionTimeline {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub first_audio_frame_at: Option<DateTime<Utc>>,
    pub mic_released_at: Option<DateTime<Utc>>,
    pub asr_started_at: Option<DateTime<Utc>>,
    pub asr_first_token_at: Option<DateTime<Utc>>,
    pub transcript_ready_at: Option<DateTime<Utc>>,
    pub agent_started_at: Option<DateTime<Utc>>,
    pub agent_ready_at: Option<DateTime<Utc>>,
    pub tts_started_at: Option<DateTime<Utc>>,
    pub speaking_started_at: Option<DateTime<Utc>>,
    user_message_emitted: bool,
    agent_message_emitted: bool,
    completion_emitted: bool,
}

macro_rules! first_writer_wins {
    ($name:ident, $field:ident) => {
        /// Records the timestamp only the first time it is called;
        /// subsequent calls are no-ops.
        pub fn $name(&mut self) {
            if self.$field.is_none() {
                self.$field = Some(Utc::now());
            }
        }
    };
}

impl VoiceSessionTimeline {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            started_at: Utc::now(),
            first_audio_frame_at: None,
            mic_released_at: None,
            asr_started_at: None,
            asr_first_token_at: None,
            transcript_ready_at: None,
            agent_started_at: None,
            agent_ready_at: None,
            tts_started_at: None,
            speaking_started_at: None,
            user_message_emitted: false,
            agent_message_emitted: false,
            completion_emitted: false,
        }
    }

    first_writer_wins!(mark_first_audio_frame, first_audio_frame_at);
    first_writer_wins!(mark_mic_released, mic_released_at);
    first_writer_wins!(mark_asr_started, asr_started_at);
    first_writer_wins!(mark_asr_first_token, asr_first_token_at);
    first_writer_wins!(mark_transcript_ready, transcript_ready_at);
    first_writer_wins!(mark_agent_started, agent_started_at);
    first_writer_wins!(mark_agent_ready, agent_ready_at);
    first_writer_wins!(mark_tts_started, tts_started_at);
    first_writer_wins!(mark_speaking_started, speaking_started_at);

    /// True only the first time it is called for this session; gates
    /// `userMessageAdded` emission exactly once.
    pub fn try_claim_user_message(&mut self) -> bool {
        if self.user_message_emitted {
            return false;
        }
        self.user_message_emitted = true;
        true
    }

    /// True only the first time it is called for this session; gates
    /// `agentMessageAdded` emission exactly once.
    pub fn try_claim_agent_message(&mut self) -> bool {
        if self.agent_message_emitted {
            return false;
        }
        self.agent_message_emitted = true;
        true
    }

    /// True only the first time it is called for this session; gates
    /// `VoiceSessionComplete` emission exactly once (`spec.md` §4.4 timing
    /// invariants: "session total and roundtrip durations are emitted
    /// exactly once per completed session").
    pub fn try_claim_completion(&mut self) -> bool {
        if self.completion_emitted {
            return false;
        }
        self.completion_emitted = true;
        true
    }

    /// Session total (start of `MicDown` to `now`, typically
    /// playback-complete) and roundtrip (`micReleased` to `speakingStarted`,
    /// i.e. processing latency once the user stops talking) durations in
    /// milliseconds. Roundtrip is `0` if either endpoint was never recorded.
    pub fn durations_ms(&self, now: DateTime<Utc>) -> (i64, i64) {
        let total_ms = (now - self.started_at).num_milliseconds().max(0);
        let roundtrip_ms = match (self.mic_released_at, self.speaking_started_at) {
            (Some(released), Some(speaking)) => (speaking - released).num_milliseconds().max(0),
            _ => 0,
        };
        (total_ms, roundtrip_ms)
    }

    /// Checks invariant 6 from `spec.md` §8 for a fully completed session:
    /// every recorded stage timestamp is non-decreasing in pipeline order.
    pub fn is_monotonic(&self) -> bool {
        let stages = [
            Some(self.started_at),
            self.first_audio_frame_at,
            self.mic_released_at,
            self.asr_started_at,
            self.transcript_ready_at,
            self.agent_started_at,
            self.agent_ready_at,
            self.tts_started_at,
            self.speaking_started_at,
        ];
        let recorded: Vec<DateTime<Utc>> = stages.into_iter().flatten().collect();
        recorded.windows(2).all(|pair| pair[0] <= pair[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_writer_wins_does_not_overwrite() {
        let mut timeline = VoiceSessionTimeline::new("s1");
        timeline.mark_mic_released();
        let first = timeline.mic_released_at.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        timeline.mark_mic_released();
        assert_eq!(timeline.mic_released_at.unwrap(), first);
    }

    #[test]
    fn user_message_claim_is_exactly_once() {
        let mut timeline = VoiceSessionTimeline::new("s1");
        assert!(timeline.try_claim_user_message());
        assert!(!timeline.try_claim_user_message());
    }

    #[test]
    fn agent_message_claim_is_exactly_once() {
        let mut timeline = VoiceSessionTimeline::new("s1");
        assert!(timeline.try_claim_agent_message());
        assert!(!timeline.try_claim_agent_message());
    }

    #[test]
    fn full_pipeline_is_monotonic() {
        let mut timeline = VoiceSessionTimeline::new("s1");
        timeline.mark_first_audio_frame();
        timeline.mark_mic_released();
        timeline.mark_asr_started();
        timeline.mark_transcript_ready();
        timeline.mark_agent_started();
        timeline.mark_agent_ready();
        timeline.mark_tts_started();
        timeline.mark_speaking_started();
        assert!(timeline.is_monotonic());
    }

    #[test]
    fn a_fresh_timeline_with_no_stages_is_trivially_monotonic() {
        let timeline = VoiceSessionTimeline::new("s1");
        assert!(timeline.is_monotonic());
    }

    #[test]
    fn completion_claim_is_exactly_once() {
        let mut timeline = VoiceSessionTimeline::new("s1");
        assert!(timeline.try_claim_completion());
        assert!(!timeline.try_claim_completion());
    }

    #[test]
    fn durations_are_computed_from_recorded_stages() {
        let mut timeline = VoiceSessionTimeline::new("s1");
        timeline.mark_mic_released();
        std::thread::sleep(std::time::Duration::from_millis(5));
        timeline.mark_speaking_started();
        let (total_ms, roundtrip_ms) = timeline.durations_ms(Utc::now());
        assert!(total_ms >= 5);
        assert!(roundtrip_ms >= 5);
    }

    #[test]
    fn roundtrip_is_zero_without_both_endpoints() {
        let timeline = VoiceSessionTimeline::new("s1");
        let (_, roundtrip_ms) = timeline.durations_ms(Utc::now());
        assert_eq!(roundtrip_ms, 0);
    }
}
