use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// All events that flow through the core's event bus, from the gate, the
/// supervisor, and the voice session state machine to the host shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// Raised by the gate when a `Check` must suspend for a user decision.
    PermissionPromptRequested {
        request_id: String,
        tool_name: String,
        group: String,
        purpose: String,
    },
    /// Raised once a pending prompt has been resolved, whichever way.
    PermissionResolved {
        request_id: String,
        tool_name: String,
        granted: bool,
    },
    /// Raised when the user chooses "allow always"; the host layer must
    /// persist and swap settings in response.
    PersistGroupAsAlways {
        group: String,
    },
    VoiceStateChanged {
        session_id: String,
        state: String,
    },
    VoiceUserMessage {
        session_id: String,
        text: String,
    },
    VoiceAgentMessage {
        session_id: String,
        text: String,
    },
    VoiceFault {
        session_id: String,
        reason: String,
    },
    /// Raised exactly once per completed session, at `Idle` entry after a
    /// successful `MicUp` turn (`spec.md` §4.4 timing invariants).
    VoiceSessionComplete {
        session_id: String,
        total_ms: i64,
        roundtrip_ms: i64,
    },
    SupervisorChildReady {
        subsystem: String,
        base_url: Option<String>,
    },
    SupervisorChildExited {
        subsystem: String,
        reason: String,
    },
    SettingsChanged,
    SystemReady,
    SystemError {
        message: String,
    },
}

/// Selects which event variants a subscriber is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    PermissionPromptRequested,
    PermissionResolved,
    PersistGroupAsAlways,
    VoiceStateChanged,
    VoiceUserMessage,
    VoiceAgentMessage,
    VoiceFault,
    VoiceSessionComplete,
    SupervisorChildReady,
    SupervisorChildExited,
    SettingsChanged,
    SystemReady,
    SystemError,
    /// Matches every variant.
    All,
}

impl EventType {
    /// Returns true if this filter matches `event`.
    pub fn matches(&self, event: &AppEvent) -> bool {
        match self {
            Self::All => true,
            Self::PermissionPromptRequested => {
                matches!(event, AppEvent::PermissionPromptRequested { .. })
            }
            Self::PermissionResolved => matches!(event, AppEvent::PermissionResolved { .. }),
            Self::PersistGroupAsAlways => matches!(event, AppEvent::PersistGroupAsAlways { .. }),
            Self::VoiceStateChanged => matches!(event, AppEvent::VoiceStateChanged { .. }),
            Self::VoiceUserMessage => matches!(event, AppEvent::VoiceUserMessage { .. }),
            Self::VoiceAgentMessage => matches!(event, AppEvent::VoiceAgentMessage { .. }),
            Self::VoiceFault => matches!(event, AppEvent::VoiceFault { .. }),
            Self::VoiceSessionComplete => {
                matches!(event, AppEvent::VoiceSessionComplete { .. })
            }
            Self::SupervisorChildReady => matches!(event, AppEvent::SupervisorChildReady { .. }),
            Self::SupervisorChildExited => {
                matches!(event, AppEvent::SupervisorChildExited { .. })
            }
            Self::SettingsChanged => matches!(event, AppEvent::SettingsChanged),
            Self::SystemReady => matches!(event, AppEvent::SystemReady),
            Self::SystemError => matches!(event, AppEvent::SystemError { .. }),
        }
    }
}

/// A set of event types used for filtering subscriptions.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub event_types: Vec<EventType>,
}

impl EventFilter {
    pub fn new(event_types: Vec<EventType>) -> Self {
        Self { event_types }
    }

    pub fn matches(&self, event: &AppEvent) -> bool {
        self.event_types.iter().any(|t| t.matches(event))
    }
}

/// Central pub/sub bus for core events.
///
/// All returned `Receiver`s receive every published event; callers are
/// responsible for filtering if they subscribed via [`subscribe_filtered`].
pub trait EventBus: Send + Sync {
    /// Publish an event to all active subscribers.
    fn publish(&self, event: AppEvent) -> Result<(), String>;

    /// Subscribe to all events.
    fn subscribe(&self) -> broadcast::Receiver<AppEvent>;

    /// Subscribe to events, pre-scoped to the given filter.
    ///
    /// The returned receiver still carries all events; the filter is provided
    /// as documentation / future optimisation surface.  Consumers should call
    /// [`EventFilter::matches`] to discard unwanted events.
    fn subscribe_filtered(&self, filter: EventFilter) -> broadcast::Receiver<AppEvent>;
}
