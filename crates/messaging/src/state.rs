//! Lifecycle states for producers and consumers.

/// Producer lifecycle: `Uninitialized → Initialized → ShuttingDown → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProducerState {
    #[default]
    Uninitialized,
    Initialized,
    ShuttingDown,
    Closed,
}

impl std::fmt::Display for ProducerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProducerState::Uninitialized => write!(f, "Uninitialized"),
            ProducerState::Initialized => write!(f, "Initialized"),
            ProducerState::ShuttingDown => write!(f, "ShuttingDown"),
            ProducerState::Closed => write!(f, "Closed"),
        }
    }
}

/// Consumer lifecycle: `Idle → Running → Draining → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConsumerState {
    #[default]
    Idle,
    Running,
    Draining,
    Stopped,
}

impl std::fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumerState::Idle => write!(f, "Idle"),
            ConsumerState::Running => write!(f, "Running"),
            ConsumerState::Draining => write!(f, "Draining"),
            ConsumerState::Stopped => write!(f, "Stopped"),
        }
    }
}
