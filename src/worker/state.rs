use serde::Serialize;
use std::fmt;

/// Lifecycle of one worker's partition.
///
/// `Init → Loading → Barrier → Transforming → Persisting → Done`, with
/// `Failed` reachable from the loading, barrier and transform phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Init,
    Loading,
    Barrier,
    Transforming,
    Persisting,
    Done,
    Failed,
}

impl WorkerState {
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Init, Loading)
                | (Loading, Barrier)
                | (Barrier, Transforming)
                | (Transforming, Persisting)
                | (Persisting, Done)
                | (Loading | Barrier | Transforming, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Loading => "loading",
            Self::Barrier => "barrier",
            Self::Transforming => "transforming",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
