//! The decision core of the daemon. Each poll tick produces a [Sample];
//! [advance] folds samples into the session state and says which time
//! entries must be opened or closed. Keeping the transition a pure function
//! leaves all persistence to [module::SessionModule], the single owner of
//! both the state and the entry store.

pub mod module;

use chrono::{DateTime, Utc};

use super::storage::entities::ProgramId;

/// What the sampler observed on one tick. When `idle` is set the sampler
/// skipped foreground resolution entirely, so `foreground` is always None on
/// an idle sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub at: DateTime<Utc>,
    pub idle: bool,
    pub foreground: Option<ProgramId>,
}

/// Whether some program is currently being timed. There is at most one open
/// time entry precisely because there is at most one `Tracking` program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    IdlePaused,
    Tracking(ProgramId),
}

/// Persistence side effect of a transition, applied in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Open {
        program: ProgramId,
        at: DateTime<Utc>,
    },
    Close {
        program: ProgramId,
        at: DateTime<Utc>,
    },
}

/// Folds one sample into the session state.
///
/// Idleness wins over whatever the foreground looks like: an idle sample
/// closes any running entry and nothing else. Otherwise the state follows
/// the foreground program, closing and opening entries with the same
/// timestamp so a program switch leaves no gap and no overlap.
pub fn advance(state: SessionState, sample: &Sample) -> (SessionState, Vec<Effect>) {
    let at = sample.at;

    if sample.idle {
        return match state {
            SessionState::Tracking(program) => (
                SessionState::IdlePaused,
                vec![Effect::Close { program, at }],
            ),
            SessionState::IdlePaused => (SessionState::IdlePaused, vec![]),
        };
    }

    match (state, sample.foreground) {
        (SessionState::IdlePaused, Some(program)) => (
            SessionState::Tracking(program),
            vec![Effect::Open { program, at }],
        ),
        (SessionState::IdlePaused, None) => (SessionState::IdlePaused, vec![]),
        (SessionState::Tracking(program), None) => (
            SessionState::IdlePaused,
            vec![Effect::Close { program, at }],
        ),
        (SessionState::Tracking(current), Some(next)) if current == next => {
            (SessionState::Tracking(current), vec![])
        }
        (SessionState::Tracking(current), Some(next)) => (
            SessionState::Tracking(next),
            vec![
                Effect::Close {
                    program: current,
                    at,
                },
                Effect::Open { program: next, at },
            ],
        ),
    }
}
