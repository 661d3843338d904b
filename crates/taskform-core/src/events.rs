//! One-shot notifications from the form to its presentation layer.
//!
//! Every emission is queued once and handed out by [`EventQueue::drain`] or
//! [`EventQueue::next`]; a delivered event is gone, so an observer that
//! starts draining late never sees earlier emissions replayed.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::ValidationError;
use crate::task::RepeatDetail;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarTarget {
    EstimateDate,
    RepeatDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
    ProjectDialogRequested,
    CalendarRequested(CalendarTarget),
    /// Carries the new `is_regular_task` value.
    RegularTaskVisibility(bool),
    /// Which detail input the current repeat mode shows.
    RepeatDetailVisibility(RepeatDetail),
    ValidationFailed(ValidationError),
    /// Day-picker selection to restore when editing an every-week task.
    EveryWeekSelection(String),
    PickedDateRejected(CalendarTarget),
    ProjectsLoadFailed(String),
    Saved,
}

#[derive(Debug, Default)]
pub struct EventQueue {
    pending: VecDeque<FormEvent>,
}

impl EventQueue {
    pub fn emit(&mut self, event: FormEvent) {
        trace!(?event, "queued form event");
        self.pending.push_back(event);
    }

    pub fn next(&mut self) -> Option<FormEvent> {
        self.pending.pop_front()
    }

    pub fn drain(&mut self) -> Vec<FormEvent> {
        self.pending.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
