//! Create/edit state for a single task.
//!
//! [`TaskForm`] owns the task under edit and turns presentation events into
//! mutations of it. Presentation code reads outcomes through one-shot
//! [`FormEvent`]s. All mutation happens on the thread that owns the form;
//! only the project list is loaded elsewhere (see [`crate::projects`]).

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::datastore::{ProjectCatalog, TaskStore};
use crate::datetime::{Clock, accept_picked_date, format_form_date};
use crate::error::{StoreError, ValidationError};
use crate::events::{CalendarTarget, EventQueue, FormEvent};
use crate::projects::{FetchFailurePolicy, FetchResult, ProjectsFetch};
use crate::task::{Project, RepeatDetail, RepeatMode, Task, round_estimate};

#[derive(Debug, Clone, Copy, Default)]
pub struct FormOptions {
    pub fetch_failure: FetchFailurePolicy,
}

impl FormOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            fetch_failure: cfg.fetch_failure_policy(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved { id: u64 },
    /// Nothing was persisted; the listed rules fired.
    Rejected(Vec<ValidationError>),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

pub struct TaskForm {
    task: Task,
    editing: bool,
    project_locked: bool,
    projects: Vec<Project>,
    events: EventQueue,
    catalog: Arc<dyn ProjectCatalog>,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    options: FormOptions,
    lifetime: CancellationToken,
    fetch: Option<ProjectsFetch>,
}

impl TaskForm {
    /// Opens the form on an empty task.
    pub fn new(
        catalog: Arc<dyn ProjectCatalog>,
        store: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
        options: FormOptions,
    ) -> Self {
        let task = Task::default();
        let mut events = EventQueue::default();
        events.emit(FormEvent::RegularTaskVisibility(task.is_regular_task));

        Self {
            task,
            editing: false,
            project_locked: false,
            projects: Vec::new(),
            events,
            catalog,
            store,
            clock,
            options,
            lifetime: CancellationToken::new(),
            fetch: None,
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn is_project_locked(&self) -> bool {
        self.project_locked
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn repeat_detail(&self) -> RepeatDetail {
        self.task.repeat_mode.detail()
    }

    pub fn next_event(&mut self) -> Option<FormEvent> {
        self.events.next()
    }

    pub fn drain_events(&mut self) -> Vec<FormEvent> {
        self.events.drain()
    }

    /// Replaces the task under edit with a stored one. On a lookup miss the
    /// current task is left untouched.
    #[instrument(skip(self))]
    pub fn load_task(&mut self, id: u64) -> Result<(), StoreError> {
        let task = self.store.get_by_id(id)?;

        self.events
            .emit(FormEvent::RepeatDetailVisibility(task.repeat_mode.detail()));
        if task.repeat_mode == RepeatMode::EveryWeek {
            self.events
                .emit(FormEvent::EveryWeekSelection(task.picked_days.clone()));
        }
        self.task = task;
        self.editing = true;

        info!(task_id = id, "loaded task for editing");
        Ok(())
    }

    /// Starts loading the project list off-thread. Call [`Self::poll_projects`]
    /// or [`Self::wait_for_projects`] to publish the result.
    #[instrument(skip(self))]
    pub fn load_projects(&mut self) -> anyhow::Result<()> {
        if let Some(previous) = self.fetch.take() {
            previous.cancel();
        }
        let fetch = ProjectsFetch::spawn(self.catalog.clone(), self.lifetime.child_token())?;
        self.fetch = Some(fetch);
        Ok(())
    }

    /// Publishes a finished fetch, if any. Returns true when a result was
    /// consumed.
    pub fn poll_projects(&mut self) -> bool {
        let Some(result) = self.fetch.as_ref().and_then(ProjectsFetch::try_take) else {
            return false;
        };
        self.fetch = None;
        self.publish_projects(result);
        true
    }

    pub fn wait_for_projects(&mut self, timeout: Duration) -> bool {
        let Some(result) = self.fetch.as_ref().and_then(|f| f.wait(timeout)) else {
            return false;
        };
        self.fetch = None;
        self.publish_projects(result);
        true
    }

    fn publish_projects(&mut self, result: FetchResult) {
        match result {
            Ok(projects) => {
                debug!(count = projects.len(), "published projects");
                self.projects = projects;
            }
            Err(err) => {
                warn!(error = %err, "failed to load projects; leaving list empty");
                self.projects.clear();
                if self.options.fetch_failure == FetchFailurePolicy::Signal {
                    self.events
                        .emit(FormEvent::ProjectsLoadFailed(err.to_string()));
                }
            }
        }
    }

    /// `is_checked` is the state of the "one-time task" checkbox, so a
    /// checked box means the task does NOT repeat.
    pub fn set_regular(&mut self, is_checked: bool) {
        self.task.is_regular_task = !is_checked;
        self.events
            .emit(FormEvent::RegularTaskVisibility(self.task.is_regular_task));
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        debug!(?mode, "repeat mode changed");
        self.task.repeat_mode = mode;
        self.events
            .emit(FormEvent::RepeatDetailVisibility(mode.detail()));
    }

    pub fn set_picked_days(&mut self, days: impl Into<String>) {
        self.task.picked_days = days.into();
    }

    pub fn set_project(&mut self, id: u64) {
        self.task.project_id = Some(id);
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.task.name = name.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.task.description = description.into();
    }

    pub fn set_estimate_time(&mut self, estimate: Option<f64>) {
        self.task.estimate_time = estimate;
    }

    pub fn set_repeat_date(&mut self, date: impl Into<String>) {
        self.task.repeat_date = date.into();
    }

    /// Fixes the project when the form is opened from a project screen.
    #[instrument(skip(self))]
    pub fn preset_project(&mut self, id: u64) -> Result<Project, StoreError> {
        let project = self.catalog.get(id)?;
        self.task.project_id = Some(project.id);
        self.project_locked = true;
        Ok(project)
    }

    /// Name of the selected project, for display.
    pub fn project_name(&self) -> Result<Option<String>, StoreError> {
        match self.task.project_id {
            Some(id) => Ok(Some(self.catalog.get(id)?.name)),
            None => Ok(None),
        }
    }

    pub fn open_project_dialog(&mut self) {
        self.events.emit(FormEvent::ProjectDialogRequested);
    }

    pub fn open_estimate_calendar(&mut self) {
        self.events
            .emit(FormEvent::CalendarRequested(CalendarTarget::EstimateDate));
    }

    pub fn open_repeat_date_calendar(&mut self) {
        self.events
            .emit(FormEvent::CalendarRequested(CalendarTarget::RepeatDate));
    }

    pub fn pick_estimate_date(&mut self, picked: NaiveDate) -> bool {
        self.pick_date(CalendarTarget::EstimateDate, picked)
    }

    pub fn pick_repeat_date(&mut self, picked: NaiveDate) -> bool {
        self.pick_date(CalendarTarget::RepeatDate, picked)
    }

    fn pick_date(&mut self, target: CalendarTarget, picked: NaiveDate) -> bool {
        let Some(text) = accept_picked_date(picked, self.clock.today()) else {
            debug!(?target, %picked, "rejected picked date");
            self.events.emit(FormEvent::PickedDateRejected(target));
            return false;
        };
        match target {
            CalendarTarget::EstimateDate => self.task.estimate_date = text,
            CalendarTarget::RepeatDate => self.task.repeat_date = text,
        }
        true
    }

    /// Checks the task, derives its activation and persists it.
    ///
    /// Name, day-picker and project rules are evaluated together and all
    /// report. The exact-date rule only runs once those pass, and reports
    /// alone. A rejected save persists nothing; store failures propagate.
    #[instrument(skip(self), fields(task_id = ?self.task.id, editing = self.editing))]
    pub fn validate_and_save(&mut self) -> Result<SaveOutcome, StoreError> {
        let mut violations = Vec::new();
        if self.task.name.trim().is_empty() {
            violations.push(ValidationError::NameBlank);
        }
        if self.task.is_every_week() && self.task.picked_days.is_empty() {
            violations.push(ValidationError::NoPickedDays);
        }
        if self.task.project_id.is_none() {
            violations.push(ValidationError::NoProject);
        }
        if !violations.is_empty() {
            return Ok(self.reject(violations));
        }

        self.task.estimate_time = Some(self.task.estimate_time.map_or(0.0, round_estimate));

        if self.task.repeat_mode == RepeatMode::ExactDate
            && self.task.repeat_date.trim().is_empty()
        {
            return Ok(self.reject(vec![ValidationError::RepeatDateBlank]));
        }

        let today = format_form_date(self.clock.today());
        self.task.is_active = self
            .task
            .activation_for(self.clock.today_weekday(), &today);

        self.task.name = self.task.name.trim().to_string();
        self.task.description = self.task.description.trim().to_string();

        let id = match self.task.id.filter(|_| self.editing) {
            Some(id) => {
                self.store.update(&self.task)?;
                id
            }
            None => {
                let id = self.store.insert(&self.task)?;
                self.task.id = Some(id);
                self.editing = true;
                id
            }
        };

        info!(task_id = id, is_active = self.task.is_active, "saved task");
        self.events.emit(FormEvent::Saved);
        Ok(SaveOutcome::Saved { id })
    }

    fn reject(&mut self, violations: Vec<ValidationError>) -> SaveOutcome {
        debug!(?violations, "save rejected");
        for violation in &violations {
            self.events.emit(FormEvent::ValidationFailed(*violation));
        }
        SaveOutcome::Rejected(violations)
    }

    /// Tears the form down. A project fetch still in flight is cancelled and
    /// its result discarded.
    pub fn close(self) {
        debug!(editing = self.editing, "closing task form");
        self.lifetime.cancel();
    }
}

impl Drop for TaskForm {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}
