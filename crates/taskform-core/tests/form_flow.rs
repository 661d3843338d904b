use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use chrono::NaiveDate;
use crossbeam_channel::{Receiver, Sender, bounded};
use taskform_core::datastore::{MemoryStore, ProjectCatalog, TaskStore};
use taskform_core::datetime::FixedClock;
use taskform_core::error::{StoreError, ValidationError};
use taskform_core::events::{CalendarTarget, FormEvent};
use taskform_core::form::{FormOptions, SaveOutcome, TaskForm};
use taskform_core::projects::FetchFailurePolicy;
use taskform_core::task::{Project, RepeatDetail, RepeatMode, Task};

/// Tuesday: weekday number 3 when counting from Sunday = 1.
fn tuesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 13).expect("valid date")
}

/// Wraps a [`MemoryStore`] and counts persistence calls.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    inserts: AtomicUsize,
    updates: AtomicUsize,
}

impl RecordingStore {
    fn writes(&self) -> usize {
        self.inserts.load(Ordering::SeqCst) + self.updates.load(Ordering::SeqCst)
    }
}

impl TaskStore for RecordingStore {
    fn get_by_id(&self, id: u64) -> Result<Task, StoreError> {
        self.inner.get_by_id(id)
    }

    fn insert(&self, task: &Task) -> Result<u64, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(task)
    }

    fn update(&self, task: &Task) -> Result<(), StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(task)
    }
}

struct FailingCatalog;

impl ProjectCatalog for FailingCatalog {
    fn list_all(&self) -> Result<Vec<Project>, StoreError> {
        Err(StoreError::Backend(anyhow!("catalog offline")))
    }

    fn get(&self, id: u64) -> Result<Project, StoreError> {
        Err(StoreError::project_not_found(id))
    }
}

/// First `list_all` call parks until released and answers "Stale"; later
/// calls answer "Fresh" at once.
struct StallingCatalog {
    calls: AtomicUsize,
    entered: Sender<()>,
    release: Receiver<()>,
}

impl StallingCatalog {
    fn new() -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        let catalog = Arc::new(Self {
            calls: AtomicUsize::new(0),
            entered: entered_tx,
            release: release_rx,
        });
        (catalog, entered_rx, release_tx)
    }
}

impl ProjectCatalog for StallingCatalog {
    fn list_all(&self) -> Result<Vec<Project>, StoreError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            return Ok(vec![Project { id: 1, name: "Stale".to_string() }]);
        }
        Ok(vec![Project { id: 2, name: "Fresh".to_string() }])
    }

    fn get(&self, id: u64) -> Result<Project, StoreError> {
        Err(StoreError::project_not_found(id))
    }
}

struct Harness {
    form: TaskForm,
    store: Arc<RecordingStore>,
}

fn harness_on(date: NaiveDate) -> Harness {
    let catalog = Arc::new(MemoryStore::with_projects(["Home", "Work"]));
    let store = Arc::new(RecordingStore::default());
    let mut form = TaskForm::new(
        catalog,
        store.clone(),
        Arc::new(FixedClock::new(date)),
        FormOptions::default(),
    );
    // Initial visibility signal.
    form.drain_events();
    Harness { form, store }
}

fn harness() -> Harness {
    harness_on(tuesday())
}

fn fill_valid(form: &mut TaskForm) {
    form.set_name("Water plants");
    form.set_project(1);
}

fn validation_events(events: &[FormEvent]) -> Vec<ValidationError> {
    events
        .iter()
        .filter_map(|event| match event {
            FormEvent::ValidationFailed(v) => Some(*v),
            _ => None,
        })
        .collect()
}

#[test]
fn fresh_form_announces_one_time_layout() {
    let catalog = Arc::new(MemoryStore::default());
    let mut form = TaskForm::new(
        catalog.clone(),
        catalog,
        Arc::new(FixedClock::new(tuesday())),
        FormOptions::default(),
    );
    assert_eq!(form.drain_events(), vec![FormEvent::RegularTaskVisibility(false)]);
    assert!(!form.is_editing());
    assert_eq!(form.repeat_detail(), RepeatDetail::None);
    assert_eq!(form.next_event(), None);
}

#[test]
fn blank_name_blocks_save() {
    for name in ["", "   ", "\t\n"] {
        let mut h = harness();
        h.form.set_name(name);
        h.form.set_project(1);

        let outcome = h.form.validate_and_save().expect("save");
        assert_eq!(outcome, SaveOutcome::Rejected(vec![ValidationError::NameBlank]));
        assert_eq!(
            h.form.drain_events(),
            vec![FormEvent::ValidationFailed(ValidationError::NameBlank)]
        );
        assert_eq!(h.store.writes(), 0);
    }
}

#[test]
fn every_week_without_days_blocks_save() {
    let mut h = harness();
    fill_valid(&mut h.form);
    h.form.set_regular(false);
    h.form.set_repeat_mode(RepeatMode::EveryWeek);
    h.form.set_picked_days("");

    let outcome = h.form.validate_and_save().expect("save");
    assert_eq!(outcome, SaveOutcome::Rejected(vec![ValidationError::NoPickedDays]));
    assert_eq!(h.store.writes(), 0);
}

#[test]
fn missing_project_blocks_save() {
    let mut h = harness();
    h.form.set_name("Call mom");

    let outcome = h.form.validate_and_save().expect("save");
    assert_eq!(outcome, SaveOutcome::Rejected(vec![ValidationError::NoProject]));
    assert_eq!(h.store.writes(), 0);
}

#[test]
fn first_three_rules_report_together() {
    let mut h = harness();
    h.form.set_regular(false);
    h.form.set_repeat_mode(RepeatMode::EveryWeek);
    h.form.drain_events();

    let outcome = h.form.validate_and_save().expect("save");
    let expected = vec![
        ValidationError::NameBlank,
        ValidationError::NoPickedDays,
        ValidationError::NoProject,
    ];
    assert_eq!(outcome, SaveOutcome::Rejected(expected.clone()));
    assert_eq!(validation_events(&h.form.drain_events()), expected);
    assert_eq!(h.store.writes(), 0);
}

#[test]
fn blank_exact_date_is_reported_alone() {
    let mut h = harness();
    fill_valid(&mut h.form);
    h.form.set_regular(false);
    h.form.set_repeat_mode(RepeatMode::ExactDate);
    h.form.set_repeat_date(" ");
    h.form.drain_events();

    let outcome = h.form.validate_and_save().expect("save");
    assert_eq!(outcome, SaveOutcome::Rejected(vec![ValidationError::RepeatDateBlank]));
    assert_eq!(
        h.form.drain_events(),
        vec![FormEvent::ValidationFailed(ValidationError::RepeatDateBlank)]
    );
    assert_eq!(h.store.writes(), 0);
}

#[test]
fn exact_date_rule_waits_for_the_batch() {
    let mut h = harness();
    h.form.set_project(1);
    h.form.set_repeat_mode(RepeatMode::ExactDate);

    let outcome = h.form.validate_and_save().expect("save");
    assert_eq!(outcome, SaveOutcome::Rejected(vec![ValidationError::NameBlank]));
}

#[test]
fn estimate_defaults_to_zero() {
    let mut h = harness();
    fill_valid(&mut h.form);

    h.form.validate_and_save().expect("save");
    assert_eq!(h.form.task().estimate_time, Some(0.0));
}

#[test]
fn estimate_rounds_to_two_places() {
    let mut h = harness();
    fill_valid(&mut h.form);
    h.form.set_estimate_time(Some(3.14159));

    h.form.validate_and_save().expect("save");
    assert_eq!(h.form.task().estimate_time, Some(3.14));
    assert_eq!(h.store.inner.tasks()[0].estimate_time, Some(3.14));
}

#[test]
fn estimate_half_cent_rounds_up() {
    let mut h = harness();
    fill_valid(&mut h.form);
    h.form.set_estimate_time(Some(1.005));

    h.form.validate_and_save().expect("save");
    assert_eq!(h.form.task().estimate_time, Some(1.01));
}

#[test]
fn every_day_task_is_active() {
    let mut h = harness();
    fill_valid(&mut h.form);
    h.form.set_regular(false);
    h.form.set_repeat_mode(RepeatMode::EveryDay);

    assert!(h.form.validate_and_save().expect("save").is_saved());
    assert!(h.form.task().is_active);
}

#[test]
fn every_week_activation_follows_todays_weekday() {
    for (days, active) in [("1,3,5", true), ("1,2,4", false)] {
        let mut h = harness();
        fill_valid(&mut h.form);
        h.form.set_regular(false);
        h.form.set_repeat_mode(RepeatMode::EveryWeek);
        h.form.set_picked_days(days);

        assert!(h.form.validate_and_save().expect("save").is_saved());
        assert_eq!(h.form.task().is_active, active, "picked days {days}");
    }
}

#[test]
fn exact_date_activation_compares_formatted_today() {
    for (date, active) in [("13.10.2026", true), ("14.10.2026", false)] {
        let mut h = harness();
        fill_valid(&mut h.form);
        h.form.set_regular(false);
        h.form.set_repeat_mode(RepeatMode::ExactDate);
        h.form.set_repeat_date(date);

        assert!(h.form.validate_and_save().expect("save").is_saved());
        assert_eq!(h.form.task().is_active, active, "repeat date {date}");
    }
}

#[test]
fn one_time_task_is_never_active() {
    let mut h = harness();
    fill_valid(&mut h.form);
    h.form.set_regular(false);
    h.form.set_regular(true);
    h.form.set_repeat_mode(RepeatMode::EveryDay);

    assert!(h.form.validate_and_save().expect("save").is_saved());
    assert!(!h.form.task().is_regular_task);
    assert!(!h.form.task().is_active);
}

#[test]
fn checkbox_is_inverted() {
    let mut h = harness();
    h.form.set_regular(false);
    assert!(h.form.task().is_regular_task);
    h.form.set_regular(true);
    assert!(!h.form.task().is_regular_task);
    assert_eq!(
        h.form.drain_events(),
        vec![
            FormEvent::RegularTaskVisibility(true),
            FormEvent::RegularTaskVisibility(false),
        ]
    );
}

#[test]
fn repeat_mode_selects_detail_input() {
    let mut h = harness();
    h.form.set_repeat_mode(RepeatMode::EveryWeek);
    assert_eq!(h.form.repeat_detail(), RepeatDetail::DayPicker);
    h.form.set_repeat_mode(RepeatMode::ExactDate);
    assert_eq!(h.form.repeat_detail(), RepeatDetail::ExactDate);
    h.form.set_repeat_mode(RepeatMode::EveryDay);
    assert_eq!(h.form.repeat_detail(), RepeatDetail::None);
    assert_eq!(
        h.form.drain_events(),
        vec![
            FormEvent::RepeatDetailVisibility(RepeatDetail::DayPicker),
            FormEvent::RepeatDetailVisibility(RepeatDetail::ExactDate),
            FormEvent::RepeatDetailVisibility(RepeatDetail::None),
        ]
    );
}

#[test]
fn save_trims_text_and_signals_once() {
    let mut h = harness();
    h.form.set_name("  Water plants  ");
    h.form.set_description("  balcony only ");
    h.form.set_project(2);

    let outcome = h.form.validate_and_save().expect("save");
    assert_eq!(outcome, SaveOutcome::Saved { id: 1 });
    assert_eq!(h.form.task().name, "Water plants");
    assert_eq!(h.form.task().description, "balcony only");
    assert_eq!(h.form.drain_events(), vec![FormEvent::Saved]);
    assert_eq!(h.form.next_event(), None);
    assert_eq!(h.store.inserts.load(Ordering::SeqCst), 1);
}

#[test]
fn saved_task_reloads_identically() {
    let mut h = harness();
    fill_valid(&mut h.form);
    h.form.set_description("front and back");
    h.form.set_regular(false);
    h.form.set_repeat_mode(RepeatMode::EveryWeek);
    h.form.set_picked_days("3,5");
    h.form.set_estimate_time(Some(1.256));

    let SaveOutcome::Saved { id } = h.form.validate_and_save().expect("save") else {
        panic!("expected save");
    };
    let saved = h.form.task().clone();

    let catalog = Arc::new(MemoryStore::with_projects(["Home"]));
    let mut reopened = TaskForm::new(
        catalog,
        h.store.clone(),
        Arc::new(FixedClock::new(tuesday())),
        FormOptions::default(),
    );
    reopened.drain_events();
    reopened.load_task(id).expect("load saved task");

    assert_eq!(reopened.task(), &saved);
    assert!(reopened.is_editing());
    assert_eq!(
        reopened.drain_events(),
        vec![
            FormEvent::RepeatDetailVisibility(RepeatDetail::DayPicker),
            FormEvent::EveryWeekSelection("3,5".to_string()),
        ]
    );
}

#[test]
fn editing_updates_instead_of_inserting() {
    let mut h = harness();
    fill_valid(&mut h.form);
    let SaveOutcome::Saved { id } = h.form.validate_and_save().expect("save") else {
        panic!("expected save");
    };

    let catalog = Arc::new(MemoryStore::with_projects(["Home"]));
    let mut edit = TaskForm::new(
        catalog,
        h.store.clone(),
        Arc::new(FixedClock::new(tuesday())),
        FormOptions::default(),
    );
    edit.load_task(id).expect("load");
    edit.set_name("Water all plants");
    assert_eq!(
        edit.validate_and_save().expect("save"),
        SaveOutcome::Saved { id }
    );

    assert_eq!(h.store.inserts.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.updates.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.inner.tasks()[0].name, "Water all plants");
}

#[test]
fn loading_unknown_task_keeps_current_state() {
    let mut h = harness();
    h.form.set_name("Draft");

    let err = h.form.load_task(42).expect_err("unknown task");
    assert!(err.is_not_found());
    assert_eq!(h.form.task().name, "Draft");
    assert!(!h.form.is_editing());
}

#[test]
fn projects_load_newest_first() {
    let mut h = harness();
    h.form.load_projects().expect("start fetch");
    assert!(h.form.wait_for_projects(Duration::from_secs(5)));

    let names: Vec<&str> = h.form.projects().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Work", "Home"]);
    assert!(!h.form.poll_projects());
}

#[test]
fn superseded_fetch_never_publishes() {
    let (catalog, entered, release) = StallingCatalog::new();
    let mut form = TaskForm::new(
        catalog,
        Arc::new(MemoryStore::default()),
        Arc::new(FixedClock::new(tuesday())),
        FormOptions::default(),
    );
    form.load_projects().expect("start first fetch");
    entered
        .recv_timeout(Duration::from_secs(5))
        .expect("first fetch reached the catalog");

    form.load_projects().expect("start second fetch");
    assert!(form.wait_for_projects(Duration::from_secs(5)));
    release.send(()).expect("release first fetch");

    assert!(!form.poll_projects());
    assert!(!form.wait_for_projects(Duration::from_millis(200)));
    let names: Vec<&str> = form.projects().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Fresh"]);
}

#[test]
fn failed_project_fetch_is_silent_by_default() {
    let store = Arc::new(MemoryStore::default());
    let mut form = TaskForm::new(
        Arc::new(FailingCatalog),
        store,
        Arc::new(FixedClock::new(tuesday())),
        FormOptions::default(),
    );
    form.drain_events();
    form.load_projects().expect("start fetch");
    assert!(form.wait_for_projects(Duration::from_secs(5)));

    assert!(form.projects().is_empty());
    assert!(form.drain_events().is_empty());
}

#[test]
fn failed_project_fetch_can_signal() {
    let store = Arc::new(MemoryStore::default());
    let mut form = TaskForm::new(
        Arc::new(FailingCatalog),
        store,
        Arc::new(FixedClock::new(tuesday())),
        FormOptions {
            fetch_failure: FetchFailurePolicy::Signal,
        },
    );
    form.drain_events();
    form.load_projects().expect("start fetch");
    assert!(form.wait_for_projects(Duration::from_secs(5)));

    assert!(form.projects().is_empty());
    assert_eq!(
        form.drain_events(),
        vec![FormEvent::ProjectsLoadFailed("catalog offline".to_string())]
    );
}

#[test]
fn preset_project_locks_selection() {
    let mut h = harness();
    let project = h.form.preset_project(2).expect("preset");
    assert_eq!(project.name, "Work");
    assert!(h.form.is_project_locked());
    assert_eq!(h.form.project_name().expect("name").as_deref(), Some("Work"));

    let err = h.form.preset_project(99).expect_err("unknown project");
    assert!(err.is_not_found());
    assert_eq!(h.form.task().project_id, Some(2));
}

#[test]
fn dialog_requests_are_one_shot() {
    let mut h = harness();
    h.form.open_project_dialog();
    h.form.open_estimate_calendar();
    h.form.open_repeat_date_calendar();

    assert_eq!(
        h.form.drain_events(),
        vec![
            FormEvent::ProjectDialogRequested,
            FormEvent::CalendarRequested(CalendarTarget::EstimateDate),
            FormEvent::CalendarRequested(CalendarTarget::RepeatDate),
        ]
    );
    assert!(h.form.drain_events().is_empty());
}

#[test]
fn picked_dates_must_be_after_today() {
    let mut h = harness();
    let tomorrow = NaiveDate::from_ymd_opt(2026, 10, 14).expect("valid date");

    assert!(h.form.pick_repeat_date(tomorrow));
    assert_eq!(h.form.task().repeat_date, "14.10.2026");
    assert!(h.form.pick_estimate_date(tomorrow));
    assert_eq!(h.form.task().estimate_date, "14.10.2026");

    assert!(!h.form.pick_repeat_date(tuesday()));
    assert_eq!(h.form.task().repeat_date, "14.10.2026");
    assert_eq!(
        h.form.drain_events(),
        vec![FormEvent::PickedDateRejected(CalendarTarget::RepeatDate)]
    );
}
