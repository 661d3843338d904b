use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tracing::{info, instrument, warn};

use crate::cli::{Command, FormArgs};
use crate::datastore::{DataStore, ProjectCatalog, TaskStore};
use crate::datetime::Clock;
use crate::form::{FormOptions, SaveOutcome, TaskForm};
use crate::render::{Renderer, form_title};

const PROJECT_WAIT: Duration = Duration::from_secs(10);

#[instrument(skip_all)]
pub fn dispatch(
    store: Arc<DataStore>,
    clock: Arc<dyn Clock>,
    options: FormOptions,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Projects => cmd_projects(&store, clock, options, renderer),
        Command::ProjectAdd { name } => cmd_project_add(&store, &name),
        Command::Add(form) => cmd_save(&store, clock, options, renderer, None, &form),
        Command::Edit { id, form } => cmd_save(&store, clock, options, renderer, Some(id), &form),
        Command::Info { id } => cmd_info(&store, renderer, id),
    }
}

fn open_form(store: &Arc<DataStore>, clock: Arc<dyn Clock>, options: FormOptions) -> TaskForm {
    TaskForm::new(store.clone(), store.clone(), clock, options)
}

fn cmd_projects(
    store: &Arc<DataStore>,
    clock: Arc<dyn Clock>,
    options: FormOptions,
    renderer: &mut Renderer,
) -> anyhow::Result<()> {
    let mut form = open_form(store, clock, options);
    form.load_projects()?;
    if !form.wait_for_projects(PROJECT_WAIT) {
        warn!("project list did not arrive");
    }

    renderer.print_events(&form.drain_events())?;
    renderer.print_projects(form.projects())?;
    form.close();
    Ok(())
}

fn cmd_project_add(store: &Arc<DataStore>, name: &str) -> anyhow::Result<()> {
    let project = store.add_project(name)?;
    println!("Created project {}.", project.id);
    Ok(())
}

#[instrument(skip(store, clock, options, renderer, args))]
fn cmd_save(
    store: &Arc<DataStore>,
    clock: Arc<dyn Clock>,
    options: FormOptions,
    renderer: &mut Renderer,
    edit_id: Option<u64>,
    args: &FormArgs,
) -> anyhow::Result<()> {
    let mut form = open_form(store, clock, options);
    if let Some(id) = edit_id {
        form.load_task(id)
            .with_context(|| format!("cannot edit task {id}"))?;
    }
    info!(title = form_title(form.is_editing()), "opened task form");

    args.apply(&mut form)?;
    let outcome = form.validate_and_save()?;
    renderer.print_events(&form.drain_events())?;
    form.close();

    match outcome {
        SaveOutcome::Saved { id } => {
            if edit_id.is_some() {
                println!("Modified task {id}.");
            } else {
                println!("Created task {id}.");
            }
            Ok(())
        }
        SaveOutcome::Rejected(violations) => {
            Err(anyhow!("task not saved ({} problem(s))", violations.len()))
        }
    }
}

fn cmd_info(store: &Arc<DataStore>, renderer: &mut Renderer, id: u64) -> anyhow::Result<()> {
    let task = store.get_by_id(id)?;
    let project_name = match task.project_id {
        Some(project_id) => match store.get(project_id) {
            Ok(project) => Some(project.name),
            Err(err) => {
                warn!(project_id, error = %err, "task refers to an unknown project");
                None
            }
        },
        None => None,
    };
    renderer.print_task_info(&task, project_name.as_deref())
}
