use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::task::{Project, Task};

/// Read-only source of selectable projects. Must tolerate concurrent reads.
pub trait ProjectCatalog: Send + Sync {
    /// All projects in definition order.
    fn list_all(&self) -> Result<Vec<Project>, StoreError>;

    fn get(&self, id: u64) -> Result<Project, StoreError>;
}

pub trait TaskStore: Send + Sync {
    fn get_by_id(&self, id: u64) -> Result<Task, StoreError>;

    /// Stores a new task and returns its assigned id.
    fn insert(&self, task: &Task) -> Result<u64, StoreError>;

    fn update(&self, task: &Task) -> Result<(), StoreError>;
}

/// JSONL-backed store: `tasks.data` and `projects.data` under one directory.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub projects_path: PathBuf,
    write_lock: Mutex<()>,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let projects_path = data_dir.join("projects.data");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }
        if !projects_path.exists() {
            fs::write(&projects_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            projects = %projects_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            projects_path,
            write_lock: Mutex::new(()),
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_projects(&self) -> anyhow::Result<Vec<Project>> {
        load_jsonl(&self.projects_path).context("failed to load projects.data")
    }

    #[tracing::instrument(skip(self, tasks))]
    fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    /// Appends a project to the catalog. The form itself never writes
    /// projects; this seeds the catalog.
    #[tracing::instrument(skip(self))]
    pub fn add_project(&self, name: &str) -> anyhow::Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("project name cannot be empty"));
        }

        let _guard = self.write_lock.lock();
        let mut projects = self.load_projects()?;
        let project = Project {
            id: projects.iter().map(|p| p.id).max().unwrap_or(0) + 1,
            name: name.to_string(),
        };
        projects.push(project.clone());
        save_jsonl_atomic(&self.projects_path, &projects)
            .context("failed to save projects.data")?;

        info!(project_id = project.id, "added project");
        Ok(project)
    }
}

impl ProjectCatalog for DataStore {
    fn list_all(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.load_projects()?)
    }

    fn get(&self, id: u64) -> Result<Project, StoreError> {
        self.load_projects()?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::project_not_found(id))
    }
}

impl TaskStore for DataStore {
    fn get_by_id(&self, id: u64) -> Result<Task, StoreError> {
        self.load_tasks()?
            .into_iter()
            .find(|t| t.id == Some(id))
            .ok_or_else(|| StoreError::task_not_found(id))
    }

    #[tracing::instrument(skip(self, task))]
    fn insert(&self, task: &Task) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock();
        let mut tasks = self.load_tasks()?;
        let id = next_id(&tasks);

        let mut stored = task.clone();
        stored.id = Some(id);
        tasks.push(stored);
        self.save_tasks(&tasks)?;

        debug!(task_id = id, "inserted task");
        Ok(id)
    }

    #[tracing::instrument(skip(self, task), fields(task_id = ?task.id))]
    fn update(&self, task: &Task) -> Result<(), StoreError> {
        let id = task
            .id
            .ok_or_else(|| anyhow!("cannot update a task without an id"))?;

        let _guard = self.write_lock.lock();
        let mut tasks = self.load_tasks()?;
        let slot = tasks
            .iter_mut()
            .find(|t| t.id == Some(id))
            .ok_or_else(|| StoreError::task_not_found(id))?;
        *slot = task.clone();
        self.save_tasks(&tasks)?;

        debug!(task_id = id, "updated task");
        Ok(())
    }
}

/// In-memory store with the same semantics as [`DataStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: Mutex<Vec<Task>>,
    projects: Mutex<Vec<Project>>,
}

impl MemoryStore {
    pub fn with_projects<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let projects = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| Project {
                id: idx as u64 + 1,
                name: name.into(),
            })
            .collect();
        Self {
            tasks: Mutex::new(Vec::new()),
            projects: Mutex::new(projects),
        }
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().clone()
    }
}

impl ProjectCatalog for MemoryStore {
    fn list_all(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.projects.lock().clone())
    }

    fn get(&self, id: u64) -> Result<Project, StoreError> {
        self.projects
            .lock()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| StoreError::project_not_found(id))
    }
}

impl TaskStore for MemoryStore {
    fn get_by_id(&self, id: u64) -> Result<Task, StoreError> {
        self.tasks
            .lock()
            .iter()
            .find(|t| t.id == Some(id))
            .cloned()
            .ok_or_else(|| StoreError::task_not_found(id))
    }

    fn insert(&self, task: &Task) -> Result<u64, StoreError> {
        let mut tasks = self.tasks.lock();
        let id = next_id(&tasks);
        let mut stored = task.clone();
        stored.id = Some(id);
        tasks.push(stored);
        Ok(id)
    }

    fn update(&self, task: &Task) -> Result<(), StoreError> {
        let id = task
            .id
            .ok_or_else(|| anyhow!("cannot update a task without an id"))?;
        let mut tasks = self.tasks.lock();
        let slot = tasks
            .iter_mut()
            .find(|t| t.id == Some(id))
            .ok_or_else(|| StoreError::task_not_found(id))?;
        *slot = task.clone();
        Ok(())
    }
}

fn next_id(tasks: &[Task]) -> u64 {
    tasks.iter().filter_map(|t| t.id).max().unwrap_or(0) + 1
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
