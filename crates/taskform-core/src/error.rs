/// Failures raised by the persistence collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Lookup miss on the catalog or the task store.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    /// The backing storage failed (I/O, parse).
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn task_not_found(id: u64) -> Self {
        Self::NotFound { entity: "task", id }
    }

    pub fn project_not_found(id: u64) -> Self {
        Self::NotFound {
            entity: "project",
            id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A save-blocking rule violation. Recovered locally by re-prompting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Enter task name")]
    NameBlank,

    #[error("Choose every week repeat days")]
    NoPickedDays,

    #[error("Choose project")]
    NoProject,

    #[error("Exact repeat date is empty")]
    RepeatDateBlank,
}
