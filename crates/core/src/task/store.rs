//! In-memory task and file metadata stores.
//!
//! Control-plane state only: a handful of entries per process, accessed a
//! few times per task, so one coarse lock per store is enough. The stores
//! are plain owned values handed to the pipeline entry points; nothing
//! here is process-wide.

use std::sync::{Mutex, MutexGuard, PoisonError};

use hashbrown::HashMap;

use crate::error::Error;
use crate::section::FilePurpose;

use super::{FileDescriptor, ReconTask};

/// Store of reconciliation tasks, keyed by task id.
#[derive(Debug, Default)]
pub struct TaskStore {
    inner: Mutex<HashMap<String, ReconTask>>,
}

impl TaskStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ReconTask>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a task, assigning `task-{n}` when the id is empty. Returns
    /// the stored id.
    pub fn save(&self, mut task: ReconTask) -> String {
        let mut tasks = self.lock();
        if task.id.is_empty() {
            task.id = format!("task-{}", tasks.len() + 1);
        }
        let id = task.id.clone();
        tasks.insert(id.clone(), task);
        id
    }

    /// # Errors
    ///
    /// [`Error::UnknownTask`] when the id is absent.
    pub fn get(&self, task_id: &str) -> Result<ReconTask, Error> {
        self.lock()
            .get(task_id)
            .cloned()
            .ok_or_else(|| Error::UnknownTask {
                task_id: task_id.to_owned(),
            })
    }

    /// Replace an existing task wholesale.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownTask`] when the id is absent.
    pub fn update(&self, task: ReconTask) -> Result<(), Error> {
        let mut tasks = self.lock();
        if !tasks.contains_key(&task.id) {
            return Err(Error::UnknownTask {
                task_id: task.id.clone(),
            });
        }
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// # Errors
    ///
    /// [`Error::UnknownTask`] when the id is absent.
    pub fn attach_primary_file(&self, task_id: &str, file_id: &str) -> Result<(), Error> {
        self.mutate(task_id, |task| {
            task.primary_file_id = Some(file_id.to_owned());
        })
    }

    /// # Errors
    ///
    /// [`Error::UnknownTask`] when the id is absent.
    pub fn attach_comparison_file(&self, task_id: &str, file_id: &str) -> Result<(), Error> {
        self.mutate(task_id, |task| {
            task.comparison_file_id = Some(file_id.to_owned());
        })
    }

    /// # Errors
    ///
    /// [`Error::UnknownTask`] when the id is absent.
    pub fn set_started(&self, task_id: &str) -> Result<(), Error> {
        self.mutate(task_id, |task| {
            task.has_begun = true;
        })
    }

    /// # Errors
    ///
    /// [`Error::UnknownTask`] when the id is absent.
    pub fn set_done(&self, task_id: &str) -> Result<(), Error> {
        self.mutate(task_id, |task| {
            task.is_done = true;
        })
    }

    fn mutate(&self, task_id: &str, apply: impl FnOnce(&mut ReconTask)) -> Result<(), Error> {
        let mut tasks = self.lock();
        let task = tasks.get_mut(task_id).ok_or_else(|| Error::UnknownTask {
            task_id: task_id.to_owned(),
        })?;
        apply(task);
        Ok(())
    }
}

/// Store of files attached to tasks, keyed by file id.
#[derive(Debug, Default)]
pub struct FileStore {
    inner: Mutex<HashMap<String, FileDescriptor>>,
}

impl FileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, FileDescriptor>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a file, assigning `file-{n}` when the id is empty. Returns
    /// the stored id.
    pub fn save(&self, mut file: FileDescriptor) -> String {
        let mut files = self.lock();
        if file.id.is_empty() {
            file.id = format!("file-{}", files.len() + 1);
        }
        let id = file.id.clone();
        files.insert(id.clone(), file);
        id
    }

    /// # Errors
    ///
    /// [`Error::UnknownFile`] when the id is absent.
    pub fn get(&self, file_id: &str) -> Result<FileDescriptor, Error> {
        self.lock()
            .get(file_id)
            .cloned()
            .ok_or_else(|| Error::UnknownFile {
                file_id: file_id.to_owned(),
            })
    }

    /// The primary file attached to a task.
    ///
    /// # Errors
    ///
    /// [`Error::MissingFile`] when no primary file is attached.
    pub fn primary_for_task(&self, task_id: &str) -> Result<FileDescriptor, Error> {
        self.for_task(task_id, FilePurpose::Primary)
    }

    /// The comparison file attached to a task.
    ///
    /// # Errors
    ///
    /// [`Error::MissingFile`] when no comparison file is attached.
    pub fn comparison_for_task(&self, task_id: &str) -> Result<FileDescriptor, Error> {
        self.for_task(task_id, FilePurpose::Comparison)
    }

    fn for_task(&self, task_id: &str, purpose: FilePurpose) -> Result<FileDescriptor, Error> {
        self.lock()
            .values()
            .find(|file| file.task_id == task_id && file.purpose == purpose)
            .cloned()
            .ok_or_else(|| Error::MissingFile {
                task_id: task_id.to_owned(),
                purpose,
            })
    }
}
