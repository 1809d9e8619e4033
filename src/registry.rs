//! Fixed-capacity task registry.
//!
//! Identities are chosen by the boot code, handles by the kernel. The
//! registry binds the two once and never releases either, so the tracer can
//! go from the kernel's current handle to a record without scanning names.

use heapless::LinearMap;

use crate::config::MAX_TASKS;
use crate::error::RegistryError;
use crate::port::TaskHandle;
use crate::task::{TaskId, TaskRecord};

pub struct TaskRegistry {
    slots: [Option<TaskRecord>; MAX_TASKS],
    by_handle: LinearMap<TaskHandle, TaskId, MAX_TASKS>,
}

impl TaskRegistry {
    /// All slots cleared.
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            by_handle: LinearMap::new(),
        }
    }

    /// Bind `handle` to identity `id` under `name`.
    ///
    /// The record is built in full before it becomes visible, so a failed
    /// call leaves the registry untouched.
    pub fn register(
        &mut self,
        id: usize,
        name: &str,
        handle: TaskHandle,
    ) -> Result<TaskId, RegistryError> {
        if id >= MAX_TASKS {
            return Err(RegistryError::IdOutOfRange { id });
        }
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let task_id = TaskId::from_index(id);
        if self.slots[id].is_some() {
            return Err(RegistryError::IdInUse(task_id));
        }
        if self.by_handle.contains_key(&handle) {
            return Err(RegistryError::HandleInUse(handle));
        }

        // Cannot overflow: one map entry per occupied slot.
        self.by_handle
            .insert(handle, task_id)
            .map_err(|_| RegistryError::HandleInUse(handle))?;
        self.slots[id] = Some(TaskRecord::new(task_id, name, handle));
        Ok(task_id)
    }

    pub fn lookup(&self, handle: TaskHandle) -> Option<TaskId> {
        self.by_handle.get(&handle).copied()
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskRecord> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskRecord> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn record_for_mut(&mut self, handle: TaskHandle) -> Option<&mut TaskRecord> {
        let id = self.lookup(handle)?;
        self.get_mut(id)
    }

    pub fn name(&self, id: TaskId) -> Option<&str> {
        self.get(id).map(TaskRecord::name)
    }

    /// Registered records in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
