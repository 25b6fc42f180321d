//! Per-device stream queue registry

use crate::error::{Result, VisLinkError};
use crate::queue::{DataInputQueue, DataOutputQueue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Host queues of one device, keyed by stream name.
///
/// Built once in `Device::open` and never resized, so lookups need no lock.
#[derive(Debug, Default)]
pub struct QueueRegistry {
    outputs: BTreeMap<String, Arc<DataOutputQueue>>,
    inputs: BTreeMap<String, Arc<DataInputQueue>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_output(&mut self, queue: DataOutputQueue) -> Arc<DataOutputQueue> {
        let queue = Arc::new(queue);
        self.outputs.insert(queue.name().to_string(), queue.clone());
        queue
    }

    pub(crate) fn insert_input(&mut self, queue: DataInputQueue) -> Arc<DataInputQueue> {
        let queue = Arc::new(queue);
        self.inputs.insert(queue.name().to_string(), queue.clone());
        queue
    }

    pub fn output(&self, name: &str) -> Result<Arc<DataOutputQueue>> {
        self.outputs
            .get(name)
            .cloned()
            .ok_or_else(|| VisLinkError::NoSuchStream(name.to_string()))
    }

    pub fn input(&self, name: &str) -> Result<Arc<DataInputQueue>> {
        self.inputs
            .get(name)
            .cloned()
            .ok_or_else(|| VisLinkError::NoSuchStream(name.to_string()))
    }

    /// Lookup used on the hot path of the demultiplexer
    pub(crate) fn find_output(&self, name: &str) -> Option<&Arc<DataOutputQueue>> {
        self.outputs.get(name)
    }

    pub fn output_names(&self) -> Vec<String> {
        self.outputs.keys().cloned().collect()
    }

    pub fn input_names(&self) -> Vec<String> {
        self.inputs.keys().cloned().collect()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Arc<DataOutputQueue>> {
        self.outputs.values()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Arc<DataInputQueue>> {
        self.inputs.values()
    }

    pub fn close_all(&self) {
        for queue in self.outputs.values() {
            queue.close();
        }
        for queue in self.inputs.values() {
            queue.close();
        }
    }
}
