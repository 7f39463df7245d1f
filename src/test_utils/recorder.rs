use std::sync::Mutex;

use crate::chain::{ChangeBatch, ChangeSubscriber};

/// Subscriber that keeps every batch it receives until taken.
#[derive(Default)]
pub struct RecordingSubscriber {
    batches: Mutex<Vec<ChangeBatch>>,
}

impl RecordingSubscriber {
    pub fn take(&self) -> Vec<ChangeBatch> {
        std::mem::take(&mut *self.batches.lock().unwrap())
    }
}

impl ChangeSubscriber for RecordingSubscriber {
    fn process_change(&self, batch: &ChangeBatch) {
        self.batches.lock().unwrap().push(batch.clone());
    }
}
