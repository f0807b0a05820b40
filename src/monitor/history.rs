use std::collections::VecDeque;

use super::verifier::PostTreatmentRecord;

pub const POST_TREATMENT_HISTORY_CAPACITY: usize = 10;

/// Ring buffer of the most recent post-treatment records, oldest first.
#[derive(Debug)]
pub struct PostTreatmentHistory {
    records: VecDeque<PostTreatmentRecord>,
    capacity: usize,
}

impl Default for PostTreatmentHistory {
    fn default() -> Self {
        Self::with_capacity(POST_TREATMENT_HISTORY_CAPACITY)
    }
}

impl PostTreatmentHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: PostTreatmentRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = PostTreatmentRecord>) {
        for record in records {
            self.push(record);
        }
    }

    pub fn latest(&self) -> Option<&PostTreatmentRecord> {
        self.records.back()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &PostTreatmentRecord> {
        self.records.iter()
    }
}
