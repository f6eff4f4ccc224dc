use crate::scheduler::job::JobDefinition;

/// The scheduler-owned schedule list.
///
/// Entries are job definitions ordered by `(next_run, id)` ascending;
/// unscheduled entries (`next_run == None`) sort last and never fire. At
/// most one entry exists per job id. The list is confined to the scheduler
/// task; nothing else touches it.
#[derive(Debug, Default)]
pub struct EntryList {
    entries: Vec<JobDefinition>,
}

impl EntryList {
    pub fn new(entries: Vec<JobDefinition>) -> Self {
        Self { entries }
    }

    /// Sort by `(next_run, id)`; `None` next runs go last.
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| match (a.next_run, b.next_run) {
            (None, None) => a.id.cmp(&b.id),
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (Some(_), None) => std::cmp::Ordering::Less,
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.id.cmp(&b.id)),
        });
    }

    /// Insert a job, replacing any existing entry with the same id.
    pub fn upsert(&mut self, job: JobDefinition) {
        match self.entries.iter_mut().find(|e| e.id == job.id) {
            Some(existing) => *existing = job,
            None => self.entries.push(job),
        }
    }

    /// Remove the entry with the given id. Returns whether one was found.
    pub fn remove(&mut self, job_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != job_id);
        self.entries.len() != before
    }

    /// The earliest scheduled fire time, if any entry is scheduled at all.
    pub fn earliest(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.entries.first().and_then(|e| e.next_run)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut JobDefinition> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn job(id: &str, next_run: Option<i64>) -> JobDefinition {
        JobDefinition {
            id: id.to_string(),
            command: "/bin/true".to_string(),
            args: vec![],
            cron_expr: "* * * * *".to_string(),
            run_as_user: String::new(),
            next_run: next_run.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
            last_run: None,
        }
    }

    #[test]
    fn sort_orders_by_next_run_then_id() {
        let mut list = EntryList::new(vec![
            job("b", Some(100)),
            job("a", Some(100)),
            job("c", Some(50)),
        ]);
        list.sort();
        let ids: Vec<_> = list.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn unscheduled_entries_sort_last() {
        let mut list = EntryList::new(vec![job("parked", None), job("due", Some(10))]);
        list.sort();
        assert_eq!(list.entries[0].id, "due");
        assert_eq!(list.earliest(), Some(Utc.timestamp_opt(10, 0).unwrap()));
    }

    #[test]
    fn earliest_is_none_when_all_parked() {
        let mut list = EntryList::new(vec![job("x", None)]);
        list.sort();
        assert!(list.earliest().is_none());
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut list = EntryList::new(vec![job("a", Some(10))]);
        list.upsert(job("a", Some(99)));
        assert_eq!(list.len(), 1);
        assert_eq!(
            list.entries[0].next_run,
            Some(Utc.timestamp_opt(99, 0).unwrap())
        );
    }

    #[test]
    fn remove_missing_is_reported() {
        let mut list = EntryList::new(vec![job("a", Some(10))]);
        assert!(!list.remove("ghost"));
        assert!(list.remove("a"));
        assert!(list.is_empty());
    }
}
