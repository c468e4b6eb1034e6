//! Fixed-capacity task lists.
//!
//! A [`TaskList`] holds task identifiers together with the priority they
//! were linked at. Priority-ordered lists keep the highest priority at the
//! head and are FIFO among equal priorities; FIFO lists append at the
//! tail. Capacity is [`MAX_TASKS`], so a list can hold every task in the
//! system and insertion only fails if the task table itself is broken.

use kestrel_core::config::MAX_TASKS;
use kestrel_core::task::TaskId;
use planck_noalloc::vec::ArrayVec;

/// Insertion discipline of a [`TaskList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    /// Descending priority, FIFO among equals.
    Priority,
    /// Arrival order.
    Fifo,
}

/// One linked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// The task.
    pub id: TaskId,
    /// Priority the task was linked with.
    pub priority: u8,
}

/// An ordered list of tasks.
pub struct TaskList {
    entries: ArrayVec<Entry, MAX_TASKS>,
    order: ListOrder,
}

impl TaskList {
    /// Creates an empty list with the given discipline.
    #[must_use]
    pub const fn new(order: ListOrder) -> Self {
        Self {
            entries: ArrayVec::new(),
            order,
        }
    }

    /// Creates an empty priority-ordered list.
    #[must_use]
    pub const fn prioritized() -> Self {
        Self::new(ListOrder::Priority)
    }

    /// Creates an empty FIFO list.
    #[must_use]
    pub const fn fifo() -> Self {
        Self::new(ListOrder::Fifo)
    }

    /// Insertion discipline.
    #[must_use]
    pub fn order(&self) -> ListOrder {
        self.order
    }

    /// The first task, if any.
    #[must_use]
    pub fn head(&self) -> Option<TaskId> {
        self.entries.as_slice().first().map(|e| e.id)
    }

    /// Number of linked tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is linked here.
    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.position(id).is_some()
    }

    /// Linked entries, head first.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        self.entries.as_slice()
    }

    /// Linked task identifiers, head first.
    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    /// Links `id` according to the list discipline and returns `true` if it
    /// became the new head.
    ///
    /// # Panics
    ///
    /// Panics if the list is already full, which means more than
    /// [`MAX_TASKS`] tasks are linked in total.
    pub fn insert(&mut self, id: TaskId, priority: u8) -> bool {
        let slot = match self.order {
            ListOrder::Fifo => self.entries.len(),
            ListOrder::Priority => self
                .entries
                .iter()
                .position(|e| e.priority < priority)
                .unwrap_or(self.entries.len()),
        };
        assert!(!self.entries.is_full(), "task list overflow");
        self.entries.push(Entry { id, priority });
        self.entries.as_mut_slice()[slot..].rotate_right(1);
        slot == 0
    }

    /// Unlinks `id`. Returns `Some(true)` if it was the head, `Some(false)`
    /// if it was further down, `None` if it was not linked.
    pub fn remove(&mut self, id: TaskId) -> Option<bool> {
        let slot = self.position(id)?;
        self.entries.as_mut_slice()[slot..].rotate_left(1);
        self.entries.pop();
        Some(slot == 0)
    }

    /// Unlinks and returns the head.
    pub fn pop_head(&mut self) -> Option<Entry> {
        if self.entries.is_empty() {
            return None;
        }
        self.entries.as_mut_slice().rotate_left(1);
        self.entries.pop()
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &TaskList) -> Vec<u32> {
        list.ids().map(|id| id.0).collect()
    }

    #[test]
    fn priority_order_descending() {
        let mut list = TaskList::prioritized();
        assert!(list.insert(TaskId(1), 5));
        assert!(list.insert(TaskId(2), 10));
        assert!(!list.insert(TaskId(3), 7));
        assert_eq!(ids(&list), [2, 3, 1]);
    }

    #[test]
    fn equal_priority_goes_behind_peers() {
        let mut list = TaskList::prioritized();
        list.insert(TaskId(1), 5);
        assert!(!list.insert(TaskId(2), 5));
        list.insert(TaskId(3), 5);
        assert_eq!(ids(&list), [1, 2, 3]);
    }

    #[test]
    fn fifo_appends() {
        let mut list = TaskList::fifo();
        assert!(list.insert(TaskId(1), 1));
        assert!(!list.insert(TaskId(2), 200));
        assert_eq!(ids(&list), [1, 2]);
        assert_eq!(list.order(), ListOrder::Fifo);
    }

    #[test]
    fn remove_reports_head_change() {
        let mut list = TaskList::prioritized();
        list.insert(TaskId(1), 9);
        list.insert(TaskId(2), 3);
        list.insert(TaskId(3), 1);
        assert_eq!(list.remove(TaskId(2)), Some(false));
        assert_eq!(list.remove(TaskId(1)), Some(true));
        assert_eq!(list.remove(TaskId(1)), None);
        assert_eq!(list.head(), Some(TaskId(3)));
    }

    #[test]
    fn pop_head_drains_in_order() {
        let mut list = TaskList::prioritized();
        list.insert(TaskId(1), 2);
        list.insert(TaskId(2), 8);
        assert_eq!(list.pop_head().map(|e| e.id), Some(TaskId(2)));
        assert_eq!(list.pop_head().map(|e| e.id), Some(TaskId(1)));
        assert!(list.pop_head().is_none());
        assert!(list.is_empty());
    }

    #[test]
    fn entries_carry_priority() {
        let mut list = TaskList::prioritized();
        list.insert(TaskId(4), 42);
        assert_eq!(list.entries(), &[Entry { id: TaskId(4), priority: 42 }]);
        assert!(list.contains(TaskId(4)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    #[should_panic(expected = "task list overflow")]
    fn overflow_panics() {
        let mut list = TaskList::fifo();
        for n in 0..=MAX_TASKS {
            list.insert(TaskId(u32::try_from(n).unwrap()), 1);
        }
    }
}
