//! Planning domain module: follow-up tasks and calendar events.

pub mod event;
pub mod task;

pub use event::{CalendarEvent, EventDraft, EventKind, EventPatch, EventStatus};
pub use task::{Task, TaskDraft, TaskPatch, TaskPriority, TaskStatus};
