pub mod booking;
pub mod calendar;
pub mod exception_key;
pub mod expander;
pub mod lifecycle;
pub mod names;
pub mod occurrence;
pub mod store;

pub use booking::ScheduleBookingService;
pub use calendar::CalendarService;
pub use expander::OccurrenceExpander;
pub use lifecycle::OccurrenceLifecycle;
pub use names::{DisplayNameCache, NameDirectory, NameSource};
pub use occurrence::OccurrenceService;
pub use store::{RealtimeScheduleStore, ScheduleStore};
