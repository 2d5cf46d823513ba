//! Persistence layer.
//!
//! Durable records (users, pets, devices, schedules, feeding history) live
//! behind [`Db`], a SQLite database
//! whose schema lives in `migrations/`. Presence, queues and alert state are ephemeral and owned by
//! the services instead.

pub mod seed;
pub mod sqlite;

pub use sqlite::{Db, NewSchedule, ScheduleWithPet};
pub use seed::{SeedData, SeedError};
