//! `drip-scheduler` — when campaign runs happen and how sends are paced.
//!
//! # Overview
//!
//! Campaigns run once a day at a fixed UTC time, optionally skipping
//! weekends. The same schedule can be exported as an EventBridge cron
//! expression for deployments that trigger `drip run` externally, or driven
//! in-process by [`engine::SchedulerEngine`].
//!
//! | Item                        | Purpose                                        |
//! |-----------------------------|------------------------------------------------|
//! | [`create_cron_expression`]  | "HH:MM" + weekends flag → `cron(...)` string   |
//! | [`Schedule::next_run`]      | Next fire instant after a given time           |
//! | [`is_business_day`]         | US federal-holiday-aware weekday check         |
//! | [`RandomDelay`]             | Injectable throttle between sends              |

pub mod calendar;
pub mod engine;
pub mod error;
pub mod jitter;
pub mod schedule;

pub use calendar::is_business_day;
pub use engine::SchedulerEngine;
pub use error::{Result, ScheduleError};
pub use jitter::{generate_random_delay, RandomDelay};
pub use schedule::{create_cron_expression, Schedule};
