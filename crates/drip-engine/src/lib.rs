//! `drip-engine` — decides which campaign email each owner gets next and
//! delivers it exactly once.
//!
//! A run flows through four stages:
//!
//! 1. [`context::ContextBuilder`] folds the raw owner batch into one
//!    [`context::OwnerContext`] per owner.
//! 2. [`campaigns::rules_for`] yields the ordered [`rule::CampaignRule`]s.
//! 3. [`decision::resolve`] walks those rules: skips are recorded and the
//!    walk continues, a pause stops it, the first sendable rule wins.
//! 4. [`driver::CampaignDriver`] reserves the ledger slot, delivers through a
//!    [`mailer::Mailer`] and confirms or releases the reservation.

pub mod campaigns;
pub mod context;
pub mod decision;
pub mod driver;
pub mod error;
pub mod format;
pub mod mailer;
pub mod rule;

pub use context::{ContextBuilder, OwnerContext, Recipient};
pub use decision::{next_action, resolve, Decision, Outcome, Resolution};
pub use driver::{CampaignDriver, CampaignSummary, DriverOptions};
pub use error::{EngineError, Result};
pub use mailer::{DeliveryReceipt, LogMailer, Mailer, MailerError, OutgoingEmail, ResendMailer};
pub use rule::{CampaignRule, RenderedEmail, Rule};
