//! Pure decision logic for withdrawals.
//!
//! This module provides:
//! - Payload validation into typed requests
//! - The eligibility pipeline (standing, email, balance, earnings)
//! - User-facing feedback texts

pub mod eligibility;
pub mod messages;
pub mod validator;

pub use eligibility::{EligibilityError, EligibilityFailure, EligibilityPipeline, EligibilityVerdict};
pub use validator::{RequestValidator, Selection, ValidationError};
