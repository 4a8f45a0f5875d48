pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fulfillment;
pub mod notify;
pub mod orchestration;
pub mod store;

pub use config::{Config, WithdrawConfig};
pub use db::{init_db, Repository, SqliteLedger};
pub use domain::{
    AccountStanding, AttemptId, CardType, CountryCode, GainId, OutboundEvent, WithdrawPayload,
    WithdrawalRecord, WithdrawalRequest,
};
pub use error::AppError;
pub use fulfillment::{FulfillmentGateway, GiftcardApiGateway, MockFulfillment};
pub use orchestration::{Collaborators, WithdrawReport, WithdrawalOrchestrator, WithdrawalState};
