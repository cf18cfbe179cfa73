pub mod auth;
pub mod bots;
pub mod coins;
pub mod credentials;
pub mod delivery;
pub mod error;
pub mod ledger;
pub mod messages;
pub mod middleware;
pub mod process;
pub mod router;

pub use router::router;
