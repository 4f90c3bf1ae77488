//! HTTP front end for the mall concierge.
//!
//! - `POST /chat`: run one conversational turn
//! - `GET /history/{thread_id}`: stored turns of a thread
//! - `POST /push`: ingest a JSON array of shops
//! - `GET /healthz`

pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::{Cli, ConfigError, FileConfig};
pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
