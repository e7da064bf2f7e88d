pub mod app_state;
pub mod cancel;
pub mod config;
pub mod errors;
pub mod tools_registry;
pub mod types;

pub use app_state::AppState;
pub use cancel::CancelToken;
pub use errors::{AppError, AppResult};
