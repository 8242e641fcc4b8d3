pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod session;

pub use api::{router, ApiError, AppState};
pub use config::{db_path_from_env, StudioConfig};
pub use database::Database;
pub use error::{Result, StoryError};
pub use export::{export_file_name, read_snapshot, snapshot, write_snapshot};
pub use session::{Deletion, Outcome, Session, WorkingSet};
