pub mod error;
pub mod id;
pub mod time;

pub use error::{CoreError, ErrorKind, Result};
pub use id::{generate_id, validate_id};
pub use time::{now_utc, to_rfc3339};
