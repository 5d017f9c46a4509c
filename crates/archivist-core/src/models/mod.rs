//! Data models shared by the session store and the HTTP clients.
//!
//! - `User`: the authenticated account record returned by the auth backend
//! - `Record`: a row of the spreadsheet-backed resource list
//!
//! Both accept identifiers that arrive as either JSON numbers or strings and
//! normalize them to text, so lookups by id never mismatch on type.

pub mod id;
pub mod record;
pub mod user;

pub use id::normalize_id;
pub use record::{Record, RecordsResponse};
pub use user::User;
