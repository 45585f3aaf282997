//! Domain model (ids, status state machine, status record, progress math, errors).
//!
//! Everything here is pure: no store access, no clock. The `app` layer feeds
//! in the raw fields and the current time.

pub mod errors;
pub mod ids;
pub mod progress;
pub mod record;
pub mod state;

pub use self::errors::{JobError, StatusError, StoreError};
pub use self::ids::Jid;
pub use self::record::{DEFAULT_TOTAL, FieldMap, StatusRecord, fields};
pub use self::state::{JobStatus, StatusLabel, UnknownStatus};
