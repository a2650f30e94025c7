pub use crate::error::{Error, TgResult};

pub use tracing::{debug, error, info, warn};

// vim: ts=4
