pub use tollgate_types::error::{Error, TgResult};

pub use tracing::{debug, debug_span, error, info, info_span, warn};

// vim: ts=4
