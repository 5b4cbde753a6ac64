//! Standard APIs we use everywhere.

pub use anyhow::{Context as _, Result, anyhow};
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use serde_json::{Value, json};
#[allow(unused_imports)]
pub use tracing::{debug, error, info, instrument, trace, warn};
