#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Settings for the voxwatch tracker.
//!
//! A [`Config`] is assembled from up to four layers, later ones winning:
//!
//! | layer | source |
//! |---|---|
//! | defaults | `defaults.toml`, embedded at build time |
//! | env | `VOXWATCH_*`, only for fields no file set |
//! | user | `config.toml` under `~/.voxwatch` or `$VOXWATCH_HOME` |
//! | `--config` | a file named on the command line |
//!
//! The loader records which layer supplied every field so `check-config`
//! can print it next to the value.
//!
//! ```rust,no_run
//! use voxwatch_config::Config;
//!
//! # fn main() -> Result<(), voxwatch_config::ConfigError> {
//! let resolved = Config::load(None)?;
//! for id in &resolved.config.watch.channel_ids {
//!     println!("watching {id}");
//! }
//! # Ok(())
//! # }
//! ```

mod env;
/// Error type.
pub mod error;
/// File discovery and layering.
pub mod loader;
/// TOML tree merge with per-field provenance.
pub mod merge;
/// Rendering the resolved config.
pub mod show;
/// Section structs.
pub mod types;
/// Rules applied after merging.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use merge::{ConfigLayer, FieldSources};
pub use show::{ResolvedConfig, ShowFormat};
pub use types::*;

impl Config {
    /// Resolve all layers from the default locations plus `explicit`.
    ///
    /// # Errors
    ///
    /// Any unreadable or malformed file, or a merged result that fails
    /// [`validate::validate`].
    pub fn load(explicit: Option<&std::path::Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(explicit, None)
    }
}
