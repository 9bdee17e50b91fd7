//! `slurm_gcp_config` - the cluster description shared by the slurm-gcp node scripts.
//!
//! The deployment hands over its properties once; [`Config::new_config`]
//! normalizes them into nested [`Namespace`]s, resolves the derived fields and
//! [`Config::save`] writes the subset the nodes need. Every later step reads it
//! back with [`Config::load_config`].
//!
//! ```no_run
//! use slurm_gcp_config::Config;
//!
//! let cfg = Config::load_config("/slurm/scripts/config.yaml")?;
//! println!("{} runs in {:?}", cfg.hostname(), cfg.region());
//! # Ok::<(), slurm_gcp_config::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod names;
pub mod namespace;
pub mod process;
pub mod scope;
mod serialize;

pub use config::{Config, InstanceRole, RoleLookup, PROPERTIES, SAVED_PROPS};
pub use error::{Error, Result};
pub use host::{GceMetadata, Host, SystemHost};
pub use names::partition_of;
pub use namespace::{convert, convert_json, Namespace, Value};
pub use process::{run, spawn, Completed, RunOptions, SpawnOptions};
pub use scope::{with_dir, DirGuard};
pub use serialize::to_yaml_string;
