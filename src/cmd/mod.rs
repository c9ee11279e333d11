//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `scan`     | `Scan`           |
//! | `classify` | `Classify`       |
//! | `review`   | `Review`         |
//! | `config`   | `Config`         |

pub mod classify;
pub mod config;
pub mod review;
pub mod scan;

use anyhow::{Context, Result};

use medic::config::{MedicToml, ServerConfig};

pub use classify::cmd_classify;
pub use config::cmd_config;
pub use review::cmd_review;
pub use scan::cmd_scan;

fn find_server<'a>(config: &'a MedicToml, name: &str) -> Result<&'a ServerConfig> {
    config.server(name).with_context(|| {
        let known: Vec<&str> = config.servers.iter().map(|s| s.name.as_str()).collect();
        format!("No server named '{}' in medic.toml (known: {})", name, known.join(", "))
    })
}
