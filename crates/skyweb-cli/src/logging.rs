//! Tracing setup shared by the binaries.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log to stderr so stdout stays clean for JSON output. `RUST_LOG` still
/// applies on top of the crate directives.
pub fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive(format!("skyweb_refdb={level}").parse()?)
                .add_directive(format!("skyweb_cli={level}").parse()?),
        )
        .init();
    Ok(())
}
