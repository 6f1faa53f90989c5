use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Env var holding a tracing filter directive, e.g. `bingwm_cli=debug`.
pub const LOG_ENV_VAR: &str = "BWM_LOG";

/// Initialize logging to stderr. Stdout is reserved for command output.
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let env_filter = if verbose {
        EnvFilter::try_from_env(LOG_ENV_VAR)
            .unwrap_or_else(|_| EnvFilter::new("warn"))
            .add_directive("bingwm_cli=debug".parse()?)
    } else {
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let fmt_layer = fmt::layer()
        .with_target(true)
        .without_time()
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}
