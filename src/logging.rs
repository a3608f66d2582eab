//! Logging setup and the startup summary event.

use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Version reported at startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Filter used when `RUST_LOG` is not set.
pub fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        concat!(
            "info,redis_cloudwatch=debug,",
            "aws_config=debug,aws_sdk_cloudwatch=debug,aws_smithy_runtime=debug"
        )
    } else {
        "info"
    }
}

/// Initialize tracing to stderr. `RUST_LOG` overrides the verbosity flag.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

/// Log the effective configuration. The redis password is never included.
pub fn log_startup(config: &Config) {
    let credential_file = config
        .aws
        .credential_file
        .as_ref()
        .map(|p| p.display().to_string());

    tracing::info!(
        use_iam = config.aws.use_iam,
        sleep_time = ?config.interval,
        aws_region = %config.aws.region,
        metric_name = %config.metric.name,
        to_cloudwatch = config.publish,
        redis_servers = ?config.server_addresses(),
        version = VERSION,
        verbose_logging = config.verbose,
        redis_list_name = %config.list_key,
        metric_namespace = %config.metric.namespace,
        application_lock_file = %config.lock_file.display(),
        redis_database = config.redis_db().filter(|db| *db != 0),
        aws_credentialfile = credential_file.as_deref(),
        aws_credential_profile = config.aws.credential_profile.as_deref(),
        "Starting application"
    );
}
