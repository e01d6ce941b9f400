use tracing_subscriber::EnvFilter;

use crate::logging::config::LoggingConfig;

pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    // Директива из конфига (например "info,feedbridge=info")
    let directive = config.build_filter_directive();

    // RUST_LOG, если задан, имеет приоритет.
    match EnvFilter::try_from_default_env() {
        Ok(env_filter) => env_filter,
        Err(_) => match EnvFilter::try_new(&directive) {
            Ok(filter) => filter,
            Err(e) => {
                eprintln!(
                    "Invalid log filter directive from config ('{directive}'): {e}; \
                     falling back to 'info'"
                );
                EnvFilter::new("info")
            }
        },
    }
}
