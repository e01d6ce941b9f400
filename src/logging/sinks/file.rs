use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::config::LoggingConfig;

/// File layer с ежедневной ротацией и неблокирующей записью.
///
/// `WorkerGuard` нужно держать живым до конца работы: при его drop
/// буфер сбрасывается на диск.
pub fn layer_with_config<S>(
    config: &LoggingConfig,
) -> (Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let file_appender = rolling::daily(&config.log_dir, &config.file_name);
    let (writer, guard) = non_blocking(file_appender);

    let layer = fmt::layer()
        .with_ansi(false)
        .with_target(config.with_target)
        .with_writer(writer);

    (Box::new(layer), guard)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;

    /// Тест проверяет, что события попадают в файл в каталоге лога после
    /// drop'а guard'а.
    #[test]
    fn test_file_layer_writes_into_log_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = LoggingConfig {
            file_enabled: true,
            log_dir: tmp.path().to_path_buf(),
            file_name: "test.log".into(),
            ..Default::default()
        };

        let (layer, guard) = layer_with_config(&cfg);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("written to file");
        });
        drop(guard);

        let contents: String = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("test.log")
            })
            .map(|entry| fs::read_to_string(entry.path()).unwrap())
            .collect();
        assert!(contents.contains("written to file"));
    }
}
