use crate::layer::FileLogLayer;
use crate::worker::SinkHandle;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Конфигурация слоя логирования.
///
/// **Поля**
/// - `min_level`: least severe level written to the log files.
/// - `enable_stdout`: если `true`, поверх [`FileLogLayer`] добавляется
///   `tracing_subscriber::fmt::Layer` и события печатаются в консоль.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub min_level: Level,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            min_level: Level::INFO,
            enable_stdout: true,
        }
    }
}

/// Install a global `tracing` subscriber that writes events through `sink`.
///
/// **Parameters**
/// - `sink`: producer handle of a running sink, usually
///   [`FileLoggerProvider::handle`](crate::provider::FileLoggerProvider::handle).
/// - `config`: [`LayerConfig`].
///
/// **Errors**
///
/// Fails if a global subscriber has already been installed.
pub fn init_tracing_with_config(
    sink: SinkHandle,
    config: LayerConfig,
) -> Result<(), SetGlobalDefaultError> {
    let layer = FileLogLayer::new(sink, config.min_level);

    // Типы subscriber'а различаются, поэтому собираем его в двух вариантах.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// [`init_tracing_with_config`] with [`LayerConfig::default`].
pub fn init_tracing(sink: SinkHandle) -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(sink, LayerConfig::default())
}
