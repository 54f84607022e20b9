//! Lifecycle logging.

use std::{fmt, sync::Arc};

use tracing::Level;

use crate::{
    error::{HookError, TransportError},
    message::{MessageAction, SseMessage},
    plugin::{HookResult, Plugin, PluginContext, PluginHooks},
    transport::OpenInfo,
};

/// Receives formatted log lines instead of `tracing`.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Writes one `<prefix> <what happened>` line per lifecycle event.
///
/// Lines go to `tracing` at the configured level; errors always log at ERROR.
#[derive(Clone)]
pub struct LogPlugin {
    prefix: String,
    level: Level,
    sink: Option<LogSink>,
}

impl Default for LogPlugin {
    fn default() -> Self {
        Self {
            prefix: "[SSE]".to_string(),
            level: Level::INFO,
            sink: None,
        }
    }
}

impl fmt::Debug for LogPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogPlugin")
            .field("prefix", &self.prefix)
            .field("level", &self.level)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl LogPlugin {
    /// `[SSE]` prefix at INFO level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Text written before every line.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Level for everything except errors.
    #[must_use]
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Send lines to `sink` instead of `tracing`.
    #[must_use]
    pub fn sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    fn emit(&self, level: Level, line: fmt::Arguments<'_>) {
        let line = format!("{} {}", self.prefix, line);
        if let Some(sink) = &self.sink {
            sink(&line);
            return;
        }
        match level {
            Level::ERROR => tracing::error!("{line}"),
            Level::WARN => tracing::warn!("{line}"),
            Level::INFO => tracing::info!("{line}"),
            Level::DEBUG => tracing::debug!("{line}"),
            Level::TRACE => tracing::trace!("{line}"),
        }
    }
}

impl PluginHooks for LogPlugin {
    fn name(&self) -> &'static str {
        "log"
    }

    fn before_connect(&self, ctx: &PluginContext) -> HookResult {
        self.emit(self.level, format_args!("connecting to {}", ctx.url()));
        Ok(())
    }

    fn on_open(&self, response: &OpenInfo, _ctx: &PluginContext) -> HookResult {
        self.emit(
            self.level,
            format_args!("connected, status: {}", response.status.as_u16()),
        );
        Ok(())
    }

    fn on_message(
        &self,
        message: &SseMessage,
        _ctx: &PluginContext,
    ) -> Result<MessageAction, HookError> {
        self.emit(
            self.level,
            format_args!("message: {} {}", message.event, message.data),
        );
        Ok(MessageAction::Unchanged)
    }

    fn on_error(&self, error: &TransportError, _ctx: &PluginContext) -> HookResult {
        self.emit(Level::ERROR, format_args!("error: {error}"));
        Ok(())
    }

    fn on_close(&self, _ctx: &PluginContext) -> HookResult {
        self.emit(self.level, format_args!("closed"));
        Ok(())
    }
}

impl Plugin for LogPlugin {
    fn install(self: Box<Self>, _ctx: &PluginContext) -> Box<dyn PluginHooks> {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, Weak};

    use http::{HeaderMap, StatusCode};

    use super::*;

    fn captured() -> (LogPlugin, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let plugin = LogPlugin::new().sink(move |line| sink.lock().unwrap().push(line.to_string()));
        (plugin, lines)
    }

    #[test]
    fn test_lifecycle_lines() {
        let (plugin, lines) = captured();
        let ctx = PluginContext::new(Weak::new());
        let info = OpenInfo {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        };

        plugin.on_open(&info, &ctx).unwrap();
        let action = plugin
            .on_message(&SseMessage::new("status", "start"), &ctx)
            .unwrap();
        plugin
            .on_error(&TransportError::status(StatusCode::BAD_GATEWAY), &ctx)
            .unwrap();
        plugin.on_close(&ctx).unwrap();

        assert_eq!(action, MessageAction::Unchanged);
        assert_eq!(
            *lines.lock().unwrap(),
            vec![
                "[SSE] connected, status: 200",
                "[SSE] message: status start",
                "[SSE] error: SSE request failed: 502 Bad Gateway",
                "[SSE] closed",
            ]
        );
    }

    #[test]
    fn test_custom_prefix() {
        let (plugin, lines) = captured();
        let plugin = plugin.prefix("[chat]");
        plugin.before_connect(&PluginContext::new(Weak::new())).unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["[chat] connecting to "]);
    }

    #[test]
    fn test_tracing_levels_do_not_panic() {
        let ctx = PluginContext::new(Weak::new());
        for level in [Level::TRACE, Level::DEBUG, Level::INFO, Level::WARN, Level::ERROR] {
            assert!(LogPlugin::new().level(level).on_close(&ctx).is_ok());
        }
    }
}
