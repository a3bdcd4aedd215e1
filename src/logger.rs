//! Structured event log on top of [`StorageEngine`]: one `log()` call fans out into up to six
//! writes covering {exact source, source context, global} × {exact level, any level}, so a reader
//! can later ask "all errors for this source", "all warnings+ in this context", or "everything
//! globally", without scanning.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use tempora_core::{Backend, EngineError, StorageEngine, TimestampedDatum};

const GLOBAL_CONTEXT: &str = "__clg_glb__";
const ANY_LEVEL: &str = "__clg_any__";
const SECONDS_PER_DAY: u64 = 60 * 60 * 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Info,
    Warn,
    Error,
    Debug,
}

impl Level {
    fn internal_data_name(self) -> &'static str {
        match self {
            Level::Info => "__clg_info__",
            Level::Warn => "__clg_warn__",
            Level::Error => "__clg_error__",
            Level::Debug => "__clg_debug__",
        }
    }
}

impl FromStr for Level {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Level::Info),
            "warn" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "debug" => Ok(Level::Debug),
            other => Err(ArgumentError::UnsupportedLevel(other.to_owned())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("unsupported log level '{0}'")]
    UnsupportedLevel(String),

    #[error("log_source was given without a source_context")]
    LogSourceWithoutContext,

    #[error("neither free text nor a time span was supplied")]
    NoSearchCriteria,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A decoded log entry: the reverse of the `source_context|log_source|level|message` rendering
/// `log()` stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub source_context: String,
    pub log_source: String,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

pub struct EventLoggerConfig {
    pub ttl_days_for_exact: u64,
    pub ttl_days_for_source_context: u64,
    pub ttl_days_for_global_context: u64,
    pub levels_for_source_context: Vec<Level>,
    pub levels_for_global_context: Vec<Level>,
}

impl Default for EventLoggerConfig {
    fn default() -> Self {
        Self {
            ttl_days_for_exact: 90,
            ttl_days_for_source_context: 30,
            ttl_days_for_global_context: 7,
            levels_for_source_context: vec![Level::Warn, Level::Error],
            levels_for_global_context: vec![Level::Warn, Level::Error],
        }
    }
}

pub struct EventLogger<B: Backend> {
    engine: StorageEngine<B>,
    ttl_exact: Duration,
    ttl_source_context: Duration,
    ttl_global_context: Duration,
    levels_for_source_context: Vec<Level>,
    levels_for_global_context: Vec<Level>,
}

impl<B: Backend> EventLogger<B> {
    pub fn new(engine: StorageEngine<B>, config: EventLoggerConfig) -> Self {
        Self {
            engine,
            ttl_exact: Duration::from_secs(config.ttl_days_for_exact * SECONDS_PER_DAY),
            ttl_source_context: Duration::from_secs(config.ttl_days_for_source_context * SECONDS_PER_DAY),
            ttl_global_context: Duration::from_secs(config.ttl_days_for_global_context * SECONDS_PER_DAY),
            levels_for_source_context: config.levels_for_source_context,
            levels_for_global_context: config.levels_for_global_context,
        }
    }

    pub fn info(&self, source_context: &str, log_source: &str, t: DateTime<Utc>, message: &str) -> Result<(), EngineError> {
        self.log(source_context, log_source, t, Level::Info, message)
    }

    pub fn warn(&self, source_context: &str, log_source: &str, t: DateTime<Utc>, message: &str) -> Result<(), EngineError> {
        self.log(source_context, log_source, t, Level::Warn, message)
    }

    pub fn error(&self, source_context: &str, log_source: &str, t: DateTime<Utc>, message: &str) -> Result<(), EngineError> {
        self.log(source_context, log_source, t, Level::Error, message)
    }

    pub fn debug(&self, source_context: &str, log_source: &str, t: DateTime<Utc>, message: &str) -> Result<(), EngineError> {
        self.log(source_context, log_source, t, Level::Debug, message)
    }

    /// As [`EventLogger::log`], but for callers that only have the level as a string (e.g. one
    /// read off an external config or request). Rejects anything outside `{info, warn, error,
    /// debug}` instead of silently coercing it.
    pub fn log_named_level(
        &self,
        source_context: &str,
        log_source: &str,
        t: DateTime<Utc>,
        level: &str,
        message: &str,
    ) -> Result<(), ArgumentError> {
        let level = Level::from_str(level)?;
        self.log(source_context, log_source, t, level, message)?;
        Ok(())
    }

    fn source_id(source_context: &str, log_source: &str) -> String {
        format!("{source_context}.{log_source}")
    }

    fn render(source_context: &str, log_source: &str, level: Level, message: &str) -> String {
        format!("{source_context}|{log_source}|{}|{message}", level.label())
    }

    pub fn log(&self, source_context: &str, log_source: &str, t: DateTime<Utc>, level: Level, message: &str) -> Result<(), EngineError> {
        let internal_message = Self::render(source_context, log_source, level, message);
        let source_id = Self::source_id(source_context, log_source);

        // Always fanned out to the exact pair — §4.5 defaults levels_for_exact to all four levels.
        let source_and_level = Some(
            TimestampedDatum::new(&source_id, level.internal_data_name(), t, internal_message.clone().into_bytes())
                .with_str_for_index(message),
        );
        let source_and_any = Some(
            TimestampedDatum::new(&source_id, ANY_LEVEL, t, internal_message.clone().into_bytes()).with_str_for_index(message),
        );

        let context_pair = self.levels_for_source_context.contains(&level).then(|| {
            (
                TimestampedDatum::new(source_context, level.internal_data_name(), t, internal_message.clone().into_bytes())
                    .with_str_for_index(message),
                TimestampedDatum::new(source_context, ANY_LEVEL, t, internal_message.clone().into_bytes()).with_str_for_index(message),
            )
        });

        let global_pair = self.levels_for_global_context.contains(&level).then(|| {
            (
                TimestampedDatum::new(GLOBAL_CONTEXT, level.internal_data_name(), t, internal_message.clone().into_bytes())
                    .with_str_for_index(message),
                TimestampedDatum::new(GLOBAL_CONTEXT, ANY_LEVEL, t, internal_message.into_bytes()).with_str_for_index(message),
            )
        });

        if self.ttl_exact == self.ttl_source_context && self.ttl_exact == self.ttl_global_context {
            let mut batch = vec![source_and_level, source_and_any];
            if let Some((level_datum, any_datum)) = context_pair {
                batch.push(Some(level_datum));
                batch.push(Some(any_datum));
            }
            if let Some((level_datum, any_datum)) = global_pair {
                batch.push(Some(level_datum));
                batch.push(Some(any_datum));
            }
            self.engine.batch_insert_indexable_blobs_and_indexes(batch, Some(self.ttl_exact))?;
        } else {
            self.engine
                .batch_insert_indexable_blobs_and_indexes(vec![source_and_level, source_and_any], Some(self.ttl_exact))?;

            if let Some((level_datum, any_datum)) = context_pair {
                self.engine.batch_insert_indexable_blobs_and_indexes(
                    vec![Some(level_datum), Some(any_datum)],
                    Some(self.ttl_source_context),
                )?;
            }

            if let Some((level_datum, any_datum)) = global_pair {
                self.engine
                    .batch_insert_indexable_blobs_and_indexes(vec![Some(level_datum), Some(any_datum)], Some(self.ttl_global_context))?;
            }
        }

        Ok(())
    }

    fn load(
        &self,
        free_text: Option<&str>,
        source_context: Option<&str>,
        log_source: Option<&str>,
        level: Option<Level>,
        t_from: Option<DateTime<Utc>>,
        t_to: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogMessage>, ArgumentError> {
        if log_source.is_some() && source_context.is_none() {
            return Err(ArgumentError::LogSourceWithoutContext);
        }
        if free_text.is_none() && t_from.is_none() && t_to.is_none() {
            return Err(ArgumentError::NoSearchCriteria);
        }

        let data_name = level.map(Level::internal_data_name).unwrap_or(ANY_LEVEL);
        let source_id = match (source_context, log_source) {
            (Some(ctx), Some(src)) => Self::source_id(ctx, src),
            (Some(ctx), None) => ctx.to_owned(),
            (None, _) => GLOBAL_CONTEXT.to_owned(),
        };

        let tuples = if let Some(free_text) = free_text {
            self.engine
                .get_blobs_by_free_text(&source_id, data_name, free_text, t_from, t_to, true)?
                .into_tuples()
        } else {
            self.engine
                .get_range(&source_id, data_name, t_from.unwrap_or(DateTime::<Utc>::MIN_UTC), t_to.unwrap_or(Utc::now()), None)?
        };

        Ok(tuples
            .into_iter()
            .filter_map(|(timestamp, value)| {
                let message = String::from_utf8_lossy(&value);
                let mut parts = message.splitn(4, '|');
                Some(LogMessage {
                    source_context: parts.next()?.to_owned(),
                    log_source: parts.next()?.to_owned(),
                    level: parts.next()?.to_owned(),
                    message: parts.next()?.to_owned(),
                    timestamp,
                })
            })
            .collect())
    }

    pub fn free_text_search(
        &self,
        free_text: Option<&str>,
        source_context: Option<&str>,
        log_source: Option<&str>,
        level: Option<Level>,
        t_from: Option<DateTime<Utc>>,
        t_to: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogMessage>, ArgumentError> {
        self.load(free_text, source_context, log_source, level, t_from, t_to)
    }

    pub fn load_by_date_range(
        &self,
        source_context: Option<&str>,
        log_source: Option<&str>,
        level: Option<Level>,
        t_from: Option<DateTime<Utc>>,
        t_to: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogMessage>, ArgumentError> {
        self.load(None, source_context, log_source, level, t_from, t_to)
    }
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Debug => "debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempora_core::testing::MemoryBackend;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn logger(config: EventLoggerConfig) -> EventLogger<MemoryBackend> {
        EventLogger::new(StorageEngine::new(MemoryBackend::new(), 5), config)
    }

    #[test]
    fn error_is_visible_at_source_context_and_global_scope() {
        let log = logger(EventLoggerConfig::default());
        let t = dt(2024, 1, 1, 12, 0, 0);
        log.error("payments", "charge-worker", t, "card declined").unwrap();

        let exact = log
            .load_by_date_range(Some("payments"), Some("charge-worker"), Some(Level::Error), Some(t), Some(t + chrono::Duration::seconds(1)))
            .unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].message, "card declined");
        assert_eq!(exact[0].source_context, "payments");
        assert_eq!(exact[0].log_source, "charge-worker");

        let context_any = log
            .load_by_date_range(Some("payments"), None, None, Some(t), Some(t + chrono::Duration::seconds(1)))
            .unwrap();
        assert_eq!(context_any.len(), 1);

        let global = log
            .load_by_date_range(None, None, Some(Level::Error), Some(t), Some(t + chrono::Duration::seconds(1)))
            .unwrap();
        assert_eq!(global.len(), 1);
    }

    #[test]
    fn info_is_not_promoted_to_context_or_global_scope() {
        let log = logger(EventLoggerConfig::default());
        let t = dt(2024, 1, 1, 12, 0, 0);
        log.info("payments", "charge-worker", t, "charge succeeded").unwrap();

        let exact = log
            .load_by_date_range(Some("payments"), Some("charge-worker"), Some(Level::Info), Some(t), Some(t + chrono::Duration::seconds(1)))
            .unwrap();
        assert_eq!(exact.len(), 1);

        let context_any = log
            .load_by_date_range(Some("payments"), None, None, Some(t), Some(t + chrono::Duration::seconds(1)))
            .unwrap();
        assert!(context_any.is_empty());
    }

    #[test]
    fn free_text_search_finds_the_message() {
        let log = logger(EventLoggerConfig::default());
        let t = dt(2024, 1, 1, 12, 0, 0);
        log.warn("payments", "charge-worker", t, "retrying after timeout").unwrap();

        let found = log.free_text_search(Some("timeout"), Some("payments"), None, None, None, None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "retrying after timeout");
    }

    #[test]
    fn free_text_search_finds_the_word_immediately_after_the_level() {
        // The stored value is "payments|charge-worker|error|card declined" — without indexing
        // over the plain message, "card" would only be findable fused to the level as "error|card".
        let log = logger(EventLoggerConfig::default());
        let t = dt(2024, 1, 1, 12, 0, 0);
        log.error("payments", "charge-worker", t, "card declined").unwrap();

        let found = log.free_text_search(Some("card"), Some("payments"), None, None, None, None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].message, "card declined");
    }

    #[test]
    fn log_named_level_accepts_the_four_supported_names() {
        let log = logger(EventLoggerConfig::default());
        let t = dt(2024, 1, 1, 12, 0, 0);
        log.log_named_level("payments", "charge-worker", t, "error", "card declined").unwrap();

        let exact = log
            .load_by_date_range(Some("payments"), Some("charge-worker"), Some(Level::Error), Some(t), Some(t + chrono::Duration::seconds(1)))
            .unwrap();
        assert_eq!(exact.len(), 1);
    }

    #[test]
    fn log_named_level_rejects_an_unsupported_name() {
        let log = logger(EventLoggerConfig::default());
        let t = dt(2024, 1, 1, 12, 0, 0);
        let err = log.log_named_level("payments", "charge-worker", t, "critical", "oops").unwrap_err();
        assert!(matches!(err, ArgumentError::UnsupportedLevel(name) if name == "critical"));
    }

    #[test]
    fn log_source_without_context_is_rejected() {
        let log = logger(EventLoggerConfig::default());
        let t = dt(2024, 1, 1, 12, 0, 0);
        let err = log.load_by_date_range(None, Some("charge-worker"), None, Some(t), Some(t)).unwrap_err();
        assert!(matches!(err, ArgumentError::LogSourceWithoutContext));
    }

    #[test]
    fn missing_search_criteria_is_rejected() {
        let log = logger(EventLoggerConfig::default());
        let err = log.load_by_date_range(Some("payments"), None, None, None, None).unwrap_err();
        assert!(matches!(err, ArgumentError::NoSearchCriteria));
    }

    #[test]
    fn unequal_ttls_still_log_all_three_tiers() {
        let config = EventLoggerConfig {
            ttl_days_for_global_context: 1,
            ..EventLoggerConfig::default()
        };
        let log = logger(config);
        let t = dt(2024, 1, 1, 12, 0, 0);
        log.error("payments", "charge-worker", t, "card declined").unwrap();

        let global = log
            .load_by_date_range(None, None, Some(Level::Error), Some(t), Some(t + chrono::Duration::seconds(1)))
            .unwrap();
        assert_eq!(global.len(), 1);
    }
}
