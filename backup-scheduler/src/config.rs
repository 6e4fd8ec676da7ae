use backup_engine::config::EngineConfig;
use backup_engine::snapshot::DueWindow;
use chrono::{DateTime, FixedOffset, Offset, Utc, Weekday};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub log_level: String,
    pub log_buffer_lines: usize,
    /// Offset of the local clock used for snapshot names and due windows
    pub utc_offset_hours: i32,
    pub cron_hourly: String,
    pub cron_daily: String,
    pub cron_weekly: String,
    pub due_window: DueWindow,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let vars = Vars(var);

        let mut engine = EngineConfig::default();
        engine.remote.host = vars.text("SFTP_HOST", &engine.remote.host);
        engine.remote.port = vars.parse("SFTP_PORT").unwrap_or(engine.remote.port);
        engine.remote.username = vars.text("SFTP_USERNAME", "");
        engine.remote.password = vars.text("SFTP_PASSWORD", "");
        engine.remote.root = vars.text("REMOTE_ROOT", &engine.remote.root);
        engine.pool.workers = vars.parse("WORKER_COUNT").unwrap_or(engine.pool.workers);
        engine.pool.queue_timeout_secs = vars.parse("QUEUE_TIMEOUT_SECS").unwrap_or(engine.pool.queue_timeout_secs);
        engine.retention.hourly_max_age_hours =
            vars.parse("RETENTION_HOURLY_HOURS").unwrap_or(engine.retention.hourly_max_age_hours);
        engine.retention.daily_max_age_hours =
            vars.parse("RETENTION_DAILY_HOURS").unwrap_or(engine.retention.daily_max_age_hours);
        engine.retention.weekly_max_age_hours =
            vars.parse("RETENTION_WEEKLY_HOURS").unwrap_or(engine.retention.weekly_max_age_hours);
        engine.retention.max_total_bytes = vars.parse("MAX_TOTAL_BYTES").unwrap_or(engine.retention.max_total_bytes);
        if let Some(dir) = vars.get("BACKUPS_DIR") {
            engine.storage.backups_dir = PathBuf::from(dir);
        }

        let defaults = DueWindow::default();
        let due_window = DueWindow {
            hourly_start_hour: vars.parse("HOURLY_WINDOW_START").unwrap_or(defaults.hourly_start_hour),
            hourly_end_hour: vars.parse("HOURLY_WINDOW_END").unwrap_or(defaults.hourly_end_hour),
            weekly_day: vars.get("WEEKLY_DAY")
                .and_then(|v| Weekday::from_str(v.trim()).ok())
                .unwrap_or(defaults.weekly_day),
        };

        Self {
            port: vars.parse("PORT").unwrap_or(8080),
            log_level: vars.text("LOG_LEVEL", "info"),
            log_buffer_lines: vars.parse("LOG_BUFFER_LINES").unwrap_or(200),
            utc_offset_hours: vars.parse("UTC_OFFSET_HOURS").unwrap_or(3),
            // 14:00-21:00 local at UTC+3
            cron_hourly: vars.text("CRON_HOURLY", "0 0 11-18 * * *"),
            // 02:00 local
            cron_daily: vars.text("CRON_DAILY", "0 0 23 * * *"),
            // Sunday 02:00 local
            cron_weekly: vars.text("CRON_WEEKLY", "0 0 23 * * Sat"),
            due_window,
            engine,
        }
    }

    pub fn local_offset(&self) -> FixedOffset {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn local_now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.local_offset())
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn text(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_map(&[]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.utc_offset_hours, 3);
        assert_eq!(config.engine.remote.root, "/world");
        assert_eq!(config.engine.pool.workers, 16);
        assert_eq!(config.engine.retention.max_total_bytes, 14 * 1024u64.pow(3));
        assert_eq!(config.due_window.weekly_day, Weekday::Sun);
        assert_eq!(config.local_offset().local_minus_utc(), 3 * 3600);
    }

    #[test]
    fn test_overrides() {
        let config = from_map(&[
            ("SFTP_HOST", "mc.example.net"),
            ("SFTP_PORT", "2022"),
            ("SFTP_USERNAME", "backup"),
            ("SFTP_PASSWORD", "hunter2"),
            ("WORKER_COUNT", "4"),
            ("MAX_TOTAL_BYTES", "1000"),
            ("BACKUPS_DIR", "/srv/backups"),
            ("WEEKLY_DAY", "Mon"),
            ("UTC_OFFSET_HOURS", "0"),
            ("PORT", "not-a-number"),
        ]);
        assert_eq!(config.engine.remote.host, "mc.example.net");
        assert_eq!(config.engine.remote.port, 2022);
        assert_eq!(config.engine.remote.username, "backup");
        assert_eq!(config.engine.pool.workers, 4);
        assert_eq!(config.engine.retention.max_total_bytes, 1000);
        assert_eq!(config.engine.storage.backups_dir, PathBuf::from("/srv/backups"));
        assert_eq!(config.due_window.weekly_day, Weekday::Mon);
        assert_eq!(config.local_offset().local_minus_utc(), 0);
        assert_eq!(config.port, 8080);
    }
}
