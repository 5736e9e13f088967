use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum LogFile {
    Map,
    Error,
    Respawn,
    Lag,
}

impl LogFile {
    const ALL: [(LogFile, &'static str, bool); 4] = [
        (LogFile::Map, "map.log", true),
        (LogFile::Error, "error.log", false),
        (LogFile::Respawn, "respawn.log", true),
        (LogFile::Lag, "lag.log", false),
    ];
}

struct Logger {
    files: Mutex<BTreeMap<LogFile, File>>,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

const HEADER_LINE: &str = "-------------------------------------------------------------------------------";
const HEADER_TITLE: &str = "worldgrid - map simulation core";

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Opens the log files under `<root>/log`. Calls after a successful init are no-ops.
pub fn init(root: &Path) -> Result<(), String> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let log_dir = root.join("log");
    std::fs::create_dir_all(&log_dir)
        .map_err(|err| format!("log directory create failed: {}", err))?;

    let mut files = BTreeMap::new();
    for (log_file, name, header) in LogFile::ALL {
        let path = log_dir.join(name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| format!("open log {} failed: {}", name, err))?;
        if header && file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
            write_header(&mut file, name)?;
        }
        files.insert(log_file, file);
    }

    LOGGER
        .set(Logger {
            files: Mutex::new(files),
        })
        .map_err(|_| "log system already initialized".to_string())?;
    Ok(())
}

pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

pub fn log_map(map_id: u32, message: &str) {
    log_timestamped(LogFile::Map, map_id, message);
}

pub fn log_error(map_id: u32, message: &str) {
    log_timestamped(LogFile::Error, map_id, message);
}

pub fn log_respawn(map_id: u32, message: &str) {
    log_timestamped(LogFile::Respawn, map_id, message);
}

pub fn log_lag(map_id: u32, message: &str) {
    log_timestamped(LogFile::Lag, map_id, message);
}

fn log_timestamped(log_file: LogFile, map_id: u32, message: &str) {
    if let Some(logger) = LOGGER.get() {
        let line = format_line(&Timestamp::now(), map_id, message);
        let _ = write_line(logger, log_file, &line);
    }
}

fn format_line(timestamp: &Timestamp, map_id: u32, message: &str) -> String {
    format!(
        "{:02}.{:02}.{} {:02}:{:02}:{:02} ({}): {}\n",
        timestamp.day,
        timestamp.month,
        timestamp.year,
        timestamp.hour,
        timestamp.minute,
        timestamp.second,
        map_id,
        message
    )
}

fn write_line(logger: &Logger, log_file: LogFile, line: &str) -> std::io::Result<()> {
    let mut files = logger
        .files
        .lock()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "log lock poisoned"))?;
    if let Some(file) = files.get_mut(&log_file) {
        file.write_all(line.as_bytes())?;
        file.flush()?;
    }
    Ok(())
}

fn write_header(file: &mut File, name: &str) -> Result<(), String> {
    let ts = Timestamp::now();
    let month = MONTHS[(ts.month as usize).saturating_sub(1).min(11)];
    let started = format!(
        "{month} {:>2} {:02}:{:02}:{:02} {}",
        ts.day, ts.hour, ts.minute, ts.second, ts.year
    );
    for line in [
        HEADER_LINE.to_string(),
        HEADER_TITLE.to_string(),
        format!("{name} - started {started}"),
    ] {
        writeln!(file, "{line}").map_err(|err| format!("header write failed: {}", err))?;
    }
    Ok(())
}

/// UTC wall-clock time split into calendar fields.
struct Timestamp {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
}

impl Timestamp {
    fn now() -> Self {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self::from_unix(secs)
    }

    fn from_unix(secs: i64) -> Self {
        let secs = secs.max(0);
        let seconds_of_day = (secs % 86_400) as u32;
        let (year, month, day) = civil_from_days(secs / 86_400);
        Self {
            year,
            month,
            day,
            hour: seconds_of_day / 3_600,
            minute: (seconds_of_day % 3_600) / 60,
            second: seconds_of_day % 60,
        }
    }
}

// Days since 1970-01-01 to (year, month, day), proleptic Gregorian.
fn civil_from_days(days: i64) -> (i32, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let day_of_era = z - era * 146_097;
    let year_of_era =
        (day_of_era - day_of_era / 1_460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let shifted_month = (5 * day_of_year + 2) / 153;
    let day = (day_of_year - (153 * shifted_month + 2) / 5 + 1) as u32;
    let month = if shifted_month < 10 {
        shifted_month + 3
    } else {
        shifted_month - 9
    } as u32;
    let year = year_of_era + era * 400 + if month <= 2 { 1 } else { 0 };
    (year as i32, month, day)
}
