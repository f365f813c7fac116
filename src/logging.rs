use std::path::Path;

use log::LevelFilter;

/// Logs to stdout and to `<log_dir>/scraper_YYYYMMDD.log`, rolling over to a new file each day.
pub fn init(log_dir: &Path, level: LevelFilter) -> Result<(), fern::InitError> {
    std::fs::create_dir_all(log_dir)?;

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        // sqlx logs every statement at info
        .level_for("sqlx", LevelFilter::Warn)
        .chain(std::io::stdout())
        .chain(fern::DateBased::new(log_dir.join("scraper_"), "%Y%m%d.log"))
        .apply()?;

    Ok(())
}
