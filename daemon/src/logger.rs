use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use std::path::Path;

/// Wire up logging: colored lines on stdout plus date-based files under
/// `<datadir>/log/`.
pub fn init(data_path: &Path, level: LevelFilter) -> Result<(), fern::InitError> {
    let log_dir = data_path.join("log");
    std::fs::create_dir_all(&log_dir)?;

    let colors = ColoredLevelConfig::new()
        .trace(Color::BrightBlack)
        .debug(Color::Green)
        .info(Color::Cyan)
        .warn(Color::Yellow)
        .error(Color::Red);

    let console = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .chain(std::io::stdout());

    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .chain(fern::DateBased::new(
            format!("{}/", log_dir.display()),
            "%Y-%m-%d.node.log",
        ));

    fern::Dispatch::new()
        .level(level)
        .level_for("heed", LevelFilter::Warn)
        .chain(console)
        .chain(file)
        .apply()?;
    Ok(())
}
