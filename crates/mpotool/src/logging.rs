
use std::path::PathBuf;

use log::{Level, LevelFilter};

#[derive(Default)]
pub struct LoggingConfig {
    verbose: bool,
    log_file_path: Option<PathBuf>,
}

fn file_line(record: &log::Record) -> String {
    match record.level() {
        Level::Error | Level::Warn | Level::Debug => {
            format!(
                " [{file}:{line}]",
                file = record.file().unwrap_or("N/A"),
                line = record.line().unwrap_or(0)
            )
        },
        _ => {
            Default::default()
        }
    }
}

impl LoggingConfig {
    /// Logs `debug!` and `trace!` output too.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Also appends every record, uncolored, to the file at `path`.
    pub fn output_to_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file_path = Some(path.into());
        self
    }

    pub fn apply(self) -> Result<(), fern::InitError> {
        use fern::colors::{Color, ColoredLevelConfig};

        let level = if self.verbose { LevelFilter::Trace } else { LevelFilter::Info };
        let base_config = fern::Dispatch::new()
          .level(level);

        let colors_line = ColoredLevelConfig::new()
          .error(Color::Red)
          .warn(Color::Yellow)
          .info(Color::White) // Default
          .debug(Color::BrightMagenta) // Default
          .trace(Color::BrightBlack);
        let colors_level = colors_line.info(Color::Green);

        let stderr_config = fern::Dispatch::new()
          .format(move |out, message, record| {
            out.finish(format_args!(
              "{begin_color_line}{date} {colored_level}{begin_color_line} [{target}]{file_line} {message}\x1B[0m",
              begin_color_line = format_args!(
                "\x1B[{}m",
                colors_line.get_color(&record.level()).to_fg_str()
              ),
              date = chrono::Local::now().format("[%Y/%m/%d %H:%M:%S]"),
              colored_level = colors_level.color(record.level()),
              target = record.target(),
              file_line = file_line(record),
            ));
          })
          .chain(std::io::stderr());

        let mut config = base_config
          .chain(stderr_config);

        if let Some(log_file_path) = &self.log_file_path {
          let log_file = fern::log_file(log_file_path)?;

          let log_file_config = fern::Dispatch::new()
            .format(|out, message, record| {
              out.finish(format_args!(
                "{date} {level} [{target}]{file_line} {message}",
                date = chrono::Local::now().format("[%Y/%m/%d %H:%M:%S]"),
                level = record.level(),
                target = record.target(),
                file_line = file_line(record),
              ));
            })
            .chain(log_file);

            config = config
                .chain(log_file_config);
        }

        config.apply()?;
        Ok(())
    }
}
