use anyhow::{self, format_err};
use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

use protomatch::interfaces::cli::{log_heading, Cli};
use protomatch::interfaces::input::Input;
use protomatch::interfaces::InputHandle;
use protomatch::io::read_protomatch_yaml;

/// Sends the formatted output to the console and optionally to a file, and diagnostics to
/// standard error.
fn configure_logging(cli: &Cli) -> Result<(), anyhow::Error> {
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{m}{n}")))
        .build();
    let diagnostics = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{h({l})} {M} - {m}{n}")))
        .build();
    let mut config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("diagnostics", Box::new(diagnostics)));
    let mut output_appenders = vec!["console".to_string()];
    if let Some(path) = cli.output.as_ref() {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{m}{n}")))
            .append(false)
            .build(path)
            .map_err(|err| format_err!("Unable to open {}: {err}", path.display()))?;
        config = config.appender(Appender::builder().build("file", Box::new(file)));
        output_appenders.push("file".to_string());
    }
    let config = config
        .logger(
            Logger::builder()
                .appenders(output_appenders)
                .additive(false)
                .build("protomatch-output", LevelFilter::Info),
        )
        .build(
            Root::builder()
                .appender("diagnostics")
                .build(if cli.debug {
                    LevelFilter::Debug
                } else {
                    LevelFilter::Warn
                }),
        )?;
    log4rs::init_config(config)?;
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    configure_logging(&cli)?;
    log_heading();
    let input = read_protomatch_yaml::<Input, _>(&cli.config)?;
    input.handle()
}
