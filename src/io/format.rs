//! Formatted output for the `protomatch-output` logger.

use std::fmt;

use log;

const BANNER_LENGTH: usize = 103;

/// Logs an error to the `protomatch-output` logger.
macro_rules! protomatch_error {
    ($fmt:expr $(, $($arg:tt)*)?) => {{
        log::error!($fmt, $($($arg)*)?);
        log::error!(target: "protomatch-output", $fmt, $($($arg)*)?);
    }}
}

/// Logs a warning to the `protomatch-output` logger.
macro_rules! protomatch_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => {{ log::warn!(target: "protomatch-output", $fmt, $($($arg)*)?); }}
}

/// Logs a main output line to the `protomatch-output` logger.
macro_rules! protomatch_output {
    ($fmt:expr $(, $($arg:tt)*)?) => {{ log::info!(target: "protomatch-output", $fmt, $($($arg)*)?); }}
}

pub(crate) use {protomatch_error, protomatch_output, protomatch_warn};

/// Logs a boxed section title to the `protomatch-output` logger.
pub(crate) fn log_title(title: &str) {
    let length = title.chars().count().max(BANNER_LENGTH - 6);
    let bar = "─".repeat(length);
    protomatch_output!("┌──{bar}──┐");
    protomatch_output!("│§ {title:^length$} §│");
    protomatch_output!("└──{bar}──┘");
}

/// Writes an underlined subtitle.
pub(crate) fn write_subtitle(f: &mut fmt::Formatter<'_>, subtitle: &str) -> fmt::Result {
    let bar = "═".repeat(subtitle.chars().count());
    writeln!(f, "{subtitle}")?;
    writeln!(f, "{bar}")?;
    Ok(())
}

/// Logs an underlined subtitle to the `protomatch-output` logger.
pub(crate) fn log_subtitle(subtitle: &str) {
    let bar = "═".repeat(subtitle.chars().count());
    protomatch_output!("{}", subtitle);
    protomatch_output!("{}", bar);
}

/// Logs the beginning of a job section.
pub(crate) fn log_macsec_begin(sectitle: &str) {
    let width = BANNER_LENGTH - 14;
    let sectitle_space = sectitle.to_string() + " ";
    protomatch_output!("❬❬❬❬❬ [Begin] {sectitle_space:❬<width$}");
}

/// Logs the end of a job section.
pub(crate) fn log_macsec_end(sectitle: &str) {
    let width = BANNER_LENGTH - 14;
    let sectitle_space = sectitle.to_string() + " ";
    protomatch_output!("❭❭❭❭❭ [ End ] {sectitle_space:❭<width$}");
}

/// Logs the beginning of a step within a job.
pub(crate) fn log_micsec_begin(sectitle: &str) {
    let width = BANNER_LENGTH - 14;
    let sectitle_space = sectitle.to_string() + " ";
    protomatch_output!("‹‹‹‹‹ [Begin] {sectitle_space:‹<width$}");
}

/// Logs the end of a step within a job.
pub(crate) fn log_micsec_end(sectitle: &str) {
    let width = BANNER_LENGTH - 14;
    let sectitle_space = sectitle.to_string() + " ";
    protomatch_output!("››››› [ End ] {sectitle_space:›<width$}");
}

/// Turns a boolean into `yes` or `no`.
pub(crate) fn nice_bool(b: bool) -> String {
    if b {
        "yes".to_string()
    } else {
        "no".to_string()
    }
}

/// Logs any displayable value line by line to the `protomatch-output` logger.
pub(crate) trait ProtoMatchOutput: fmt::Debug + fmt::Display {
    fn log_output_display(&self) {
        let lines = self.to_string();
        lines.lines().for_each(|line| {
            protomatch_output!("{line}");
        })
    }
}

impl<T> ProtoMatchOutput for T where T: fmt::Debug + fmt::Display {}
