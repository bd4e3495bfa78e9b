use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use anyhow::Result;
use bakehouse_installer::{FetchEvent, HttpGitFetch, RemoteFetch};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

pub fn current_output_style() -> OutputStyle {
    if std::io::stdout().is_terminal() {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

fn colorize(style: OutputStyle, color: Style, text: &str) -> String {
    match style {
        OutputStyle::Plain => text.to_string(),
        OutputStyle::Rich => format!("{}{}{}", color.render(), text, color.render_reset()),
    }
}

fn status_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightMagenta.into()))
        .effects(Effects::BOLD)
}

fn success_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightGreen.into()))
}

fn dim_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightBlack.into()))
}

fn error_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightRed.into()))
}

fn accent_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightYellow.into()))
}

pub fn status(style: OutputStyle, message: &str) {
    println!("{}", colorize(style, status_style(), &format!(":: {message}")));
}

pub fn heading(style: OutputStyle, message: &str) {
    println!(
        "{}",
        colorize(style, status_style(), &format!("::: {message} :::"))
    );
}

pub fn success(style: OutputStyle, message: &str) {
    println!("{}", colorize(style, success_style(), message));
}

pub fn dim(style: OutputStyle, message: &str) {
    println!("{}", colorize(style, dim_style(), message));
}

pub fn detail(style: OutputStyle, message: &str) {
    println!("{}", colorize(style, accent_style(), message));
}

pub fn error(style: OutputStyle, message: &str) {
    eprintln!("{}", colorize(style, error_style(), message));
}

/// Production fetcher wrapped with progress rendering: a byte bar for
/// downloads, a spinner around clones. The engine only ever sees the
/// `RemoteFetch` interface.
pub struct ProgressFetch {
    inner: HttpGitFetch,
    style: OutputStyle,
}

impl ProgressFetch {
    pub fn new(style: OutputStyle) -> Self {
        Self {
            inner: HttpGitFetch,
            style,
        }
    }
}

impl RemoteFetch for ProgressFetch {
    fn clone_or_update(
        &self,
        location: &str,
        destination: &Path,
        branch: Option<&str>,
    ) -> Result<()> {
        if self.style == OutputStyle::Plain {
            return self.inner.clone_or_update(location, destination, branch);
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_message(format!("fetching {location}"));
        spinner.enable_steady_tick(Duration::from_millis(80));
        let result = self.inner.clone_or_update(location, destination, branch);
        spinner.finish_and_clear();
        result
    }

    fn download(
        &self,
        url: &str,
        destination: &Path,
        progress: &mut dyn FnMut(FetchEvent),
    ) -> Result<()> {
        if self.style == OutputStyle::Plain {
            return self.inner.download(url, destination, progress);
        }

        let mut bar: Option<ProgressBar> = None;
        let result = self.inner.download(url, destination, &mut |event| {
            let bar = bar.get_or_insert_with(|| {
                let bar = match event.total {
                    Some(total) => ProgressBar::new(total),
                    None => ProgressBar::new_spinner(),
                };
                if let Ok(template) = ProgressStyle::with_template(
                    "{spinner:.cyan.bold} {msg} [{bar:20.cyan/blue}] {bytes}/{total_bytes}",
                ) {
                    bar.set_style(template.progress_chars("=>-"));
                }
                bar.set_message(short_url(url));
                bar
            });
            bar.set_position(event.received);
            progress(event);
        });

        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        result
    }
}

fn short_url(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}
