//! Terminal palette for reports and registry entries.
//!
//! Uses standard ANSI colors for maximum terminal compatibility.

use colored::{ColoredString, Colorize};

/// Extension trait applying the palette to strings.
pub trait PaletteExt {
    /// Section titles and domain names
    fn title(&self) -> ColoredString;
    /// Field labels
    fn property(&self) -> ColoredString;
    fn ok(&self) -> ColoredString;
    /// Answered, but not with a plain 200
    fn okish(&self) -> ColoredString;
    fn ko(&self) -> ColoredString;
    fn muted(&self) -> ColoredString;
}

impl<S: AsRef<str>> PaletteExt for S {
    fn title(&self) -> ColoredString {
        self.as_ref().bright_yellow().bold()
    }

    fn property(&self) -> ColoredString {
        self.as_ref().green()
    }

    fn ok(&self) -> ColoredString {
        self.as_ref().bright_green()
    }

    fn okish(&self) -> ColoredString {
        self.as_ref().yellow()
    }

    fn ko(&self) -> ColoredString {
        self.as_ref().bright_red()
    }

    fn muted(&self) -> ColoredString {
        self.as_ref().bright_black()
    }
}

/// How a recorded status reads at a glance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Ok,
    Okish,
    Ko,
    Unchecked,
}

impl StatusTone {
    pub fn of(status: Option<&str>) -> Self {
        let Some(status) = status else {
            return StatusTone::Unchecked;
        };
        match status.split(' ').next().and_then(|code| code.parse::<u16>().ok()) {
            Some(200) => StatusTone::Ok,
            Some(code) if code < 400 => StatusTone::Okish,
            _ => StatusTone::Ko,
        }
    }

    pub fn paint(&self, text: &str) -> ColoredString {
        match self {
            StatusTone::Ok => text.ok(),
            StatusTone::Okish => text.okish(),
            StatusTone::Ko => text.ko(),
            StatusTone::Unchecked => text.muted(),
        }
    }
}
