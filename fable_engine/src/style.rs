//! Styling helpers for terminal output.
//!
//! The [`GameStyle`] trait applies ANSI styling via the `colored` crate. Implementations
//! for `&str` and `String` are provided so string literals can be styled directly.

use colored::{ColoredString, Colorize};

/// Convenience trait for applying color and style to text output.
pub trait GameStyle {
    fn entity_style(&self) -> ColoredString;
    fn description_style(&self) -> ColoredString;
    fn command_style(&self) -> ColoredString;
    fn score_style(&self) -> ColoredString;
    fn quest_done_style(&self) -> ColoredString;
    fn quest_failed_style(&self) -> ColoredString;
    fn subheading_style(&self) -> ColoredString;
    fn error_style(&self) -> ColoredString;
    fn denied_style(&self) -> ColoredString;
}

impl GameStyle for &str {
    fn entity_style(&self) -> ColoredString {
        self.truecolor(220, 180, 40)
    }
    fn description_style(&self) -> ColoredString {
        self.italic().truecolor(102, 208, 250)
    }
    fn command_style(&self) -> ColoredString {
        self.truecolor(110, 220, 110)
    }
    fn score_style(&self) -> ColoredString {
        self.bold().truecolor(220, 40, 220)
    }
    fn quest_done_style(&self) -> ColoredString {
        self.truecolor(220, 40, 220).strikethrough()
    }
    fn quest_failed_style(&self) -> ColoredString {
        self.bold().truecolor(200, 50, 50)
    }
    fn subheading_style(&self) -> ColoredString {
        self.underline()
    }
    fn error_style(&self) -> ColoredString {
        self.truecolor(230, 30, 30)
    }
    fn denied_style(&self) -> ColoredString {
        self.italic().truecolor(230, 30, 30)
    }
}

impl GameStyle for String {
    fn entity_style(&self) -> ColoredString {
        self.as_str().entity_style()
    }
    fn description_style(&self) -> ColoredString {
        self.as_str().description_style()
    }
    fn command_style(&self) -> ColoredString {
        self.as_str().command_style()
    }
    fn score_style(&self) -> ColoredString {
        self.as_str().score_style()
    }
    fn quest_done_style(&self) -> ColoredString {
        self.as_str().quest_done_style()
    }
    fn quest_failed_style(&self) -> ColoredString {
        self.as_str().quest_failed_style()
    }
    fn subheading_style(&self) -> ColoredString {
        self.as_str().subheading_style()
    }
    fn error_style(&self) -> ColoredString {
        self.as_str().error_style()
    }
    fn denied_style(&self) -> ColoredString {
        self.as_str().denied_style()
    }
}
