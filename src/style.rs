//! ANSI styling for driver diagnostics.
//!
//! The frontend itself never prints; everything user-facing funnels
//! through the driver, which colors it here. Codes always reset.

pub struct Style;

impl Style {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const RED: &'static str = "\x1b[31m";
    pub const CYAN: &'static str = "\x1b[36m";

    pub fn bold_red(s: &str) -> String {
        format!("{}{}{}{}", Self::BOLD, Self::RED, s, Self::RESET)
    }

    pub fn cyan(s: &str) -> String {
        format!("{}{}{}", Self::CYAN, s, Self::RESET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_red_wraps_and_resets() {
        let out = Style::bold_red("error");
        assert!(out.starts_with(Style::BOLD));
        assert!(out.contains("error"));
        assert!(out.ends_with(Style::RESET));
    }
}
