//! Frontmost application lookup
//!
//! Only used to decide whether Shift+Tab must travel as a terminal backtab.

use std::process::Command;
use tracing::debug;

/// Identity of the application that currently has keyboard focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundInfo {
    /// Application or window-class identifier (e.g. `org.gnome.Terminal`).
    pub identifier: String,
    /// Human-readable name; may be empty.
    pub display_name: String,
}

impl ForegroundInfo {
    #[must_use]
    pub fn new(identifier: &str, display_name: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            display_name: display_name.to_string(),
        }
    }

    /// Whether this application is a terminal emulator.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        let identifier = self.identifier.trim();
        if TERMINAL_IDENTIFIERS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(identifier))
        {
            return true;
        }

        let display = self.display_name.to_ascii_lowercase();
        TERMINAL_NAME_MARKERS
            .iter()
            .any(|marker| display.contains(marker))
    }
}

/// Known terminal application identifiers.
pub const TERMINAL_IDENTIFIERS: &[&str] = &[
    "com.apple.Terminal",
    "com.googlecode.iterm2",
    "dev.warp.Warp-Stable",
    "com.github.wez.wezterm",
    "com.mitchellh.ghostty",
    "net.kovidgoyal.kitty",
    "org.alacritty",
    "co.zeit.hyper",
    "org.gnome.Terminal",
    "gnome-terminal-server",
    "org.gnome.Console",
    "org.kde.konsole",
    "konsole",
    "kitty",
    "Alacritty",
    "foot",
    "footclient",
    "xterm",
    "URxvt",
    "Tilix",
    "com.gexperts.Tilix",
    "terminator",
    "xfce4-terminal",
    "org.wezfurlong.wezterm",
];

/// Display-name substrings that mark a terminal.
pub const TERMINAL_NAME_MARKERS: &[&str] = &["terminal", "iterm", "warp", "wezterm", "ghostty"];

/// Source of the frontmost application.
#[cfg_attr(test, mockall::automock)]
pub trait ForegroundApp: Send {
    /// Current frontmost application, if it can be determined.
    fn frontmost(&self) -> Option<ForegroundInfo>;
}

/// Frontmost application is never known.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoForeground;

impl ForegroundApp for NoForeground {
    fn frontmost(&self) -> Option<ForegroundInfo> {
        None
    }
}

/// Runs a shell command and reads `identifier[\tdisplay name]` from stdout.
///
/// # Examples
///
/// ```
/// use padkeys::keys::foreground::CommandForeground;
///
/// let info = CommandForeground::parse_output("kitty\tkitty - ~/src\n").unwrap();
/// assert_eq!(info.identifier, "kitty");
/// assert!(info.is_terminal());
/// ```
#[derive(Debug, Clone)]
pub struct CommandForeground {
    command: String,
}

impl CommandForeground {
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }

    /// Parses one line of command output.
    #[must_use]
    pub fn parse_output(output: &str) -> Option<ForegroundInfo> {
        let line = output.lines().next()?.trim();
        if line.is_empty() {
            return None;
        }
        let (identifier, display_name) = match line.split_once('\t') {
            Some((identifier, display_name)) => (identifier.trim(), display_name.trim()),
            None => (line, ""),
        };
        Some(ForegroundInfo::new(identifier, display_name))
    }
}

impl ForegroundApp for CommandForeground {
    fn frontmost(&self) -> Option<ForegroundInfo> {
        let output = match Command::new("sh").arg("-c").arg(&self.command).output() {
            Ok(output) => output,
            Err(e) => {
                debug!("Foreground command failed to start: {}", e);
                return None;
            }
        };
        if !output.status.success() {
            debug!("Foreground command exited with {}", output.status);
            return None;
        }
        Self::parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_allow_list_is_case_insensitive() {
        assert!(ForegroundInfo::new("org.gnome.terminal", "").is_terminal());
        assert!(ForegroundInfo::new("alacritty", "").is_terminal());
        assert!(ForegroundInfo::new("com.googlecode.iterm2", "").is_terminal());
    }

    #[test]
    fn test_display_name_markers() {
        assert!(ForegroundInfo::new("x", "My Terminal").is_terminal());
        assert!(ForegroundInfo::new("x", "WezTerm").is_terminal());
        assert!(ForegroundInfo::new("x", "Ghostty").is_terminal());
        assert!(!ForegroundInfo::new("firefox", "Mozilla Firefox").is_terminal());
    }

    #[test]
    fn test_parse_output_variants() {
        assert_eq!(
            CommandForeground::parse_output("firefox\n"),
            Some(ForegroundInfo::new("firefox", ""))
        );
        assert_eq!(
            CommandForeground::parse_output("org.gnome.Terminal\tTerminal\n"),
            Some(ForegroundInfo::new("org.gnome.Terminal", "Terminal"))
        );
        assert_eq!(CommandForeground::parse_output(""), None);
        assert_eq!(CommandForeground::parse_output("   \n"), None);
    }

    #[test]
    fn test_command_foreground_reads_stdout() {
        let foreground = CommandForeground::new("printf 'kitty\\tkitty'");
        assert_eq!(
            foreground.frontmost(),
            Some(ForegroundInfo::new("kitty", "kitty"))
        );
    }

    #[test]
    fn test_command_foreground_failure_is_unknown() {
        let foreground = CommandForeground::new("exit 3");
        assert_eq!(foreground.frontmost(), None);
    }

    #[test]
    fn test_no_foreground() {
        assert_eq!(NoForeground.frontmost(), None);
    }
}
