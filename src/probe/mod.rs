//! Platform queries the tracker depends on: how long input devices have been
//! quiet and which process owns the foreground window. [GenericProbe] picks
//! the backend for the compilation target; everything above this module only
//! talks to the [ActivityProbe] trait.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::{path::Path, sync::Arc};

use anyhow::Result;

/// Contract the windows and linux backends implement.
#[cfg_attr(test, mockall::automock)]
pub trait ActivityProbe {
    /// Milliseconds since the last keyboard/mouse event.
    fn idle_millis(&mut self) -> Result<u64>;

    /// Full executable path of the process owning the foreground window.
    /// For example `/usr/bin/nvim` or `C:\Program Files\Firefox\firefox.exe`.
    fn foreground_exe(&mut self) -> Result<Arc<str>>;
}

/// Reports which of the candidate process names, if any, owns the foreground
/// window right now.
pub fn resolve_foreground<'a>(
    probe: &mut dyn ActivityProbe,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Result<Option<&'a str>> {
    let exe = probe.foreground_exe()?;
    Ok(match_process_name(&exe, candidates))
}

/// Matches a foreground executable against registered process names the same
/// way process lists are usually eyeballed: case-insensitive substring of the
/// file name, first registered match wins.
pub fn match_process_name<'a>(
    exe: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
    let file_name = Path::new(exe)
        .file_name()
        .map(|v| v.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if file_name.is_empty() {
        return None;
    }
    candidates
        .into_iter()
        .find(|candidate| file_name.contains(&candidate.to_lowercase()))
}

/// Cross-compatible [ActivityProbe] implementation.
pub struct GenericProbe {
    inner: Box<dyn ActivityProbe>,
}

impl GenericProbe {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsProbe;
                Ok(Self {
                    inner: Box::new(WindowsProbe::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::X11Probe;
                Ok(Self {
                    inner: Box::new(X11Probe::new()?),
                })
            }
            else {
                // This runtime error is needed to allow the project to be compiled for during testing.
                unimplemented!("No activity probe was specified")
            }
        }
    }
}

impl ActivityProbe for GenericProbe {
    fn idle_millis(&mut self) -> Result<u64> {
        self.inner.idle_millis()
    }

    fn foreground_exe(&mut self) -> Result<Arc<str>> {
        self.inner.foreground_exe()
    }
}

#[cfg(test)]
mod tests {
    use super::match_process_name;

    #[test]
    fn matches_by_file_name_substring() {
        let candidates = ["firefox", "code"];
        assert_eq!(
            match_process_name("/usr/lib/firefox/firefox-bin", candidates),
            Some("firefox")
        );
        assert_eq!(
            match_process_name("C:\\Program Files\\VS Code\\Code.exe", candidates.to_vec()),
            Some("code")
        );
    }

    #[test]
    fn match_is_case_insensitive() {
        assert_eq!(
            match_process_name("/opt/Discord/Discord", ["discord"]),
            Some("discord")
        );
        assert_eq!(match_process_name("/usr/bin/nvim", ["NVIM"]), Some("NVIM"));
    }

    #[test]
    fn no_match_for_unrelated_or_empty() {
        assert_eq!(match_process_name("/usr/bin/bash", ["firefox"]), None);
        assert_eq!(match_process_name("", ["firefox"]), None);
        let none: [&str; 0] = [];
        assert_eq!(match_process_name("/usr/bin/bash", none), None);
    }

    #[test]
    fn first_registered_candidate_wins() {
        // "fire" and "firefox" both match; registration order decides.
        assert_eq!(
            match_process_name("/usr/bin/firefox", ["fire", "firefox"]),
            Some("fire")
        );
    }
}
