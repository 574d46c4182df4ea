//! File names for finished recordings.
//!
//! A recording is written to `base.lmp` unless that file exists, in which
//! case a numbered `base-00002.lmp`, `base-00003.lmp`, ... is used. The
//! counter survives between recordings of one session so later demos do not
//! probe the names already taken. A base name ending in `$` asks for the
//! completion time to be appended to the base name (`map01$` finishing in
//! 1:05 becomes `map01105.lmp`) when a level or movie run completes.

use std::path::{Path, PathBuf};

use crate::TICRATE;

/// First number tried after the plain name is taken.
pub const FIRST_DEMO_COUNTER: u32 = 2;

/// Last number tried; past it the last candidate is overwritten.
pub const MAX_DEMO_COUNTER: u32 = 99999;

const DEMO_EXTENSION: &str = ".lmp";
const TIME_SUFFIX: char = '$';

/// How a run that just finished was timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletedRun {
    /// A single level finished after this many tics.
    Level {
        /// Tics spent in the level.
        level_time: i32,
    },
    /// A multi-level movie finished after this many tics.
    Movie {
        /// Tics spent in all levels.
        total_time: i32,
    },
}

impl CompletedRun {
    /// Digits appended to a `$` base name.
    #[must_use]
    pub fn time_suffix(&self) -> String {
        match *self {
            Self::Level { level_time } => {
                let level_time = level_time.max(0);
                let hundredths = (level_time % TICRATE) * 100 / TICRATE;
                let seconds_total = level_time / TICRATE;
                let minutes = seconds_total / 60;
                let seconds = seconds_total % 60;
                if minutes == 0 && seconds < 10 {
                    format!("{}{:02}", seconds, hundredths)
                } else {
                    format!("{}{:02}", minutes, seconds)
                }
            }
            Self::Movie { total_time } => {
                let seconds_total = total_time.max(0) / TICRATE;
                let hours = seconds_total / 3600;
                let minutes = seconds_total % 3600 / 60;
                let seconds = seconds_total % 60;
                if hours > 0 {
                    format!("{}{:02}{:02}", hours, minutes, seconds)
                } else if minutes > 0 {
                    format!("{}{:02}", minutes, seconds)
                } else {
                    format!("{:03}", seconds)
                }
            }
        }
    }
}

/// Hands out names for recordings of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoNamer {
    base: String,
    with_time: bool,
    counter: u32,
}

impl DemoNamer {
    /// Creates a namer for `base`, with or without the `.lmp` extension.
    /// An empty base is named `null`.
    #[must_use]
    pub fn new(base: &str) -> Self {
        let base = base.strip_suffix(DEMO_EXTENSION).unwrap_or(base);
        let (base, with_time) = match base.strip_suffix(TIME_SUFFIX) {
            Some(stripped) => (stripped, true),
            None => (base, false),
        };
        let base = if base.is_empty() { "null" } else { base };
        Self {
            base: base.to_owned(),
            with_time,
            counter: FIRST_DEMO_COUNTER,
        }
    }

    /// The base name without extension or time request.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Returns `true` if the base name asked for time-stamped names.
    #[must_use]
    pub const fn wants_time(&self) -> bool {
        self.with_time
    }

    /// The next number that will be tried.
    #[must_use]
    pub const fn counter(&self) -> u32 {
        self.counter
    }

    /// The name for a recording that just ended.
    ///
    /// `exists` reports whether a candidate is already taken. With a `$` base
    /// name and a completed run the time is appended and numbering restarts
    /// for that name; otherwise the session counter advances.
    pub fn next_name(
        &mut self,
        completed: Option<CompletedRun>,
        exists: impl Fn(&Path) -> bool,
    ) -> PathBuf {
        match completed {
            Some(run) if self.with_time => {
                let base = format!("{}{}", self.base, run.time_suffix());
                let mut counter = FIRST_DEMO_COUNTER;
                generate(&base, &mut counter, exists)
            }
            _ => {
                let mut counter = self.counter;
                let name = generate(&self.base, &mut counter, exists);
                self.counter = counter;
                name
            }
        }
    }

    /// A name in the filesystem relative to the working directory.
    pub fn next_free_name(&mut self, completed: Option<CompletedRun>) -> PathBuf {
        self.next_name(completed, Path::exists)
    }
}

/// `base.lmp`, or the first free `base-NNNNN.lmp` starting from `counter`.
pub fn generate(base: &str, counter: &mut u32, exists: impl Fn(&Path) -> bool) -> PathBuf {
    let mut name = PathBuf::from(format!("{}{}", base, DEMO_EXTENSION));
    while *counter <= MAX_DEMO_COUNTER && exists(&name) {
        name = PathBuf::from(format!("{}-{:05}{}", base, *counter, DEMO_EXTENSION));
        *counter += 1;
    }
    tracing::debug!(path = %name.display(), counter = *counter, "demo name chosen");
    name
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn taken(names: &[&str]) -> impl Fn(&Path) -> bool {
        let set: HashSet<PathBuf> = names.iter().map(PathBuf::from).collect();
        move |p: &Path| set.contains(p)
    }

    #[test]
    fn free_base_name_is_used_as_is() {
        let mut namer = DemoNamer::new("run.lmp");
        assert_eq!(namer.next_name(None, |_| false), PathBuf::from("run.lmp"));
        assert_eq!(namer.counter(), FIRST_DEMO_COUNTER);
    }

    #[test]
    fn taken_names_are_numbered() {
        let mut namer = DemoNamer::new("run");
        let exists = taken(&["run.lmp", "run-00002.lmp"]);
        assert_eq!(namer.next_name(None, &exists), PathBuf::from("run-00003.lmp"));
        assert_eq!(namer.counter(), 4);
    }

    #[test]
    fn counter_persists_between_recordings() {
        let mut namer = DemoNamer::new("run");
        let first = namer.next_name(None, taken(&["run.lmp"]));
        assert_eq!(first, PathBuf::from("run-00002.lmp"));
        let second = namer.next_name(None, taken(&["run.lmp", "run-00002.lmp"]));
        assert_eq!(second, PathBuf::from("run-00003.lmp"));
    }

    #[test]
    fn empty_base_is_null() {
        assert_eq!(DemoNamer::new("").base(), "null");
    }

    #[test]
    fn level_time_suffix() {
        // 5.48 seconds
        let fast = CompletedRun::Level {
            level_time: 5 * TICRATE + 17,
        };
        assert_eq!(fast.time_suffix(), "548");
        let slow = CompletedRun::Level {
            level_time: 65 * TICRATE,
        };
        assert_eq!(slow.time_suffix(), "105");
    }

    #[test]
    fn movie_time_suffix() {
        let short = CompletedRun::Movie {
            total_time: 42 * TICRATE,
        };
        assert_eq!(short.time_suffix(), "042");
        let long = CompletedRun::Movie {
            total_time: (3600 + 2 * 60 + 3) * TICRATE,
        };
        assert_eq!(long.time_suffix(), "10203");
    }

    #[test]
    fn time_request_uses_its_own_numbering() {
        let mut namer = DemoNamer::new("map01$");
        assert!(namer.wants_time());
        let run = CompletedRun::Level {
            level_time: 65 * TICRATE,
        };
        let name = namer.next_name(Some(run), taken(&["map01105.lmp"]));
        assert_eq!(name, PathBuf::from("map01105-00002.lmp"));
        assert_eq!(namer.counter(), FIRST_DEMO_COUNTER);
        assert_eq!(namer.next_name(None, |_| false), PathBuf::from("map01.lmp"));
    }
}
