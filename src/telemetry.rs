//! Reporting of recoverable demo problems.
//!
//! A lenient header rejection, a console player override pointing at an empty
//! slot or a brute-force queue that ran dry do not stop the session. They are
//! turned into a [`DemoViolation`] and handed to the session's
//! [`ViolationObserver`], or logged through `tracing` when none is installed.
//!
//! ```
//! use std::sync::Arc;
//! use tick_demo::report_violation_to;
//! use tick_demo::telemetry::{
//!     CollectingObserver, ViolationKind, ViolationObserver, ViolationSeverity,
//! };
//!
//! let collector = Arc::new(CollectingObserver::new());
//! let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
//! report_violation_to!(
//!     &observer,
//!     ViolationSeverity::Warning,
//!     ViolationKind::HeaderParse,
//!     "console player {} is not in the game; viewing player 0",
//!     2
//! );
//! assert!(collector.has_violation(ViolationKind::HeaderParse));
//! ```

use parking_lot::Mutex;

/// How far a problem degraded the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// A fallback was taken and the demo is unaffected, e.g. viewing player 0
    /// instead of an absent console player.
    Warning,
    /// The session continues but something the user asked for was dropped.
    Error,
    /// Internal state can no longer be trusted.
    Critical,
}

impl ViolationSeverity {
    /// Label used in log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The part of the demo pipeline that noticed the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// Header parsing: lenient rejections and console player overrides.
    HeaderParse,
    /// Compatibility options: short mbf21 toggle blocks.
    Compatibility,
    /// Tick command building: an empty brute-force queue.
    TickBuild,
    /// The game ticker: action chains that never settle.
    Scheduler,
    /// Save-game framing: version and signature mismatches.
    SaveGame,
    /// A debug invariant check failed.
    Invariant,
}

impl ViolationKind {
    /// Label used in log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HeaderParse => "header_parse",
            Self::Compatibility => "compatibility",
            Self::TickBuild => "tick_build",
            Self::Scheduler => "scheduler",
            Self::SaveGame => "save_game",
            Self::Invariant => "invariant",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DemoViolation {
    /// How bad it is.
    pub severity: ViolationSeverity,
    /// Where in the pipeline it happened.
    pub kind: ViolationKind,
    /// What happened.
    pub message: String,
    /// `file:line` of the report.
    pub location: &'static str,
}

impl DemoViolation {
    /// Creates a violation reported at `location`.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
        }
    }

    /// The violation as a JSON object.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl std::fmt::Display for DemoViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}: {} ({})",
            self.severity, self.kind, self.message, self.location
        )
    }
}

/// Receives the violations of a session or ticker.
///
/// Called from inside a tick, so implementations should return quickly.
pub trait ViolationObserver: Send + Sync {
    /// Called once per reported violation.
    fn on_violation(&self, violation: &DemoViolation);
}

/// Logs violations through `tracing`: warnings at `warn`, the rest at `error`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &DemoViolation) {
        let severity = violation.severity.as_str();
        let kind = violation.kind.as_str();
        let location = violation.location;
        if violation.severity == ViolationSeverity::Warning {
            tracing::warn!(severity, kind, location, "{}", violation.message);
        } else {
            tracing::error!(severity, kind, location, "{}", violation.message);
        }
    }
}

/// Keeps every violation it sees, for tests and tools that inspect a run
/// after the fact.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    seen: Mutex<Vec<DemoViolation>>,
}

impl CollectingObserver {
    /// An observer that has seen nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far, oldest first.
    #[must_use]
    pub fn violations(&self) -> Vec<DemoViolation> {
        self.seen.lock().clone()
    }

    /// Number of violations seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Whether nothing was reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    /// Whether a violation of `kind` was reported.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.seen.lock().iter().any(|v| v.kind == kind)
    }

    /// Forgets everything seen so far.
    pub fn clear(&self) {
        self.seen.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &DemoViolation) {
        self.seen.lock().push(violation.clone());
    }
}

/// Logs a violation through [`TracingObserver`], for code that has no
/// session observer at hand.
///
/// ```
/// use tick_demo::report_violation;
/// use tick_demo::telemetry::{ViolationKind, ViolationSeverity};
///
/// report_violation!(
///     ViolationSeverity::Warning,
///     ViolationKind::Compatibility,
///     "mbf21 option block stores {} of {} toggles",
///     20,
///     21
/// );
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $($fmt:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::DemoViolation::new(
            $severity,
            $kind,
            format!($($fmt)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

/// Reports a violation to an `Option<Arc<dyn ViolationObserver>>`, logging it
/// through [`TracingObserver`] when the option is empty.
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $severity:expr, $kind:expr, $($fmt:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::DemoViolation::new(
            $severity,
            $kind,
            format!($($fmt)+),
            concat!(file!(), ":", line!()),
        );
        match $observer.as_ref() {
            Some(observer) => observer.on_violation(&violation),
            None => $crate::telemetry::TracingObserver.on_violation(&violation),
        }
    }};
}

// ===== Invariants =====

/// A broken internal invariant, as found by [`InvariantChecker`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct InvariantViolation {
    /// The type that was checked.
    pub type_name: &'static str,
    /// The invariant that does not hold.
    pub invariant: String,
    /// Values involved, for the log.
    pub details: Option<String>,
}

impl InvariantViolation {
    /// A broken `invariant` of `type_name`.
    #[must_use]
    pub fn new(type_name: &'static str, invariant: impl Into<String>) -> Self {
        Self {
            type_name,
            invariant: invariant.into(),
            details: None,
        }
    }

    /// Attaches the values involved.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// The violation as a JSON object.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.type_name, self.invariant)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Types whose internal bookkeeping can be checked, like a demo stream's
/// cursor staying inside its buffer.
pub trait InvariantChecker {
    /// The first broken invariant, if any.
    fn check_invariants(&self) -> Result<(), InvariantViolation>;
}

/// Runs [`InvariantChecker::check_invariants`] in debug builds and under the
/// `paranoid` feature, reporting failures as critical
/// [`ViolationKind::Invariant`] violations.
#[macro_export]
#[cfg(any(debug_assertions, feature = "paranoid"))]
macro_rules! debug_check_invariants {
    ($expr:expr) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(violation) = $expr.check_invariants() {
            $crate::report_violation!(
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{}",
                violation
            );
        }
    }};

    ($expr:expr, $context:expr) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(violation) = $expr.check_invariants() {
            $crate::report_violation!(
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{} {}",
                violation,
                $context
            );
        }
    }};
}

/// Compiled out in release builds without the `paranoid` feature.
#[macro_export]
#[cfg(not(any(debug_assertions, feature = "paranoid")))]
macro_rules! debug_check_invariants {
    ($expr:expr) => {{}};
    ($expr:expr, $context:expr) => {{}};
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
    use std::sync::Arc;

    fn observed() -> (Arc<CollectingObserver>, Option<Arc<dyn ViolationObserver>>) {
        let collector = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collector.clone());
        (collector, observer)
    }

    #[test]
    fn severities_order_by_damage() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
        assert_eq!(ViolationKind::SaveGame.to_string(), "save_game");
    }

    #[test]
    fn pipeline_kinds_reach_the_session_observer_in_order() {
        let (collector, observer) = observed();
        let slot = 3;
        report_violation_to!(
            &observer,
            ViolationSeverity::Warning,
            ViolationKind::HeaderParse,
            "console player {} is not in the game",
            slot
        );
        report_violation_to!(
            &observer,
            ViolationSeverity::Warning,
            ViolationKind::TickBuild,
            "brute-force queue empty"
        );
        report_violation_to!(
            &observer,
            ViolationSeverity::Error,
            ViolationKind::SaveGame,
            "signature {:#x} does not match",
            0xdead_u32
        );
        report_violation_to!(
            &observer,
            ViolationSeverity::Critical,
            ViolationKind::Scheduler,
            "action chain did not settle"
        );

        let kinds: Vec<ViolationKind> = collector.violations().iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ViolationKind::HeaderParse,
                ViolationKind::TickBuild,
                ViolationKind::SaveGame,
                ViolationKind::Scheduler,
            ]
        );
        let first = &collector.violations()[0];
        assert_eq!(first.message, "console player 3 is not in the game");
        assert!(first.location.starts_with("src/telemetry.rs:"));
        assert!(collector.violations()[2].message.ends_with("0xdead does not match"));

        collector.clear();
        assert!(collector.is_empty());
    }

    #[test]
    fn violation_displays_and_serializes_its_labels() {
        let violation = DemoViolation::new(
            ViolationSeverity::Warning,
            ViolationKind::HeaderParse,
            "not a demo",
            "header.rs:1",
        );
        assert_eq!(
            violation.to_string(),
            "warning header_parse: not a demo (header.rs:1)"
        );
        let json = serde_json::to_string(&violation).unwrap();
        assert!(json.contains(r#""kind":"header_parse""#));
        assert!(json.contains(r#""severity":"warning""#));
    }

    struct Window {
        cursor: usize,
        len: usize,
    }

    impl InvariantChecker for Window {
        fn check_invariants(&self) -> Result<(), InvariantViolation> {
            if self.cursor > self.len {
                return Err(InvariantViolation::new("Window", "cursor past end")
                    .with_details(format!("cursor={}, len={}", self.cursor, self.len)));
            }
            Ok(())
        }
    }

    #[test]
    fn invariant_violation_display_includes_details() {
        let err = Window { cursor: 5, len: 3 }.check_invariants().unwrap_err();
        assert_eq!(err.to_string(), "Window: cursor past end (cursor=5, len=3)");
        assert!(Window { cursor: 3, len: 3 }.check_invariants().is_ok());
    }
}
