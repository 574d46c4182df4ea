//! Convenient re-exports for common usage.
//!
//! # Usage
//!
//! ```rust
//! use tick_demo::prelude::*;
//! ```
//!
//! # What's Included
//!
//! - **Sessions**: [`SessionBuilder`], [`RecordingSession`], [`PlaybackSession`], [`DemoSession`]
//! - **Scheduling**: [`GameTicker`], [`Simulation`], [`GameAction`], [`GameState`], [`PauseMode`]
//! - **Commands**: [`TickCommand`], [`ExtendedCommand`], [`TickCommandBuilder`], [`InputState`]
//! - **Formats**: [`CompatibilityLevel`], [`DemoHeader`], [`Strictness`], [`ParseOutcome`]
//! - **Configuration**: [`EngineConfig`], [`DemoOverrides`], [`BuilderSettings`]
//! - **Error handling**: [`DemoError`], [`DemoResult`]
//!
//! # Example
//!
//! ```rust
//! use tick_demo::prelude::*;
//!
//! let mut session = SessionBuilder::new()
//!     .with_overrides(DemoOverrides {
//!         complevel: Some(CompatibilityLevel::Mbf21),
//!         ..DemoOverrides::default()
//!     })
//!     .start_recording()?;
//! session.record(&TickCommand { forward: 50, ..TickCommand::EMPTY })?;
//!
//! let demo = session.finalize();
//! let playback = SessionBuilder::new()
//!     .start_playback("demo", demo, Strictness::Strict)?
//!     .into_result()?;
//! assert_eq!(playback.header().level, CompatibilityLevel::Mbf21);
//! # Ok::<(), DemoError>(())
//! ```

// Sessions
pub use crate::sessions::builder::SessionBuilder;
pub use crate::sessions::{DemoSession, PlaybackSession, RecordingSession};

// Scheduling
pub use crate::scheduler::{GameAction, GameState, GameTicker, PauseMode, Simulation, TickFrame};

// Commands
pub use crate::builder::{InputState, PlayerView, TickCommandBuilder};
pub use crate::ticcmd::{ExtendedCommand, TickCommand};

// Formats
pub use crate::compat::CompatibilityLevel;
pub use crate::demo::header::{DemoHeader, ParseOutcome, Strictness};

// Configuration
pub use crate::builder::BuilderSettings;
pub use crate::sessions::config::{DemoOverrides, EngineConfig};

// Error handling
pub use crate::error::{DemoError, DemoResult};

// Fundamental types
pub use crate::Tic;
