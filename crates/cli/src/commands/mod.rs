//! CLI commands.

pub mod analyze;
pub mod execute;
pub mod output;
pub mod recompute;
pub mod regime;
pub mod settings;

pub use analyze::AnalyzeArgs;
pub use execute::ExecuteArgs;
pub use recompute::RecomputeArgs;
pub use regime::{NarrativeArgs, RegimeArgs};
pub use settings::SettingsCommand;
