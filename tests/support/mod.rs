mod cli;
mod history;
mod workspace;

pub use cli::{CliOutput, CliRunner};
pub use history::ScriptedHistory;
pub use workspace::{TestWorkspace, TestWorkspaceBuilder};
