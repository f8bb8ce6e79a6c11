pub mod context;
pub mod orchestrator;
pub mod state;

pub use context::StageContext;
pub use orchestrator::{transition, SqlPipeline, Stage};
pub use state::PipelineState;
