pub mod context;
pub mod llm_agent;
pub mod orchestrator;
pub mod selection;
pub mod steps;
pub mod workbook;
pub mod workspace;
