//! Record-store collection names
//!
//! One place for the collection vocabulary so the orchestrator and tests
//! never disagree on spelling.

pub const CONVERSATIONS: &str = "conversations";
pub const PROJECTS: &str = "projects";
pub const RESEARCH_HISTORY: &str = "research_history";
pub const MUNICIPALITIES: &str = "municipalities";
pub const ZONINGS: &str = "zonings";
pub const ZONES: &str = "zones";
pub const DOCUMENTS: &str = "documents";
pub const CONVERSATION_DOCUMENTS: &str = "conversation_documents";
pub const PROJECT_DOCUMENTS: &str = "project_documents";
