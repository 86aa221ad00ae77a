/// Error type crossing collaborator boundaries and thread hand-offs.
pub type SendError = Box<dyn std::error::Error + Send + Sync>;
