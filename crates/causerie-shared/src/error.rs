use thiserror::Error;

/// Every recoverable failure the chat core can report.
///
/// All variants are recovered at the session boundary and surfaced to the
/// originating connection only; none of them terminates a session or the
/// process. `code()` is the stable identifier sent on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Permission denied")]
    PermissionDenied,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not a member of this group")]
    NotAMember,

    #[error("User already exists: {0}")]
    DuplicateIdentifier(String),

    #[error("Group name already taken: {0}")]
    DuplicateName(String),

    #[error("Group is full")]
    GroupFull,

    #[error("Already a member of this group")]
    AlreadyMember,

    #[error("Invalid credentials")]
    InvalidCredential,

    #[error("Authentication required")]
    AuthRequired,

    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Stable error code carried in the `error` event payload.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::PermissionDenied => "PERMISSION_DENIED",
            ChatError::NotFound(_) => "NOT_FOUND",
            ChatError::NotAMember => "NOT_A_MEMBER",
            ChatError::DuplicateIdentifier(_) => "DUPLICATE_IDENTIFIER",
            ChatError::DuplicateName(_) => "DUPLICATE_NAME",
            ChatError::GroupFull => "GROUP_FULL",
            ChatError::AlreadyMember => "ALREADY_MEMBER",
            ChatError::InvalidCredential => "INVALID_CREDENTIAL",
            ChatError::AuthRequired => "AUTH_REQUIRED",
            ChatError::Malformed(_) => "MALFORMED",
            ChatError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ChatError>;
