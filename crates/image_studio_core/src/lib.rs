pub mod chain;
pub mod domain;
pub mod ports;

pub use chain::{ChainSubmission, GenerationChain};
pub use domain::{
    FederatedIdentity, GeneratedImage, ImagePayload, JobStatus, JobStatusReport, JobSubmission,
    PasswordResetToken, ProfileUpdate, User, UserCredentials, UserProfile,
};
pub use ports::{
    DatabaseService, GenerationRequest, IdentityVerifier, ImageGenerationService, PortError,
    PortResult,
};
