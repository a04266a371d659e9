//! Services for reloop-api
//!
//! Collaborator clients (vision, pricing), photo normalization, catalog
//! seeding, valuation, reward ledger and the verification workflow.

pub mod catalog_seed;
pub mod gemini;
pub mod image_prep;
pub mod pricing_client;
pub mod reward_ledger;
pub mod valuation;
pub mod verification_workflow;
pub mod vision_client;

pub use catalog_seed::{CatalogSeed, SeedSummary};
pub use gemini::{CollaboratorError, GeminiClient, InlineImage};
pub use pricing_client::{GeminiPricing, PricingOracle};
pub use reward_ledger::{LeaderboardEntry, ProfileView, RewardLedger, WasteEstimate};
pub use valuation::ValuationService;
pub use verification_workflow::{
    SubmissionAccepted, VerificationWorkflow, WorkflowError, WorkflowSettings,
};
pub use vision_client::{
    Classification, ClassificationRequest, ClassificationStatus, GeminiVision, VisionClassifier,
};
