#![doc = include_str!("../README.md")]

pub mod assembler;
pub mod bootstrap;
pub mod driver;
pub mod engine;
pub mod error;
pub mod identity;
pub mod teardown;
pub mod terraform;
pub mod verifier;

pub use assembler::{InvocationBuilder, InvocationConfig, ModuleVariables, assemble_case};
pub use bootstrap::{BootstrapOutcome, run_bootstrap};
pub use driver::{LifecycleDriver, RunPlan, RunReport, Session, SessionSummary};
pub use engine::{CommandOutput, PlanResult, ProvisioningEngine};
pub use error::LifecycleError;
pub use identity::{IdentityGenerator, resolve_identity};
pub use teardown::{
    TeardownGuard, TeardownRecord, TeardownStatus, TeardownTrigger, install_crash_handler,
};
pub use terraform::TerraformCli;
pub use verifier::{
    ChangeSummary, CheckOutcome, Expectation, NO_CHANGES_SUMMARY, OutcomeVerifier,
    ProvisioningResult, extract_summary, parse_summary,
};
