// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod login;
pub mod orchestration;
pub mod refinement_dispatch;
pub mod repository_factory;

// Re-export use cases for convenience
pub use login::{LoginError, LoginResult, LoginService};
pub use orchestration::{
    CreateRefinementRequest, CreateWorkflowRequest, OrchestrationError, OrchestrationService,
};
pub use refinement_dispatch::{DispatchSettings, RefinementDispatcher};
pub use repository_factory::{create_repositories, Repositories};
