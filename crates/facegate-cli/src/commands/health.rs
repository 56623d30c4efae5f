use std::any::Any;
use std::process::ExitCode;

use facegate_core::errors::AppResult;
use facegate_core::faces::{HealthResponse, VerificationService};

use crate::cli::OutputMode;
use crate::commands::CommandHandler;
use crate::output::render_health;

pub struct HealthHandler {
    render: Box<dyn Fn(&HealthResponse, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl HealthHandler {
    pub fn new() -> Self {
        Self::with_renderer(render_health)
    }

    pub fn with_renderer(
        render: impl Fn(&HealthResponse, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            render: Box::new(render),
        }
    }
}

impl Default for HealthHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHandler for HealthHandler {
    fn execute(&self, service: &VerificationService, mode: OutputMode) -> AppResult<ExitCode> {
        let response = service.health();
        (self.render)(&response, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
