use std::any::Any;
use std::process::ExitCode;

use facegate_core::errors::{AppResult, ErrorKind};
use facegate_core::faces::VerificationService;

use crate::cli::{Commands, OutputMode};

pub trait CommandHandler: Send + Sync {
    fn execute(&self, service: &VerificationService, mode: OutputMode) -> AppResult<ExitCode>;
    fn as_any(&self) -> &dyn Any;
}

mod faces;
mod health;

pub use faces::{load_image_source, FaceOperation, FacesHandler, FacesHandlerDeps};
pub use health::HealthHandler;

impl From<Commands> for Box<dyn CommandHandler> {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Register(args) => Box::new(FacesHandler::new(FaceOperation::Register(args))),
            Commands::Verify(args) => Box::new(FacesHandler::new(FaceOperation::Verify(args))),
            Commands::Status(args) => Box::new(FacesHandler::new(FaceOperation::Status(args))),
            Commands::Delete(args) => Box::new(FacesHandler::new(FaceOperation::Delete(args))),
            Commands::Health => Box::new(HealthHandler::new()),
        }
    }
}

pub(crate) fn exit_code_for(error: Option<ErrorKind>) -> ExitCode {
    error.map(ErrorKind::exit_code).unwrap_or(ExitCode::SUCCESS)
}
