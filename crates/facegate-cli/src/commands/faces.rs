use std::any::Any;
use std::process::ExitCode;

use facegate_core::errors::AppResult;
use facegate_core::faces::{
    DeleteResponse, RegisterResponse, StatusResponse, VerificationService, VerifyResponse,
};
use facegate_core::imaging::{decode_image_data, load_image_file};
use image::RgbImage;

use crate::cli::{ImageCommandArgs, ImageSource, OutputMode, UserArgs};
use crate::commands::{exit_code_for, CommandHandler};
use crate::output::{render_delete, render_register, render_status, render_verify};

#[derive(Debug, Clone)]
pub enum FaceOperation {
    Register(ImageCommandArgs),
    Verify(ImageCommandArgs),
    Status(UserArgs),
    Delete(UserArgs),
}

pub struct FacesHandler {
    operation: FaceOperation,
    deps: FacesHandlerDeps,
}

pub struct FacesHandlerDeps {
    pub load_image: Box<dyn Fn(&ImageSource) -> AppResult<Option<RgbImage>> + Send + Sync>,
    pub render_register: Box<dyn Fn(&RegisterResponse, OutputMode) -> AppResult<()> + Send + Sync>,
    pub render_verify: Box<dyn Fn(&VerifyResponse, OutputMode) -> AppResult<()> + Send + Sync>,
    pub render_status: Box<dyn Fn(&StatusResponse, OutputMode) -> AppResult<()> + Send + Sync>,
    pub render_delete: Box<dyn Fn(&DeleteResponse, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl FacesHandlerDeps {
    pub fn new(
        load_image: impl Fn(&ImageSource) -> AppResult<Option<RgbImage>> + Send + Sync + 'static,
        render_register: impl Fn(&RegisterResponse, OutputMode) -> AppResult<()>
            + Send
            + Sync
            + 'static,
        render_verify: impl Fn(&VerifyResponse, OutputMode) -> AppResult<()> + Send + Sync + 'static,
        render_status: impl Fn(&StatusResponse, OutputMode) -> AppResult<()> + Send + Sync + 'static,
        render_delete: impl Fn(&DeleteResponse, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            load_image: Box::new(load_image),
            render_register: Box::new(render_register),
            render_verify: Box::new(render_verify),
            render_status: Box::new(render_status),
            render_delete: Box::new(render_delete),
        }
    }
}

impl Default for FacesHandlerDeps {
    fn default() -> Self {
        Self::new(
            load_image_source,
            render_register,
            render_verify,
            render_status,
            render_delete,
        )
    }
}

impl FacesHandler {
    pub fn new(operation: FaceOperation) -> Self {
        Self {
            operation,
            deps: FacesHandlerDeps::default(),
        }
    }

    pub fn with_dependencies(operation: FaceOperation, deps: FacesHandlerDeps) -> Self {
        Self { operation, deps }
    }

    pub fn operation(&self) -> &FaceOperation {
        &self.operation
    }

    /// Images are only decoded once the registry state says they will be used.
    fn probe_image(
        &self,
        service: &VerificationService,
        args: &ImageCommandArgs,
        needs_registered: bool,
    ) -> AppResult<Option<RgbImage>> {
        if service.store().status(&args.user) != needs_registered {
            return Ok(None);
        }
        (self.deps.load_image)(&args.image)
    }
}

impl CommandHandler for FacesHandler {
    fn execute(&self, service: &VerificationService, mode: OutputMode) -> AppResult<ExitCode> {
        let code = match &self.operation {
            FaceOperation::Register(args) => {
                let image = self.probe_image(service, args, false)?;
                let response = service.register(&args.user, image.as_ref());
                (self.deps.render_register)(&response, mode)?;
                exit_code_for(response.error)
            }
            FaceOperation::Verify(args) => {
                let image = self.probe_image(service, args, true)?;
                let response = service.verify(&args.user, image.as_ref());
                (self.deps.render_verify)(&response, mode)?;
                exit_code_for(response.error)
            }
            FaceOperation::Status(args) => {
                let response = service.status(&args.user);
                (self.deps.render_status)(&response, mode)?;
                ExitCode::SUCCESS
            }
            FaceOperation::Delete(args) => {
                let response = service.delete(&args.user);
                (self.deps.render_delete)(&response, mode)?;
                exit_code_for(response.error)
            }
        };
        Ok(code)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn load_image_source(source: &ImageSource) -> AppResult<Option<RgbImage>> {
    if let Some(path) = &source.image {
        return load_image_file(path).map(Some);
    }
    match &source.image_data {
        Some(payload) => decode_image_data(payload).map(Some),
        None => Ok(None),
    }
}
