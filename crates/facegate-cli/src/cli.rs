use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "facegate",
    about = "Register a reference face per user and verify probe images against it",
    version
)]
pub struct Cli {
    /// Emit structured JSON to stdout instead of human-readable output
    #[arg(long)]
    pub json: bool,

    /// Increase verbosity (may be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Read configuration from this file instead of /etc/facegate/config.toml
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding encodings.json and reference images (falls back to $FACEGATE_DATA_DIR)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Maximum descriptor distance accepted as a match
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Path to the dlib landmark predictor model (falls back to $DLIB_LANDMARK_MODEL)
    #[arg(long)]
    pub landmark_model: Option<PathBuf>,

    /// Path to the dlib face recognition network (falls back to $DLIB_ENCODER_MODEL)
    #[arg(long)]
    pub encoder_model: Option<PathBuf>,

    /// Number of image jitters to run before encoding
    #[arg(long)]
    pub jitters: Option<u32>,

    /// Skip face models and store image digests only (verification always succeeds)
    #[arg(long)]
    pub digest_only: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Register the reference face for a user
    Register(ImageCommandArgs),
    /// Verify a probe image against the user's registered face
    Verify(ImageCommandArgs),
    /// Report whether a user has a registered face
    Status(UserArgs),
    /// Delete a user's registered face and reference image
    Delete(UserArgs),
    /// Report extraction mode and number of registered faces
    Health,
}

#[derive(Debug, Clone, Args)]
pub struct UserArgs {
    /// User identifier (any non-empty string)
    #[arg(long)]
    pub user: String,
}

#[derive(Debug, Clone, Args)]
pub struct ImageCommandArgs {
    /// User identifier (any non-empty string)
    #[arg(long)]
    pub user: String,

    #[command(flatten)]
    pub image: ImageSource,
}

#[derive(Debug, Clone, Default, Args)]
#[group(required = false, multiple = false)]
pub struct ImageSource {
    /// Image file containing exactly one face
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Base64 image payload, optionally as a data URL
    #[arg(long)]
    pub image_data: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl From<bool> for OutputMode {
    fn from(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from(self.json)
    }
}
