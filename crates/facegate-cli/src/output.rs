use std::error::Error;
use std::io::{self, Write};

use facegate_core::errors::{AppError, AppResult};
use facegate_core::faces::{
    DeleteResponse, HealthResponse, RegisterResponse, StatusResponse, VerifyResponse,
};
use serde::Serialize;
use serde_json::json;

use crate::cli::OutputMode;

fn write_json_line<T: Serialize>(value: &T) -> AppResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let payload = serde_json::to_string(value)?;
    handle.write_all(payload.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

pub fn render_register(response: &RegisterResponse, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if response.success {
                println!("{} (user {})", response.message, response.user_id);
            } else {
                eprintln!("error: {}", response.message);
            }
        }
        OutputMode::Json => write_json_line(response)?,
    }
    Ok(())
}

pub fn render_verify(response: &VerifyResponse, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if response.error.is_some() && response.confidence.is_none() {
                eprintln!("error: {}", response.message);
            } else {
                println!("{}", verify_summary(response));
            }
        }
        OutputMode::Json => write_json_line(response)?,
    }
    Ok(())
}

pub fn verify_summary(response: &VerifyResponse) -> String {
    let mut line = response.message.clone();
    if let Some(confidence) = response.confidence {
        line.push_str(&format!(" (confidence {confidence:.4}"));
        if let Some(distance) = response.distance {
            line.push_str(&format!(", distance {distance:.4}"));
        }
        line.push(')');
    }
    line
}

pub fn render_status(response: &StatusResponse, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => println!("{}: {}", response.user_id, response.message),
        OutputMode::Json => write_json_line(response)?,
    }
    Ok(())
}

pub fn render_delete(response: &DeleteResponse, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if response.success {
                println!("{}", response.message);
            } else {
                eprintln!("error: {}", response.message);
            }
        }
        OutputMode::Json => write_json_line(response)?,
    }
    Ok(())
}

pub fn render_health(response: &HealthResponse, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            println!("Status: {}", response.status);
            println!(
                "Mode: {}",
                if response.face_recognition_enabled {
                    "full recognition (vector)"
                } else {
                    "simplified (digest, no comparison)"
                }
            );
            println!("Registered faces: {}", response.registered_faces);
        }
        OutputMode::Json => write_json_line(response)?,
    }
    Ok(())
}

pub fn render_error(err: &AppError, mode: OutputMode) {
    match mode {
        OutputMode::Human => {
            eprintln!("error: {}", err.human_message());
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "success": false,
                "error": err.kind(),
                "message": err.human_message(),
            });
            if let Ok(json) = serde_json::to_string(&payload) {
                println!("{json}");
            }
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::faces::MatchReason;

    #[test]
    fn verify_summary_includes_confidence_and_distance() {
        let response = VerifyResponse {
            success: true,
            verified: true,
            confidence: Some(0.9123),
            distance: Some(0.0877),
            reason: Some(MatchReason::WithinThreshold),
            message: "Face verified successfully".into(),
            face_registered: true,
            error: None,
        };
        assert_eq!(
            verify_summary(&response),
            "Face verified successfully (confidence 0.9123, distance 0.0877)"
        );
    }

    #[test]
    fn fallback_summary_has_no_distance() {
        let response = VerifyResponse {
            success: true,
            verified: true,
            confidence: Some(0.85),
            distance: None,
            reason: Some(MatchReason::FallbackAccepted),
            message: "Face verified successfully".into(),
            face_registered: true,
            error: None,
        };
        assert_eq!(
            verify_summary(&response),
            "Face verified successfully (confidence 0.8500)"
        );
    }
}
