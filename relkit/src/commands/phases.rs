//! High-level phase commands.

use anyhow::Result;

use relkit_core::phases::{
    self, InstallOptions, PrepareOptions, ReleaseOptions, ValidateOptions,
};

use crate::formatting::{print_error, print_success};

use super::Session;

fn announce(phase: &str, success: bool) -> bool {
    if success {
        print_success(&format!("{} finished", phase));
    } else {
        print_error(&format!("{} failed", phase));
    }
    success
}

pub fn cmd_prepare(session: &Session, options: PrepareOptions) -> Result<bool> {
    let mut pipeline = session.pipeline()?;
    let success = phases::prepare(&mut pipeline, &options)?;
    Ok(announce("Prepare", success))
}

pub fn cmd_install(session: &Session, options: InstallOptions) -> Result<bool> {
    let mut pipeline = session.pipeline()?;
    let success = phases::install(&mut pipeline, &options)?;
    Ok(announce("Install", success))
}

pub fn cmd_validate(session: &Session, options: ValidateOptions) -> Result<bool> {
    let mut pipeline = session.pipeline()?;
    let success = phases::validate(&mut pipeline, &options)?;
    Ok(announce("Validation", success))
}

pub fn cmd_release(session: &Session, options: ReleaseOptions) -> Result<bool> {
    let mut pipeline = session.pipeline()?;
    let success = phases::release(&mut pipeline, &options)?;
    Ok(announce("Release", success))
}
