//! Report location handling

use crate::engine::ReportRequest;
use crate::error::{Result, ZapWrapperError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where the engine has to write the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTarget {
    pub directory: PathBuf,
    pub file_name: String,
}

/// Splits the configured report file into an absolute directory and a file name
pub fn resolve_report_target(report_file: &Path, context_name: &str) -> Result<ReportTarget> {
    if report_file.is_dir() {
        return Err(ZapWrapperError::ConfigError(format!(
            "For scan: {context_name}. Report file cannot be a directory!"
        )));
    }
    let (Some(parent), Some(file_name)) = (report_file.parent(), report_file.file_name()) else {
        return Err(ZapWrapperError::ConfigError(format!(
            "For scan: {context_name}. Report file {} has no parent directory",
            report_file.display()
        )));
    };
    let directory = if parent.is_absolute() {
        parent.to_path_buf()
    } else {
        std::env::current_dir()?.join(parent)
    };
    Ok(ReportTarget {
        directory,
        file_name: file_name.to_string_lossy().into_owned(),
    })
}

/// Report generation parameters for a scan context
pub fn report_request(context_name: &str, template: &str, target: &ReportTarget) -> ReportRequest {
    ReportRequest {
        title: context_name.to_string(),
        template: template.to_string(),
        contexts: Some(context_name.to_string()),
        report_file_name: target.file_name.clone(),
        report_dir: target.directory.display().to_string(),
        display: false,
        ..ReportRequest::default()
    }
}

/// The engine appends `.json` to JSON reports; move such a file back to the
/// configured name
pub fn rename_report_if_necessary(report_file: &Path, context_name: &str) -> Result<()> {
    let mut created: OsString = report_file.as_os_str().to_owned();
    created.push(".json");
    let created = PathBuf::from(created);
    if !created.exists() {
        return Ok(());
    }
    std::fs::rename(&created, report_file).map_err(|e| {
        ZapWrapperError::IoError(std::io::Error::new(
            e.kind(),
            format!("For scan: {context_name}. An error occurred renaming the report file: {e}"),
        ))
    })?;
    info!(
        "For scan {context_name}: Report renamed to {}",
        report_file.display()
    );
    Ok(())
}
