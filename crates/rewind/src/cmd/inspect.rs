//! Inspect command - validate a trace file and summarize it

use std::{fs, path::Path};

use eyre::{Result, WrapErr};
use rewind_engine::RecordedTrace;

/// Print a short summary of a trace file
pub fn inspect_trace(path: &Path) -> Result<()> {
    let source = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read trace file {}", path.display()))?;
    let trace = RecordedTrace::from_json(&source)
        .wrap_err_with(|| format!("Invalid trace file {}", path.display()))?;

    let errors = trace.steps.iter().filter(|s| s.error.is_some()).count();
    println!("Trace: {}", path.display());
    println!("  micro-steps: {}", trace.len());
    println!("  lines:       {}", trace.line_count());
    println!("  max depth:   {}", trace.max_depth());
    if errors > 0 {
        println!("  errors:      {errors}");
    }
    Ok(())
}
