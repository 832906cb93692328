//! `segdl status` – show status of all downloads.

use anyhow::Result;
use segdl_core::resume_db::{ResumeDb, TaskRecord};

pub async fn run_status(db: &ResumeDb) -> Result<()> {
    let tasks = db.list_tasks().await?;
    if tasks.is_empty() {
        println!("No downloads in database.");
        return Ok(());
    }
    println!(
        "{:<6} {:<12} {:>7} {:<24} {}",
        "ID", "STATE", "DONE", "FILE", "URL"
    );
    for t in tasks {
        println!(
            "{:<6} {:<12} {:>7} {:<24} {}",
            t.id,
            t.state.as_str(),
            percent(&t),
            t.filename.as_deref().unwrap_or("-"),
            t.url
        );
        if let (Some(code), Some(msg)) = (t.error_code, &t.error_message) {
            println!("       error {code}: {msg}");
        }
    }
    Ok(())
}

fn percent(t: &TaskRecord) -> String {
    match t.total_size {
        Some(total) if total > 0 => {
            format!("{:.1}%", t.downloaded_size as f64 * 100.0 / total as f64)
        }
        _ => "-".to_string(),
    }
}
