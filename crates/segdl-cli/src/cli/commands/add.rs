//! `segdl add <url>` – queue a download for the next `segdl run`.

use std::path::PathBuf;

use anyhow::{bail, Result};
use segdl_core::resume_db::{NewTask, ResumeDb, TaskState};
use segdl_core::url_model;

#[derive(Debug)]
pub struct AddArgs {
    pub url: String,
    pub dir: PathBuf,
    pub filename: Option<String>,
    pub headers: Vec<String>,
    pub limit: Option<u64>,
}

pub async fn run_add(db: &ResumeDb, args: AddArgs) -> Result<()> {
    url_model::validate_url(&args.url)?;
    let mut task = NewTask::new(&args.url, args.dir);
    task.filename = args.filename;
    task.speed_limit = args.limit;
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        task.headers.insert(name, value);
    }

    let existing = db
        .list_tasks()
        .await?
        .into_iter()
        .find(|t| {
            !t.state.is_terminal()
                && t.same_target(&task.url, &task.dest_dir, task.filename.as_deref())
        });
    if let Some(t) = existing {
        println!("Task {} already downloads {}", t.id, t.url);
        return Ok(());
    }

    let id = db.insert_task(&task, TaskState::Waiting).await?;
    println!("Added task {id} for URL: {}", task.url);
    Ok(())
}

/// Splits `Name: value`.
fn parse_header(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("header must look like `Name: value`: {raw}");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("header name is empty: {raw}");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_arguments_split_on_first_colon() {
        assert_eq!(
            parse_header("Referer: https://example.com/a").unwrap(),
            ("Referer".to_string(), "https://example.com/a".to_string())
        );
        assert!(parse_header("no colon").is_err());
        assert!(parse_header(": value").is_err());
    }
}
