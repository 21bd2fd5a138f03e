//! Repository and import CLI command handlers

use std::io::{self, Write};

use secrecy::SecretString;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::BranchRef;
use crate::cli::commands::{ImportArgs, PatArgs};
use crate::cli::connect::spawn_code_printer;
use crate::cli::{confirm, interruptible, prompt_pat, read_pat};
use crate::error::{CrewdeckError, Result};
use crate::github::resolver::preferred_branch;
use crate::github::{CloneState, RepositoryRef};
use crate::import::{ImportOrchestrator, ProjectDetails};

/// Handle the repos command
pub async fn handle_repos(orchestrator: &ImportOrchestrator, query: Option<String>) -> Result<()> {
    require_connection(orchestrator).await?;

    let query = query.unwrap_or_default();
    let repos = orchestrator
        .search_repositories(query.trim())
        .await?
        .unwrap_or_default();

    if repos.is_empty() {
        println!("No repositories found.");
        return Ok(());
    }

    for repo in &repos {
        let visibility = if repo.private { "private" } else { "public" };
        println!(
            "  {:<40} {:<8} {}",
            repo.full_name,
            visibility,
            repo.default_branch.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Handle the branches command
pub async fn handle_branches(
    orchestrator: &ImportOrchestrator,
    repo: &str,
    pat: &PatArgs,
) -> Result<()> {
    // Malformed input fails here, before any request
    let repo = orchestrator.resolver().resolve_direct_input(repo)?;
    let pat = read_pat(pat)?;
    require_connection(orchestrator).await?;

    let branches = load_branches(orchestrator, &repo, pat).await?;
    if branches.is_empty() {
        println!("{} has no branches.", repo.full_name);
        return Ok(());
    }

    let preferred = preferred_branch(&repo, &branches).map(|b| b.name.clone());
    for branch in &branches {
        let marker = if Some(&branch.name) == preferred.as_ref() {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, branch.name);
    }
    Ok(())
}

/// Handle the import command: connect, resolve, clone, register
pub async fn handle_import(orchestrator: &ImportOrchestrator, args: ImportArgs) -> Result<()> {
    let repo = orchestrator.resolver().resolve_direct_input(&args.repo)?;
    let pat = read_pat(&args.pat)?;

    let printer = spawn_code_printer(orchestrator.auth().subscribe());
    let connected = interruptible(orchestrator.ensure_connected(), || orchestrator.cancel()).await;
    printer.abort();
    if let Some(login) = connected?.login {
        println!("✓ Connected to GitHub as {}", login);
    }

    println!("Loading branches of {}...", repo.full_name);
    let branches = load_branches(orchestrator, &repo, pat).await?;
    let branch_name = match args.branch {
        Some(name) => name,
        None => preferred_branch(&repo, &branches)
            .map(|b| b.name.clone())
            .ok_or_else(|| {
                CrewdeckError::InvalidInput(format!(
                    "Repository '{}' has no branches to clone.",
                    repo.full_name
                ))
            })?,
    };
    let branch = orchestrator.select_branch(&branch_name)?;
    println!("✓ Branch: {}", branch.name);

    let details = ProjectDetails {
        name: args.name,
        core_goal: args.goal,
        target_path: args.target,
    };

    let progress = spawn_clone_printer(orchestrator.clone_monitor().subscribe());
    let mut result = interruptible(orchestrator.clone_and_register(details), || {
        orchestrator.cancel()
    })
    .await;
    progress.abort();
    println!();

    while let Err(CrewdeckError::RegistrationFailed {
        target_path,
        message,
    }) = &result
    {
        eprintln!("✗ Project registration failed: {}", message);
        eprintln!("  The checkout at '{}' is kept.", target_path);
        if !confirm("Retry registration?")? {
            break;
        }
        result = orchestrator.retry_registration().await;
    }
    let imported = result?;

    if let CloneState::Done {
        already_existed: true,
        ..
    } = orchestrator.clone_monitor().state()
    {
        println!("✓ Repository was already cloned; reusing the existing checkout.");
    }

    println!("✓ Imported {} ({})", repo.full_name, imported.branch);
    println!("  Project: {}", imported.project_id);
    println!("  Path:    {}", imported.project_path);
    Ok(())
}

async fn require_connection(orchestrator: &ImportOrchestrator) -> Result<()> {
    let status = orchestrator.auth().connection_status().await?;
    if status.connected {
        Ok(())
    } else {
        Err(CrewdeckError::NotConnected)
    }
}

/// Load branches, offering a PAT retry when access is denied
async fn load_branches(
    orchestrator: &ImportOrchestrator,
    repo: &RepositoryRef,
    pat: Option<SecretString>,
) -> Result<Vec<BranchRef>> {
    match orchestrator.select_repository(repo.clone(), pat).await {
        Err(err @ (CrewdeckError::RepoAccessDenied { .. } | CrewdeckError::InvalidPat)) => {
            eprintln!("✗ Cannot list branches of '{}'.", repo.full_name);
            match prompt_pat()? {
                Some(pat) => orchestrator.retry_with_pat(pat).await,
                None => Err(err),
            }
        }
        other => other,
    }
}

/// One progress line for a clone state, if it has one
fn progress_line(state: &CloneState) -> Option<String> {
    match state {
        CloneState::Submitting => Some("Submitting clone job...".to_string()),
        CloneState::Cloning {
            progress, status, ..
        } => Some(format!("Cloning... {:>3}% ({})", progress, status)),
        _ => None,
    }
}

fn spawn_clone_printer(mut rx: watch::Receiver<CloneState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last: Option<String> = None;
        loop {
            let line = progress_line(&rx.borrow_and_update());
            if let Some(line) = line {
                if last.as_ref() != Some(&line) {
                    print!("\r{}", line);
                    io::stdout().flush().ok();
                    last = Some(line);
                }
            }

            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CloneJobStatus;

    #[test]
    fn test_progress_line_for_cloning() {
        let state = CloneState::Cloning {
            clone_id: "c1".into(),
            progress: 42,
            status: CloneJobStatus::Cloning,
            target_path: "workspace/widgets".into(),
        };
        assert_eq!(
            progress_line(&state).as_deref(),
            Some("Cloning...  42% (cloning)")
        );
    }

    #[test]
    fn test_progress_line_skips_terminal_states() {
        assert!(progress_line(&CloneState::Idle).is_none());
        assert!(progress_line(&CloneState::Failed {
            message: "boom".into()
        })
        .is_none());
        assert_eq!(
            progress_line(&CloneState::Submitting).as_deref(),
            Some("Submitting clone job...")
        );
    }
}
