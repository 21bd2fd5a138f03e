//! Connection CLI command handlers

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::backend::DeviceAuthorization;
use crate::cli::interruptible;
use crate::error::Result;
use crate::github::DeviceAuthStatus;
use crate::import::ImportOrchestrator;

/// Handle the status command
pub async fn handle_status(orchestrator: &ImportOrchestrator) -> Result<()> {
    let status = orchestrator.auth().connection_status().await?;

    println!("GitHub Connection Status");
    println!("========================");
    println!();

    if !status.connected {
        println!("✗ Not connected");
        println!();
        println!("  Run 'crewdeck connect' to authorize the dashboard.");
        return Ok(());
    }

    match &status.login {
        Some(login) => println!("✓ Connected as {}", login),
        None => println!("✓ Connected"),
    }

    if status.has_required_scope {
        println!("  Private repositories: accessible");
    } else {
        println!("  Private repositories: not accessible (token lacks 'repo' scope)");
        println!();
        println!("  To grant access, run: crewdeck connect --reconnect");
    }

    Ok(())
}

/// Handle the connect command using the device flow
pub async fn handle_connect(orchestrator: &ImportOrchestrator, reconnect: bool) -> Result<()> {
    if !reconnect {
        let status = orchestrator.auth().connection_status().await?;
        if status.connected && status.has_required_scope {
            println!("✓ Already connected to GitHub.");
            println!();
            println!("  To authorize again, run: crewdeck connect --reconnect");
            return Ok(());
        }
    }

    println!("Starting GitHub authorization...\n");

    let printer = spawn_code_printer(orchestrator.auth().subscribe());
    let result = interruptible(
        async {
            if reconnect {
                orchestrator.auth().reconnect().await?;
                orchestrator.auth().wait().await?;
                orchestrator.auth().connection_status().await
            } else {
                orchestrator.ensure_connected().await
            }
        },
        || orchestrator.cancel(),
    )
    .await;
    printer.abort();

    let status = result?;
    match status.login {
        Some(login) => println!("\n✓ Connected to GitHub as {}!", login),
        None => println!("\n✓ Connected to GitHub!"),
    }
    Ok(())
}

/// Handle the disconnect command
pub async fn handle_disconnect(orchestrator: &ImportOrchestrator) -> Result<()> {
    orchestrator.auth().disconnect().await?;
    println!("✓ GitHub authorization revoked.");
    Ok(())
}

/// Print the user code whenever a new device authorization starts
pub(crate) fn spawn_code_printer(mut rx: watch::Receiver<DeviceAuthStatus>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shown: Option<String> = None;
        loop {
            let status = rx.borrow_and_update().clone();
            match status {
                DeviceAuthStatus::Waiting(auth)
                    if shown.as_deref() != Some(auth.state_id.as_str()) =>
                {
                    print_device_code(&auth);
                    shown = Some(auth.state_id);
                }
                DeviceAuthStatus::Complete => println!("✓ Authorization approved."),
                _ => {}
            }

            if rx.changed().await.is_err() {
                break;
            }
        }
    })
}

fn print_device_code(auth: &DeviceAuthorization) {
    // Display the code prominently
    println!("┌────────────────────────────────────┐");
    println!("│  Your code:  {:<22}│", auth.user_code);
    println!("└────────────────────────────────────┘");
    println!();
    println!("Open this URL in your browser:");
    println!("  {}", auth.verification_uri);
    println!();
    println!("Enter the code shown above and authorize the app.");
    println!();
    println!("Waiting for authorization...");
}
