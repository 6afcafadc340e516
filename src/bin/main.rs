use portfolio_chat_core::{
    backend::HttpBackend,
    config::ClientConfig,
    memory::{Message, MessageContent},
    models::AnalysisResult,
    orchestrator::ProgressSnapshot,
    ChatController, ChatError, HoldingsStatus,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const HELP: &str = "Commands:
  /login <username> <password> [code]   connect the brokerage account
  /mfa                                  show or hide the second-factor field
  /cancel                               close the login dialog
  /holdings                             reload holdings
  /theme                                toggle dark/light theme
  /quit                                 exit
Anything else is sent to the analyst.";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config = ClientConfig::from_env()?;
    info!(backend_url = %config.backend_url, "Portfolio chat starting");

    let backend = Arc::new(HttpBackend::new(config.backend_url.clone())?);
    let mut controller = ChatController::new(backend, &config)?;

    tokio::spawn(print_progress(controller.subscribe_progress()));

    if let Some(greeting) = controller.session().last() {
        print_message(greeting);
    }
    println!("(theme: {})\n{}\n", controller.theme().as_str(), HELP);

    report_holdings(controller.refresh_holdings().await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut words = line.split_whitespace();
        match words.next() {
            Some("/quit") | Some("/exit") => break,
            Some("/help") => println!("{}", HELP),
            Some("/holdings") => report_holdings(controller.refresh_holdings().await),
            Some("/theme") => match controller.toggle_theme() {
                Ok(theme) => println!("Theme: {}", theme.as_str()),
                Err(e) => eprintln!("Could not save theme: {}", e),
            },
            Some("/mfa") => {
                let visible = controller.open_challenge().toggle_second_factor();
                println!("Second-factor field {}", if visible { "shown" } else { "hidden" });
            }
            Some("/cancel") => {
                controller.cancel_challenge();
                println!("Login cancelled.");
            }
            Some("/login") => {
                let (Some(username), Some(password)) = (words.next(), words.next()) else {
                    println!("Usage: /login <username> <password> [code]");
                    continue;
                };
                let code = words.next();

                let challenge = controller.open_challenge();
                challenge.set_username(username)?;
                challenge.set_password(password)?;
                if let Some(code) = code {
                    if !challenge.second_factor_visible() {
                        challenge.toggle_second_factor();
                    }
                    challenge.set_second_factor_code(code)?;
                }

                match controller.submit_challenge().await {
                    Ok(status) => {
                        println!("Connected.");
                        report_holdings(Ok(status));
                    }
                    Err(ChatError::Auth(e)) => {
                        println!("Login failed: {}", e);
                        if controller.challenge().is_some_and(|c| c.second_factor_visible()) {
                            println!("Enter the code: /login <username> <password> <code>");
                        }
                    }
                    Err(e) => println!("Login failed: {}", e),
                }
            }
            Some(command) if command.starts_with('/') => {
                println!("Unknown command {}\n{}", command, HELP);
            }
            _ => {
                let result = controller.send(line).await;
                if let Some(reply) = controller.session().last() {
                    print_message(reply);
                }
                match result {
                    Err(ChatError::AuthRequired) => {
                        println!("Please connect first: /login <username> <password>");
                    }
                    Err(e) => warn!("Query failed: {}", e),
                    Ok(_) => {}
                }
            }
        }
    }

    Ok(())
}

async fn print_progress(mut progress: watch::Receiver<ProgressSnapshot>) {
    while progress.changed().await.is_ok() {
        let snapshot = *progress.borrow_and_update();
        if let Some(stage) = snapshot.current_stage() {
            println!("  … {}", stage.label);
        }
    }
}

fn report_holdings(status: portfolio_chat_core::Result<HoldingsStatus>) {
    match status {
        Ok(HoldingsStatus::Loaded(count)) => println!("Loaded {} holdings.", count),
        Ok(HoldingsStatus::LoginRequired) => {
            println!("Not connected. Use /login <username> <password> to connect your brokerage.")
        }
        Err(e) => println!("Holdings unavailable: {}", e),
    }
}

fn print_message(message: &Message) {
    match message.content() {
        Some(MessageContent::Text(text)) => println!("\n{}\n", text),
        Some(MessageContent::Structured(analysis)) => println!("\n{}\n", format_card(analysis)),
        None => {}
    }
}

fn format_card(analysis: &AnalysisResult) -> String {
    let mut out = String::new();

    let ticker = analysis.ticker().unwrap_or("?");
    out.push_str(&format!("### {}", ticker));
    if let Some(name) = analysis.stock_info.as_ref().and_then(|i| i.name.as_deref()) {
        out.push_str(&format!(" ({})", name));
    }
    out.push_str(&format!("\n**{}**", analysis.recommendation));
    if let Some(confidence) = &analysis.confidence {
        out.push_str(&format!(" • Confidence: {}", confidence));
    }
    if let Some(target) = &analysis.price_target {
        out.push_str(&format!(" • Target: {}", target));
    }
    out.push_str(&format!("\n\n{}\n", analysis.synthesis));

    for (title, items) in [("Risks", &analysis.risks), ("Catalysts", &analysis.catalysts)] {
        if !items.is_empty() {
            out.push_str(&format!("\n{}:\n", title));
            for item in items {
                out.push_str(&format!("- {}\n", item));
            }
        }
    }

    if !analysis.errors.is_empty() {
        out.push_str(&format!("\n⚠️ Partial data: {}\n", analysis.errors.join("; ")));
    }

    out
}
