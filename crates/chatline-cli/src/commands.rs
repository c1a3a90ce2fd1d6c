use anyhow::{Result, bail};
use chatline_common::{Contact, ConversationId, CounterpartKind, Cursor, Page, Turn, TurnRole};
use chatline_conversation::{ConversationOrchestrator, SendOutcome};

use crate::cli::Commands;

pub async fn run(
    orchestrator: &ConversationOrchestrator,
    command: Commands,
    json: bool,
) -> Result<()> {
    match command {
        Commands::Contacts => {
            let contacts = orchestrator.load_contacts().await?;
            print_contacts(&contacts, json)
        }
        Commands::AddContact { id, name, scripted } => {
            let kind = if scripted {
                CounterpartKind::Scripted
            } else {
                CounterpartKind::Default
            };
            let contact = orchestrator
                .add_contact(ConversationId::new(id), &name, kind)
                .await?;
            print_contacts(std::slice::from_ref(&contact), json)
        }
        Commands::History { id, before } => {
            let cursor = before.as_deref().map(str::parse::<Cursor>).transpose()?;
            let page = orchestrator
                .load_page(&ConversationId::new(id), cursor.as_ref())
                .await?;
            print_page(&page, json)
        }
        Commands::Send { id, text } => {
            let outcome = orchestrator
                .send_turn(&ConversationId::new(id), &text)
                .await;
            print_outcome(&outcome, json)
        }
        Commands::More { id } => match orchestrator.load_more(&ConversationId::new(id)).await? {
            Some(page) => print_page(&page, json),
            None => {
                if json {
                    println!("null");
                } else {
                    println!("(nothing older to load)");
                }
                Ok(())
            }
        },
        Commands::Check => {
            let healthy = orchestrator.check_provider().await?;
            if json {
                println!("{}", serde_json::json!({ "healthy": healthy }));
            } else if healthy {
                println!("provider reachable");
            }
            if !healthy {
                bail!("provider unreachable");
            }
            Ok(())
        }
    }
}

fn print_contacts(contacts: &[Contact], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(contacts)?);
        return Ok(());
    }
    if contacts.is_empty() {
        println!("(no contacts)");
    }
    for contact in contacts {
        println!(
            "{:<16} {:<24} {}",
            contact.id.as_str(),
            contact.display_name,
            contact.kind
        );
    }
    Ok(())
}

fn print_page(page: &Page, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(page)?);
        return Ok(());
    }
    for turn in &page.turns {
        print_turn(turn);
    }
    if page.has_more {
        if let Some(cursor) = page.next_cursor() {
            println!("-- older turns available: --before {cursor}");
        }
    }
    Ok(())
}

fn print_outcome(outcome: &SendOutcome, json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "sent": outcome.sent,
            "reply": outcome.reply,
            "error": outcome.error,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    print_turn(&outcome.reply);
    if let Some(kind) = outcome.error {
        bail!("send failed: {kind}");
    }
    Ok(())
}

fn print_turn(turn: &Turn) {
    let who = match turn.role {
        TurnRole::Actor => "you",
        TurnRole::Counterpart => "them",
    };
    println!(
        "[{}] {who:>4}: {}",
        turn.created_at.format("%Y-%m-%d %H:%M:%S"),
        turn.text
    );
}
