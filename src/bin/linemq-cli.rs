//! linemq-cli – interactive client.
//
//  $ linemq-cli 127.0.0.1 7000
//  1. Create queue   2. Send message   3. Open queue   4. Exit
use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};

use linemq::{logging::init_logging_with, Client};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "linemq-cli", version, about = "Interactive linemq client")]
struct Cli {
    /// Broker address
    ip: IpAddr,

    /// Broker port
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,
}

const MENU: &str = "\
Choose an option:
1. Create Queue
2. Send Message
3. Open Queue
4. Exit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging_with("warn");

    let addr = SocketAddr::new(cli.ip, cli.port);
    let mut rl: Editor<(), DefaultHistory> = DefaultEditor::new()?;

    // Opening a queue hands the connection over to the subscription, so the
    // next request reconnects.
    let mut client = Some(Client::connect(addr).await?);
    println!("Connected to {addr}.");

    loop {
        println!("{MENU}");
        let Ok(choice) = rl.readline("Enter your choice: ") else { break };
        if let Err(e) = rl.add_history_entry(choice.as_str()) {
            debug!("history not updated: {e}");
        }

        let conn = match client.take() {
            Some(c) => c,
            None => match Client::connect(addr).await {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Cannot reach broker: {e}");
                    continue;
                }
            },
        };

        match choice.trim() {
            "1" => {
                let mut conn = conn;
                let Some((name, max_size, ttl)) = prompt_create(&mut rl) else {
                    eprintln!("Invalid input.");
                    client = Some(conn);
                    continue;
                };
                match conn.create_queue(&name, max_size, ttl).await {
                    Ok(()) => println!("Queue created successfully."),
                    Err(e) => eprintln!("Failed to create queue: {e}"),
                }
                client = Some(conn);
            }
            "2" => {
                let mut conn = conn;
                let name = prompt(&mut rl, "Enter queue name: ");
                let body = prompt(&mut rl, "Enter message: ");
                match conn.send_message(name.trim(), &body).await {
                    Ok(()) => println!("Message sent successfully."),
                    Err(e) => eprintln!("Failed to send message: {e}"),
                }
                client = Some(conn);
            }
            "3" => {
                let name = prompt(&mut rl, "Enter queue name to open: ");
                match conn.open_queue(name.trim()).await {
                    Ok(mut sub) => {
                        println!("Queue opened successfully. Waiting for messages...");
                        loop {
                            match sub.next_message().await {
                                Ok(Some(msg)) => println!("Received: {msg}"),
                                Ok(None) => break,
                                Err(e) => {
                                    eprintln!("Error receiving message: {e}");
                                    break;
                                }
                            }
                        }
                        println!("Disconnected from queue.");
                    }
                    Err(e) => eprintln!("Failed to open queue: {e}"),
                }
            }
            "4" => {
                println!("Exiting...");
                break;
            }
            _ => {
                eprintln!("Invalid choice!");
                client = Some(conn);
            }
        }
    }

    Ok(())
}

fn prompt(rl: &mut Editor<(), DefaultHistory>, label: &str) -> String {
    rl.readline(label).unwrap_or_default()
}

fn prompt_create(rl: &mut Editor<(), DefaultHistory>) -> Option<(String, i64, i64)> {
    let name = prompt(rl, "Enter queue name: ");
    let max_size = prompt(rl, "Enter max size of the queue: ").trim().parse().ok()?;
    let ttl = prompt(rl, "Enter message TTL (seconds): ").trim().parse().ok()?;
    Some((name.trim().to_string(), max_size, ttl))
}
