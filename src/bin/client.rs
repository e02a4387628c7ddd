// src/bin/client.rs

//! An interactive terminal client for the ChatRelay server.
//!
//! Usage: `chatrelay-client [username] [host] [port]`

use anyhow::{Context, Result, anyhow};
use chatrelay::core::protocol::wire_message::MAX_PAYLOAD_LEN;
use chatrelay::core::protocol::wire_message::MAX_SENDER_LEN;
use chatrelay::core::protocol::{MessageType, WireMessage, WireMessageCodec};
use chatrelay::core::unix_timestamp;
use chrono::{Local, TimeZone};
use futures::{SinkExt, StreamExt};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CACHE_TEST_COUNT: usize = 20;
const MAX_CACHE_TEST_COUNT: usize = 100;
const CACHE_TEST_INTERVAL: Duration = Duration::from_millis(50);

type StdinLines = Lines<BufReader<Stdin>>;
type RecordSink = FramedWrite<OwnedWriteHalf, WireMessageCodec>;

/// One line of user input, interpreted.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Quit,
    Help,
    Stats,
    CacheTest(usize),
    Text(String),
    Empty,
    Invalid(&'static str),
}

impl Input {
    fn parse(line: &str) -> Self {
        match line {
            "/quit" | "/exit" => return Input::Quit,
            "/help" => return Input::Help,
            "/stats" => return Input::Stats,
            "/cachetest" => return Input::CacheTest(DEFAULT_CACHE_TEST_COUNT),
            "" => return Input::Empty,
            _ => {}
        }
        if let Some(arg) = line.strip_prefix("/cachetest ") {
            return match arg.trim().parse::<usize>() {
                Ok(n) if (1..=MAX_CACHE_TEST_COUNT).contains(&n) => Input::CacheTest(n),
                Ok(_) => Input::Invalid("Number of messages must be between 1 and 100"),
                Err(_) => Input::Invalid("Invalid number format. Usage: /cachetest N"),
            };
        }
        Input::Text(line.to_string())
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("ERROR: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let user_id = match args.get(1) {
        Some(name) => name.clone(),
        None => {
            prompt("Enter your username: ");
            stdin
                .next_line()
                .await
                .context("Failed to read username")?
                .ok_or_else(|| anyhow!("Failed to read username"))?
        }
    };
    validate_username(&user_id).map_err(|e| anyhow!(e))?;

    let host = args.get(2).map(String::as_str).unwrap_or(DEFAULT_HOST);
    let port = match args.get(3) {
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => return Err(anyhow!("Invalid port number (must be 1-65535): {raw}")),
        },
        None => DEFAULT_PORT,
    };

    println!("Connecting to server at {host}:{port}...");
    let mut stream = TcpStream::connect((host, port))
        .await
        .context("Connection failed. Is the server running?")?;
    println!("Connected to server!");

    // The identity goes out raw and NUL-terminated, ahead of any record.
    let mut handshake = user_id.clone().into_bytes();
    handshake.push(0);
    stream
        .write_all(&handshake)
        .await
        .context("Failed to send user ID to server")?;

    println!("\nWelcome to the chat, {user_id}!");
    println!("Type /help for available commands");
    println!("Type /quit to disconnect\n");

    let (read_half, write_half) = stream.into_split();
    let mut receiver = tokio::spawn(receive_messages(FramedRead::new(
        read_half,
        WireMessageCodec,
    )));
    let mut sink = FramedWrite::new(write_half, WireMessageCodec);

    let outcome = send_messages(&mut stdin, &mut sink, &user_id, &mut receiver).await;

    println!("\nDisconnecting from server...");
    let _ = sink.close().await;
    receiver.abort();
    println!("Disconnected successfully. Goodbye!");
    outcome
}

/// Reads stdin until the user quits, stdin closes, or the server goes away.
async fn send_messages(
    stdin: &mut StdinLines,
    sink: &mut RecordSink,
    user_id: &str,
    receiver: &mut tokio::task::JoinHandle<()>,
) -> Result<()> {
    loop {
        prompt("You: ");
        let line = tokio::select! {
            line = stdin.next_line() => line?,
            _ = &mut *receiver => return Ok(()),
        };
        let Some(line) = line else {
            return Ok(());
        };

        match Input::parse(&line) {
            Input::Quit => return Ok(()),
            Input::Help => print_help(),
            Input::Empty => {}
            Input::Invalid(reason) => println!("[ERROR] {reason}"),
            Input::Stats => {
                let request = WireMessage::new(MessageType::Status, user_id, "", unix_timestamp());
                sink.send(request)
                    .await
                    .context("Failed to send stats request")?;
                println!("Requesting statistics from server...");
            }
            Input::CacheTest(count) => {
                println!("Sending {count} test messages to fill cache...");
                for i in 1..=count {
                    let msg = WireMessage::new(
                        MessageType::Text,
                        user_id,
                        &format!("Cache test message #{i}"),
                        unix_timestamp(),
                    );
                    if let Err(e) = sink.send(msg).await {
                        println!("\n[ERROR] Failed to send test message {i}: {e}");
                        break;
                    }
                    tokio::time::sleep(CACHE_TEST_INTERVAL).await;
                }
                println!("Sent {count} test messages. Use /stats to see cache statistics.");
            }
            Input::Text(text) => {
                if text.len() > MAX_PAYLOAD_LEN {
                    println!(
                        "[WARNING] Message too long, truncating to {MAX_PAYLOAD_LEN} characters"
                    );
                }
                let msg = WireMessage::new(MessageType::Text, user_id, &text, unix_timestamp());
                sink.send(msg).await.context("Failed to send message")?;
            }
        }
    }
}

/// Prints every record the server relays until the connection closes.
async fn receive_messages(mut reader: FramedRead<OwnedReadHalf, WireMessageCodec>) {
    while let Some(res) = reader.next().await {
        let msg = match res {
            Ok(msg) => msg,
            Err(_) => break,
        };
        let time = format_time(msg.timestamp);
        match msg.kind {
            MessageType::Text => println!("\n[{time}] {}: {}", msg.sender, msg.payload),
            MessageType::Join => println!("\n[{time}] >>> {}", msg.payload),
            MessageType::Leave => println!("\n[{time}] <<< {}", msg.payload),
            _ => continue,
        }
        prompt("You: ");
    }
    println!("\n[Server disconnected]");
}

fn validate_username(user_id: &str) -> Result<(), String> {
    if user_id.is_empty() {
        return Err("Username cannot be empty".to_string());
    }
    if user_id.len() > MAX_SENDER_LEN {
        return Err(format!(
            "Username too long (max {MAX_SENDER_LEN} characters)"
        ));
    }
    if user_id.chars().any(|c| c.is_control()) {
        return Err("Username contains invalid characters".to_string());
    }
    Ok(())
}

fn format_time(timestamp: i64) -> String {
    Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "??:??:??".to_string())
}

fn prompt(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

fn print_help() {
    println!("\nAvailable commands:");
    println!("  /quit, /exit   - Disconnect from chat");
    println!("  /help          - Show this help message");
    println!("  /stats         - Request server statistics");
    println!("  /cachetest N   - Send N messages to test cache (e.g., /cachetest 20)");
    println!();
}
