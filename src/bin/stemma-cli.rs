//! Line-oriented shell over the command dispatcher.
//!
//! Reads one command per line (whitespace-separated operands), dispatches
//! it against an in-process [`Db`] and prints the reply, followed by any
//! events the command published.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::Receiver;

use bytes::Bytes;
use clap::Parser;

use stemma::{DEFAULT_EVENT_QUEUE_DEPTH, Db, EventPayload, EventQueue, Reply};

#[derive(Parser)]
#[command(name = "stemma-cli", about = "Interactive shell for a stemma database")]
struct Args {
    /// Load a database snapshot before accepting commands.
    #[arg(long)]
    load: Option<PathBuf>,

    /// Save a database snapshot to this path on EOF.
    #[arg(long)]
    save: Option<PathBuf>,

    /// Depth of the event publication queue.
    #[arg(long, default_value_t = DEFAULT_EVENT_QUEUE_DEPTH)]
    queue_depth: usize,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let (events, rx) = EventQueue::bounded(args.queue_depth);
    let mut db = match &args.load {
        Some(path) => {
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    eprintln!("stemma-cli: cannot read {}: {err}", path.display());
                    return ExitCode::FAILURE;
                }
            };
            match Db::load_snapshot(&bytes, events) {
                Ok(db) => db,
                Err(err) => {
                    eprintln!("stemma-cli: cannot load {}: {err}", path.display());
                    return ExitCode::FAILURE;
                }
            }
        }
        None => Db::with_events(events),
    };

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                eprintln!("stemma-cli: {err}");
                return ExitCode::FAILURE;
            }
        };
        let argv: Vec<Bytes> = line
            .split_whitespace()
            .map(|word| Bytes::copy_from_slice(word.as_bytes()))
            .collect();
        if argv.is_empty() {
            continue;
        }

        let reply = db.dispatch(&argv);
        print_reply(&reply, 0);
        print_events(&rx);
        let _ = io::stdout().flush();
    }

    if let Some(path) = &args.save {
        if let Err(err) = std::fs::write(path, db.save_snapshot()) {
            eprintln!("stemma-cli: cannot write {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

fn print_reply(reply: &Reply, indent: usize) {
    let pad = "  ".repeat(indent);
    match reply {
        Reply::Long(v) => println!("{pad}(integer) {v}"),
        Reply::Double(v) => println!("{pad}(double) {v}"),
        Reply::Str(s) => println!("{pad}{s:?}"),
        Reply::Null => println!("{pad}(nil)"),
        Reply::Error(msg) => println!("{pad}(error) {msg}"),
        Reply::Array(items) => {
            if items.is_empty() {
                println!("{pad}(empty array)");
            }
            for (i, item) in items.iter().enumerate() {
                println!("{pad}{})", i + 1);
                print_reply(item, indent + 1);
            }
        }
    }
}

fn print_events(rx: &Receiver<Bytes>) {
    for payload in rx.try_iter() {
        match EventPayload::decode(&payload) {
            Ok(EventPayload::Change { sub, node, field }) => match field {
                Some(field) => println!("(event) sub {sub} node {node} field {field}"),
                None => println!("(event) sub {sub} node {node} hierarchy"),
            },
            Ok(EventPayload::Index { node, field, value }) => {
                println!("(event) index node {node} field {field} value {value}")
            }
            Err(err) => println!("(event) undecodable payload: {err}"),
        }
    }
}
