//! minos CLI - line-oriented driver for the virtual machine
//!
//! A scripted front-end stand-in: reads one command per line, prints the
//! command's result, then advances simulated time by one tick and renders
//! whatever arrived on the output channel (kernel prints, app progress).
//! An empty line just ticks, which is how you watch a running app finish.

use colored::Colorize;
use futures::channel::mpsc::UnboundedReceiver;
use minos::console_log;
use minos::kernel::Kernel;
use minos::shell;
use std::io::{self, BufRead, Write};

fn drain_output(rx: &mut UnboundedReceiver<String>) {
    while let Ok(Some(line)) = rx.try_next() {
        println!("{}", line.dimmed());
    }
}

fn main() {
    let (mut kernel, mut output) = Kernel::new();

    println!("{}", "minos v0.1.0 booted".bold());
    println!("commands: run, write <file> <data>, read <file>, memory, list_files,");
    println!("          create_app <name>, run_app <name>, shutdown");
    println!("(one time unit passes per input line; an empty line just waits)\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        let _ = stdout.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => {
                // EOF
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim();
                let mut exit = false;

                if !line.is_empty() {
                    let result = shell::execute(&mut kernel, line);
                    if result.error.is_empty() {
                        println!("{}", result.output);
                    } else {
                        println!("{}", result.error.red());
                    }
                    exit = result.should_exit;
                }

                kernel.tick(1.0);
                drain_output(&mut output);

                if exit {
                    break;
                }
            }
            Err(e) => {
                console_log!("error reading input: {}", e);
                break;
            }
        }
    }

    for (name, count) in kernel.trace_summary() {
        console_log!("[trace] {} x{}", name, count);
    }
    std::process::exit(0);
}
