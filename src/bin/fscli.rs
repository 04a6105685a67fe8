//! Interactive demo shell for `blockfs-core`, backed by an in-memory device
//! and bitmap free map. Useful for exercising the filesystem by hand and for
//! a quick sanity check that a freshly formatted volume behaves correctly.

use std::io::{self, BufRead, Write};

use blockfs_core::{BitmapFreeMap, FileSystem, InMemoryDevice, Session};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fscli", about = "Demo shell for the blockfs-core filesystem stack")]
struct Cli {
    /// Number of sectors in the in-memory device backing this session.
    #[arg(long, default_value_t = 4096)]
    sectors: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read commands from stdin, one per line, against a freshly formatted
    /// volume. Commands: `mkdir PATH`, `create PATH [SIZE]`, `write PATH
    /// TEXT`, `cat PATH`, `ls PATH`, `rm PATH`, `cd PATH`, `pwd`.
    Shell,
    /// Run a small built-in walkthrough and print what happened.
    Demo,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let device = InMemoryDevice::new(cli.sectors);
    let freemap = BitmapFreeMap::new(cli.sectors);
    let fs = match FileSystem::format(device, freemap) {
        Ok(fs) => fs,
        Err(e) => {
            eprintln!("fscli: failed to format volume: {e}");
            std::process::exit(1);
        }
    };

    match cli.command {
        Command::Shell => run_shell(&fs),
        Command::Demo => run_demo(&fs),
    }

    if let Err(e) = fs.shutdown() {
        eprintln!("fscli: shutdown failed: {e}");
        std::process::exit(1);
    }
}

fn run_shell(fs: &FileSystem<InMemoryDevice, BitmapFreeMap>) {
    let session = Session::new(fs);
    let stdin = io::stdin();
    let mut cwd_path = String::from("/");
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("fscli: stdin error: {e}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(3, ' ');
        let cmd = parts.next().unwrap_or("");
        let arg1 = parts.next().unwrap_or("");
        let arg2 = parts.next().unwrap_or("");
        match cmd {
            "mkdir" => report(session.mkdir(arg1)),
            "create" => {
                let size: u64 = arg2.parse().unwrap_or(0);
                report(session.create(arg1, size));
            }
            "write" => match session.open(arg1) {
                Ok(fd) => {
                    let n = session.write(fd, arg2.as_bytes());
                    let _ = session.close(fd);
                    report(n.map(|_| ()));
                }
                Err(e) => println!("error: {e}"),
            },
            "cat" => match session.open(arg1) {
                Ok(fd) => {
                    let mut buf = vec![0u8; 4096];
                    match session.read(fd, &mut buf) {
                        Ok(n) => {
                            io::stdout().write_all(&buf[..n]).ok();
                            println!();
                        }
                        Err(e) => println!("error: {e}"),
                    }
                    let _ = session.close(fd);
                }
                Err(e) => println!("error: {e}"),
            },
            "ls" => match session.open(if arg1.is_empty() { "." } else { arg1 }) {
                Ok(fd) => {
                    loop {
                        match session.readdir(fd) {
                            Ok(Some(name)) => println!("{}", name.as_str()),
                            Ok(None) => break,
                            Err(e) => {
                                println!("error: {e}");
                                break;
                            }
                        }
                    }
                    let _ = session.close(fd);
                }
                Err(e) => println!("error: {e}"),
            },
            "rm" => report(session.remove(arg1)),
            "cd" => match session.chdir(arg1) {
                Ok(()) => {
                    cwd_path = arg1.to_string();
                    println!("cwd: {cwd_path}");
                }
                Err(e) => println!("error: {e}"),
            },
            "pwd" => println!("{cwd_path}"),
            other => println!("unknown command: {other}"),
        }
    }
}

fn report(result: blockfs_core::Result<()>) {
    match result {
        Ok(()) => println!("ok"),
        Err(e) => println!("error: {e}"),
    }
}

fn run_demo(fs: &FileSystem<InMemoryDevice, BitmapFreeMap>) {
    let session = Session::new(fs);

    session.mkdir("/docs").expect("mkdir /docs");
    session.create("/docs/hello.txt", 0).expect("create");
    let fd = session.open("/docs/hello.txt").expect("open");
    session.write(fd, b"hello, blockfs").expect("write");
    session.close(fd).expect("close");

    let fd = session.open("/docs/hello.txt").expect("reopen");
    let mut buf = [0u8; 32];
    let n = session.read(fd, &mut buf).expect("read");
    println!("read back: {:?}", std::str::from_utf8(&buf[..n]).unwrap());
    session.close(fd).expect("close");

    let fd = session.open("/docs").expect("open dir");
    print!("/docs contains:");
    while let Some(name) = session.readdir(fd).expect("readdir") {
        print!(" {}", name.as_str());
    }
    println!();
    session.close(fd).expect("close");
}
