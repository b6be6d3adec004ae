//! Minimal passive-mode FTP server for integration tests.
//!
//! Serves a single static body for any RETR, answers SIZE with its length and
//! honours REST unless told to refuse it. Every control command is recorded
//! so tests can assert what the engine sent.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct FtpServerOptions {
    /// Answer `REST <n>` with 502 for every n > 0.
    pub refuse_rest: bool,
}

pub struct FtpServer {
    /// URL of the served file, e.g. "ftp://127.0.0.1:12345/data.bin".
    pub url: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl FtpServer {
    /// Every control command received, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Commands that start with `verb` (e.g. "RETR").
    pub fn commands_named(&self, verb: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.split_whitespace().next() == Some(verb))
            .collect()
    }
}

pub fn start(body: Vec<u8>) -> FtpServer {
    start_with_options(body, FtpServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: FtpServerOptions) -> FtpServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let opts = Arc::new(opts);
    let log = Arc::new(Mutex::new(Vec::new()));
    let server_log = Arc::clone(&log);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let opts = Arc::clone(&opts);
            let log = Arc::clone(&server_log);
            thread::spawn(move || session(stream, &body, &opts, &log));
        }
    });
    FtpServer {
        url: format!("ftp://127.0.0.1:{}/data.bin", port),
        log,
    }
}

fn reply(out: &mut TcpStream, line: &str) -> bool {
    out.write_all(format!("{line}\r\n").as_bytes()).is_ok()
}

fn session(stream: TcpStream, body: &[u8], opts: &FtpServerOptions, log: &Mutex<Vec<String>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));
    let Ok(read_half) = stream.try_clone() else { return };
    let mut reader = BufReader::new(read_half);
    let mut out = stream;
    if !reply(&mut out, "220 pdm test server") {
        return;
    }

    let mut passive: Option<TcpListener> = None;
    let mut offset = 0usize;
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let command = line.trim_end().to_string();
        log.lock().unwrap().push(command.clone());
        let (verb, arg) = match command.split_once(' ') {
            Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.trim().to_string()),
            None => (command.to_ascii_uppercase(), String::new()),
        };

        let ok = match verb.as_str() {
            "USER" => reply(&mut out, "331 password required"),
            "PASS" => reply(&mut out, "230 logged in"),
            "PWD" => reply(&mut out, "257 \"/\" is the current directory"),
            "CWD" => reply(&mut out, "250 directory changed"),
            "TYPE" => reply(&mut out, "200 type set"),
            "SIZE" => reply(&mut out, &format!("213 {}", body.len())),
            "MDTM" => reply(&mut out, "213 20240101000000"),
            "REST" => {
                let n = arg.parse::<usize>().unwrap_or(0);
                if n > 0 && opts.refuse_rest {
                    reply(&mut out, "502 REST not supported")
                } else {
                    offset = n.min(body.len());
                    reply(&mut out, &format!("350 restarting at {n}"))
                }
            }
            "EPSV" | "PASV" => match TcpListener::bind("127.0.0.1:0") {
                Ok(data) => {
                    let port = data.local_addr().unwrap().port();
                    passive = Some(data);
                    if verb == "EPSV" {
                        reply(
                            &mut out,
                            &format!("229 Entering Extended Passive Mode (|||{port}|)"),
                        )
                    } else {
                        reply(
                            &mut out,
                            &format!(
                                "227 Entering Passive Mode (127,0,0,1,{},{})",
                                port >> 8,
                                port & 0xff
                            ),
                        )
                    }
                }
                Err(_) => reply(&mut out, "425 cannot open data connection"),
            },
            "RETR" => {
                let Some(data) = passive.take() else {
                    let _ = reply(&mut out, "425 use PASV first");
                    continue;
                };
                if !reply(&mut out, "150 opening BINARY mode data connection") {
                    return;
                }
                if let Ok((mut conn, _)) = data.accept() {
                    let _ = conn.write_all(&body[offset..]);
                }
                offset = 0;
                reply(&mut out, "226 transfer complete")
            }
            "QUIT" => {
                let _ = reply(&mut out, "221 bye");
                return;
            }
            _ => reply(&mut out, "502 command not implemented"),
        };
        if !ok {
            return;
        }
    }
}
