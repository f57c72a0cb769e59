//! Scripted HamAlert server for integration tests.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

pub const USER: &str = "N0CALL";
pub const PASSWORD: &str = "secret";

/// One step of a server script.
pub enum Step {
    /// Write raw text (no newline added).
    Send(String),
    /// Read one line from the client and check it.
    Expect(String),
    Sleep(Duration),
    /// Keep the connection open until the client goes away.
    Hold,
}

pub fn send(text: &str) -> Step {
    Step::Send(text.to_string())
}

pub fn expect(line: &str) -> Step {
    Step::Expect(line.to_string())
}

/// The exchange of a successful login, including the replay request.
pub fn login_script(load_recent: u32) -> Vec<Step> {
    vec![
        send("Welcome to HamAlert\r\nlogin: "),
        expect(USER),
        send("password: "),
        expect(PASSWORD),
        send(&format!("\r\nHello {}, this is HamAlert\r\n", USER)),
        send(&format!("{} de HamAlert >\r\n", USER)),
        expect("set/json"),
        send("Operation successful\r\n"),
        expect(&format!("sh/dx {}", load_recent)),
    ]
}

/// Serves `script` to the first client and returns the address to connect
/// to. The join handle yields the lines the client sent.
pub fn serve(script: Vec<Step>) -> (String, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        run_script(stream, script)
    });
    (addr, handle)
}

fn run_script(stream: TcpStream, script: Vec<Step>) -> Vec<String> {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;
    let mut received = vec![];
    for step in script {
        match step {
            Step::Send(text) => writer.write_all(text.as_bytes()).unwrap(),
            Step::Expect(line) => {
                let mut got = String::new();
                reader.read_line(&mut got).unwrap();
                let got = got.trim_end().to_string();
                assert_eq!(got, line);
                received.push(got);
            }
            Step::Sleep(d) => thread::sleep(d),
            Step::Hold => {
                let mut rest = String::new();
                while let Ok(n) = reader.read_line(&mut rest) {
                    if n == 0 {
                        break;
                    }
                }
            }
        }
    }
    received
}
