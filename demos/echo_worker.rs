//! Echo worker example
//!
//! Run with: cargo run --example echo_worker [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example echo_worker                  # binds to 127.0.0.1:5555
//!   cargo run --example echo_worker 0.0.0.0:6000     # binds to 0.0.0.0:6000
//!
//! The worker plays the REP side of a command proxy session: it answers
//! the coordinator's `{"request":"Hello"}` greeting with
//! `{"response":"World"}`, then echoes every command it receives.
//!
//! Try it against a running coordinator:
//!
//!   curl -X POST localhost:9012/api/cmds/proxies \
//!     -d '{"nickname":"echo","hostname":"127.0.0.1","port":5555}'
//!   curl -X POST localhost:9012/api/cmds/proxies/echo -d 'PING'

use serde::{Deserialize, Serialize};
use zeromq::{Socket, SocketRecv, SocketSend, ZmqMessage};

#[derive(Deserialize)]
struct Greeting {
    request: String,
}

#[derive(Serialize)]
struct GreetingReply {
    response: &'static str,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5555".to_string());

    let mut socket = zeromq::RepSocket::new();
    let endpoint = socket.bind(&format!("tcp://{}", bind_addr)).await?;
    println!("echo worker listening on {}", endpoint);

    loop {
        let request = socket.recv().await?;
        let frame = request.get(0).cloned().unwrap_or_default();

        // The first message from each coordinator session is the greeting
        if let Ok(greeting) = serde_json::from_slice::<Greeting>(&frame) {
            if greeting.request == "Hello" {
                let reply = serde_json::to_vec(&GreetingReply { response: "World" })?;
                socket.send(ZmqMessage::from(reply)).await?;
                println!("handshake completed");
                continue;
            }
        }

        println!("echoing {} bytes", frame.len());
        socket.send(ZmqMessage::from(frame.to_vec())).await?;
    }
}
