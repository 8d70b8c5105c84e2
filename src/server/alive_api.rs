//! Liveness endpoint
//!
//! Replies with a monkey telling you the coordinator is up. Remote rigs
//! are lonely places; the sayings rotate.

use axum::Json;
use rand::Rng;
use serde::Serialize;

const SAYINGS: [&str; 9] = [
    "love && peace",
    "bananas are tasty",
    "go bananas!",
    "ooh ooh ah ah",
    "code more, sleep less",
    "monkey see, monkey do",
    "throw no banana",
    "climb every mountain",
    "eat sleep code repeat",
];

#[derive(Debug, Serialize)]
pub struct Alive {
    pub message: String,
}

fn monkey_art(saying: &str) -> String {
    let line = "_".repeat(saying.len() + 2);
    let bottom = "-".repeat(saying.len() + 2);

    format!(
        r#"
 {line}
< {saying} >
 {bottom}
    \
      .-"-.
    _/.-.-.\_
   ( ( o o ) )
    |/  "  \|
     \ .-. /
     /`"""`\
    /       \
"#
    )
}

/// `GET /api/alive`
pub async fn alive() -> Json<Alive> {
    let saying = SAYINGS[rand::thread_rng().gen_range(0..SAYINGS.len())];
    Json(Alive {
        message: monkey_art(saying),
    })
}
