//! Shared CLI helpers: banner, response printing, progress placeholder.

use colored::Colorize;

use relaybot_agent::Reply;

/// Print an assistant answer to stdout.
pub fn print_response(name: &str, response: &str) {
    println!();
    println!("{}", format!("💬 {name}").cyan().bold());
    if response.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{response}");
    }
    println!();
}

/// Print a command reply, marking replies only the issuer would see.
pub fn print_reply(reply: &Reply) {
    println!();
    println!("{}", render_reply(reply));
    println!();
}

fn render_reply(reply: &Reply) -> String {
    if reply.private {
        format!("{} {}", "(only you)".dimmed(), reply.text)
    } else {
        reply.text.clone()
    }
}

/// Print the banner shown when a long-running mode starts.
pub fn print_banner(mode: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}  {}", "💬 Relaybot".cyan().bold(), version.dimmed(), mode.dimmed());
    println!();
}

/// Print a "thinking" placeholder while a request runs.
pub fn print_thinking() {
    eprint!("{}", "⠿ thinking...".dimmed());
}

/// Clear the "thinking" placeholder.
pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_replies_are_marked() {
        colored::control::set_override(false);
        assert_eq!(render_reply(&Reply::private("pong")), "(only you) pong");
        assert_eq!(render_reply(&Reply::public("pong")), "pong");
    }
}
