//! Interactive mode for the server.
//!
//! Prompts for the bind address, port, and simulator cadence before
//! starting the server.

use dialoguer::{Confirm, Input};

use crate::DEFAULT_TICK_MS;

/// Runs the server in interactive mode, prompting for configuration.
///
/// Sets `BIND_ADDR`, `PORT`, and `SIMULATION_TICK_MS` from the answers and
/// delegates to [`super::run_server`].
///
/// # Errors
///
/// Returns an `std::io::Result` error if the underlying server fails to
/// start.
#[allow(clippy::future_not_send)]
pub async fn run() -> std::io::Result<()> {
    println!("Parking Watch Server");
    println!();

    let bind_addr: String = Input::new()
        .with_prompt("Bind address")
        .default("127.0.0.1".to_string())
        .interact_text()
        .unwrap_or_else(|_| "127.0.0.1".to_string());

    let port_str: String = Input::new()
        .with_prompt("Port")
        .default("8080".to_string())
        .interact_text()
        .unwrap_or_else(|_| "8080".to_string());

    let tick_str: String = Input::new()
        .with_prompt("Simulation tick (ms)")
        .default(DEFAULT_TICK_MS.to_string())
        .validate_with(|s: &String| -> Result<(), &str> {
            match s.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Ok(()),
                _ => Err("enter a positive number of milliseconds"),
            }
        })
        .interact_text()
        .unwrap_or_else(|_| DEFAULT_TICK_MS.to_string());

    // SAFETY: We are single-threaded at this point (before server starts) and
    // these variables are only read once during server initialisation.
    unsafe {
        std::env::set_var("BIND_ADDR", &bind_addr);
        std::env::set_var("PORT", &port_str);
        std::env::set_var("SIMULATION_TICK_MS", tick_str.trim());
    }

    if !Confirm::new()
        .with_prompt(format!("Start server on {bind_addr}:{port_str}?"))
        .default(true)
        .interact()
        .unwrap_or(true)
    {
        println!("Cancelled.");
        return Ok(());
    }

    super::run_server().await
}
