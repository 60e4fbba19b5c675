use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 16] = [
        "RUST_LOG",
        "EPG_HOST",
        "EPG_PORT",
        "EPG_DATABASE_URL",
        "EPG_USE_X_FORWARDED_FOR",
        "EPG_USE_FORWARDED",
        "EPG_CLAIM_WINDOW_HOURS",
        "EPG_SWEEP_INTERVAL_SECS",
        "EPG_MISMATCH_THRESHOLD",
        "EPG_WEBHOOK_HMAC_CHECKS",
        "EPG_BANK_CODE",
        "EPG_BANK_ACCOUNT_NUMBER",
        "EPG_BANK_ACCOUNT_NAME",
        "EPG_QR_TEMPLATE",
        "EPG_ACCESS_TOKEN_TTL_MINUTES",
        "EPG_REFRESH_TOKEN_TTL_DAYS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
