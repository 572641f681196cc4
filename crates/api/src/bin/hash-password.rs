//! Password hashing utility for Fakturace
//!
//! Produces an Argon2id hash for seeding accounts by hand, typically the first
//! admin. The password must pass the same rules as registration.
//!
//! Usage:
//!   cargo run --bin hash-password
//!   cargo run --bin hash-password -- "Heslo2026" admin@example.cz

use std::env;
use std::io::{self, Write};

use fakturace_api::auth::{hash_password, validate_password_strength};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);

    let password = match args.next() {
        Some(pwd) => pwd,
        None => {
            // Reading from stdin keeps the password out of the process list
            print!("Heslo: ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            line.trim().to_string()
        }
    };
    let email = args.next().unwrap_or_else(|| "admin@example.cz".to_string());

    if let Err(e) = validate_password_strength(&password) {
        eprintln!("Heslo nevyhovuje: {}", e);
        std::process::exit(1);
    }

    let password_hash = hash_password(&password)?;

    println!("{}", password_hash);
    println!();
    println!("-- New admin account (run the Free subscription insert in the same transaction):");
    println!(
        "INSERT INTO users (id, email, password_hash, name, role, email_verified) \
         VALUES (gen_random_uuid(), '{}', '{}', 'Administrátor', 'admin', TRUE);",
        email.to_lowercase(),
        password_hash
    );
    println!(
        "INSERT INTO user_subscriptions \
         (id, user_id, plan_id, status, billing_cycle, current_period_start, current_period_end) \
         SELECT gen_random_uuid(), id, 1, 'active', 'monthly', NOW(), NOW() + INTERVAL '1 month' \
         FROM users WHERE email = '{}';",
        email.to_lowercase()
    );
    println!();
    println!("-- Or promote an existing account:");
    println!(
        "UPDATE users SET role = 'admin' WHERE email = '{}';",
        email.to_lowercase()
    );

    Ok(())
}
