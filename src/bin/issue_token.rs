//! Development Token Issuer
//!
//! Mints a bearer token signed with the configured `JWT_SECRET`, for calling
//! the API without a login flow.

use clap::Parser;
use edutrade_backend::auth::{JwtKeys, Role};
use edutrade_backend::config::{AuthConfig, MAX_JWT_EXPIRES_IN_HOURS};
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Issue a development JWT", long_about = None)]
struct Cli {
    /// User id to put in the token (random when omitted)
    #[arg(short, long)]
    user: Option<Uuid>,

    /// Role claim (user, instructor, admin)
    #[arg(short, long, default_value = "user")]
    role: Role,

    /// Lifetime in hours (defaults to JWT_EXPIRES_IN_HOURS)
    #[arg(long)]
    hours: Option<i64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AuthConfig::from_env()?;
    if let Some(hours) = cli.hours {
        if !(1..=MAX_JWT_EXPIRES_IN_HOURS).contains(&hours) {
            return Err(format!("--hours must be between 1 and {}", MAX_JWT_EXPIRES_IN_HOURS).into());
        }
        config.jwt_expires_in_hours = hours;
    }

    let user = cli.user.unwrap_or_else(Uuid::new_v4);
    let token = JwtKeys::new(&config).issue(user, cli.role)?;

    eprintln!("user: {}  role: {}  expires in: {}h", user, cli.role, config.jwt_expires_in_hours);
    println!("{}", token);
    Ok(())
}
