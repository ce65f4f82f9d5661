use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "shield-cli")]
#[command(about = "Management CLI for the request shield", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Bearer token of an ADMIN principal
    #[arg(short, long, env = "SHIELD_TOKEN")]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check shield status
    Status,
    /// Query the audit trail
    Audit {
        /// Only this action (e.g. UNAUTHORIZED_ACCESS_ATTEMPT)
        #[arg(long)]
        action: Option<String>,
        /// Minimum severity (LOW, MEDIUM, HIGH, CRITICAL)
        #[arg(long)]
        min_severity: Option<String>,
        /// Only entries for this user id
        #[arg(long)]
        user: Option<String>,
        /// RFC 3339 lower bound on createdAt
        #[arg(long)]
        since: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.token))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Audit {
            action,
            min_severity,
            user,
            since,
            limit,
        } => {
            let mut query = vec![("limit", limit.to_string())];
            query.extend(action.map(|v| ("action", v.to_ascii_uppercase())));
            query.extend(min_severity.map(|v| ("minSeverity", v.to_ascii_uppercase())));
            query.extend(user.map(|v| ("userId", v)));
            query.extend(since.map(|v| ("since", v)));
            client
                .get(format!("{}/admin/audit", cli.url))
                .query(&query)
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: admin API returned status {}", status);
        if let Some(retry) = res.headers().get("retry-after").and_then(|v| v.to_str().ok()) {
            eprintln!("Retry after {retry}s");
        }
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
